//! Element kinds, byte widths and their type codes.
//!
//! A type code is the kind letter followed by the element size in bits, e.g.
//! `f32`, `c64`, `u8` or `s96` for an opaque 12-byte record.

use std::{error::Error, fmt, str::FromStr};

/// The semantic category of the values stored in an array.
///
/// The discriminant is the ordinal stored in the `eltype` header field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u64)]
pub enum ElementKind {
    /// Opaque, user-defined records. The reader must decode them.
    User = 0,
    /// Two's complement signed integers.
    SignedInt = 1,
    /// Unsigned integers.
    UnsignedInt = 2,
    /// IEEE-754 floating point numbers.
    Float = 3,
    /// Interleaved `(re, im)` pairs of floating point numbers.
    Complex = 4,
}

impl ElementKind {
    /// Letters indexed by ordinal.
    const CODES: [char; 5] = ['s', 'i', 'u', 'f', 'c'];

    /// Looks up a kind by its header ordinal.
    pub const fn from_ordinal(ordinal: u64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::User),
            1 => Some(Self::SignedInt),
            2 => Some(Self::UnsignedInt),
            3 => Some(Self::Float),
            4 => Some(Self::Complex),
            _ => None,
        }
    }

    /// Header ordinal of the kind.
    pub const fn ordinal(self) -> u64 {
        self as u64
    }

    /// Single-letter code used in type codes.
    pub const fn code(self) -> char {
        Self::CODES[self as usize]
    }

    /// Looks up a kind by its single-letter code.
    pub fn from_code(code: char) -> Option<Self> {
        Self::CODES
            .iter()
            .position(|&c| c == code)
            .and_then(|i| Self::from_ordinal(i as u64))
    }

    /// Long name used in human-readable headers (`float` in `float32`).
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::SignedInt => "int",
            Self::UnsignedInt => "uint",
            Self::Float => "float",
            Self::Complex => "complex",
        }
    }

    /// Returns `true` if `width` bytes is a legal element size for this kind.
    pub const fn accepts_width(self, width: u64) -> bool {
        match self {
            Self::User => width > 0,
            Self::SignedInt | Self::UnsignedInt => matches!(width, 1 | 2 | 4 | 8 | 16),
            Self::Float => matches!(width, 2 | 4 | 8 | 16),
            Self::Complex => matches!(width, 4 | 8 | 16 | 32),
        }
    }

    /// Returns `true` for signed and unsigned integers.
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::SignedInt | Self::UnsignedInt)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An element kind together with its width in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementType {
    /// Kind of the elements.
    pub kind: ElementKind,
    /// Bytes per element in the canonical (uncompressed) representation.
    pub width: u64,
}

impl ElementType {
    /// Creates an element type, checking that `width` is legal for `kind`.
    pub fn new(kind: ElementKind, width: u64) -> Result<Self, ParseTypeCodeError> {
        if kind.accepts_width(width) {
            Ok(Self { kind, width })
        } else {
            Err(ParseTypeCodeError::InvalidWidth { kind, width })
        }
    }

    /// Bytes in one scalar component. Complex elements have two components.
    pub const fn component_width(self) -> u64 {
        match self.kind {
            ElementKind::Complex => self.width / 2,
            _ => self.width,
        }
    }

    /// Width in bits, as used in the type code.
    pub const fn bits(self) -> u64 {
        self.width * 8
    }

    /// Long name with the bit width, e.g. `float32`.
    pub fn name(self) -> String {
        format!("{}{}", self.kind.name(), self.bits())
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.kind.code(), self.bits())
    }
}

impl FromStr for ElementType {
    type Err = ParseTypeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next().ok_or(ParseTypeCodeError::Empty)?;
        let kind =
            ElementKind::from_code(letter).ok_or(ParseTypeCodeError::UnknownKind(letter))?;
        let digits = chars.as_str();
        let bits: u64 = digits
            .parse()
            .map_err(|_| ParseTypeCodeError::InvalidBits(digits.to_owned()))?;
        if bits % 8 != 0 {
            return Err(ParseTypeCodeError::InvalidBits(digits.to_owned()));
        }
        Self::new(kind, bits / 8)
    }
}

/// An error parsing or validating a type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTypeCodeError {
    /// The type code was empty.
    Empty,
    /// The leading letter is not one of `s`, `i`, `u`, `f`, `c`.
    UnknownKind(char),
    /// The bit width is not a whole number of bytes.
    InvalidBits(String),
    /// The width is not legal for the kind.
    InvalidWidth {
        /// Requested kind.
        kind: ElementKind,
        /// Requested width in bytes.
        width: u64,
    },
}

impl Error for ParseTypeCodeError {}

impl fmt::Display for ParseTypeCodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty type code"),
            Self::UnknownKind(c) => write!(f, "unknown element kind letter: {c:?}"),
            Self::InvalidBits(bits) => write!(f, "invalid bit width: {bits:?}"),
            Self::InvalidWidth { kind, width } => {
                write!(f, "{width}-byte elements are not valid for kind {kind}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_codes() {
        let t: ElementType = "f32".parse().unwrap();
        assert_eq!(t, ElementType { kind: ElementKind::Float, width: 4 });
        let t: ElementType = "c128".parse().unwrap();
        assert_eq!(t.component_width(), 8);
        let t: ElementType = "s96".parse().unwrap();
        assert_eq!(t.kind, ElementKind::User);
        assert_eq!(t.width, 12);
    }

    #[test]
    fn formats_type_codes() {
        let t = ElementType::new(ElementKind::UnsignedInt, 2).unwrap();
        assert_eq!(t.to_string(), "u16");
        assert_eq!(t.name(), "uint16");
    }

    #[test]
    fn rejects_bad_codes() {
        assert_eq!("".parse::<ElementType>(), Err(ParseTypeCodeError::Empty));
        assert_eq!("x8".parse::<ElementType>(), Err(ParseTypeCodeError::UnknownKind('x')));
        assert!(matches!("f".parse::<ElementType>(), Err(ParseTypeCodeError::InvalidBits(_))));
        assert!(matches!("i12".parse::<ElementType>(), Err(ParseTypeCodeError::InvalidBits(_))));
        assert!(matches!(
            "f24".parse::<ElementType>(),
            Err(ParseTypeCodeError::InvalidWidth { .. })
        ));
    }

    #[test]
    fn ordinals_match_header_encoding() {
        for ordinal in 0..5 {
            let kind = ElementKind::from_ordinal(ordinal).unwrap();
            assert_eq!(kind.ordinal(), ordinal);
            assert_eq!(ElementKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ElementKind::from_ordinal(5), None);
    }
}
