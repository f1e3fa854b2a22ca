//! The fixed-layout RawArray header.
//!
//! ```text
//! offset  0  magic
//! offset  8  flags
//! offset 16  eltype   (element kind ordinal)
//! offset 24  elbyte   (bytes per element)
//! offset 32  size     (bytes of data as stored)
//! offset 40  ndims
//! offset 48  dims[0..ndims]
//! ```
//!
//! Every field is a host-order `u64`.

use crate::{
    eltype::{ElementKind, ElementType},
    error::Warning,
    ra::io::{chunked_read, chunked_write},
};
use byteorder::{ByteOrder, NativeEndian};
use std::{error::Error, fmt, fs, io, io::Seek as _, path::Path};
use tracing::warn;

/// Magic number opening every file: the bytes `rawarray` read as a
/// little-endian `u64`.
pub const MAGIC_NUMBER: u64 = 0x7961_7272_6177_6172;

/// Length of the fixed part of the header, before the dimensions.
pub const FIXED_HEADER_LEN: usize = 48;

/// Byte offsets of the header fields.
#[derive(Debug, Clone, Copy)]
pub struct FieldOffset;

impl FieldOffset {
    /// Magic number.
    pub const MAGIC: u64 = 0;
    /// Flag bits.
    pub const FLAGS: u64 = 8;
    /// Element kind ordinal.
    pub const ELTYPE: u64 = 16;
    /// Element width in bytes.
    pub const ELBYTE: u64 = 24;
    /// Data size in bytes.
    pub const SIZE: u64 = 32;
    /// Number of dimensions.
    pub const NDIMS: u64 = 40;
    /// First dimension.
    pub const DIMS: u64 = 48;
}

/// The header flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u64);

impl Flags {
    /// The data was written on a big-endian host.
    pub const BIG_ENDIAN: u64 = 1 << 0;
    /// The data region holds LZ4 block output.
    pub const COMPRESSED: u64 = 1 << 1;
    /// Every bit this version understands.
    pub const KNOWN: u64 = Self::BIG_ENDIAN | Self::COMPRESSED;

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Flags describing data in the byte order of this host.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Self(Self::BIG_ENDIAN)
        } else {
            Self(0)
        }
    }

    /// Raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if every bit of `flag` is set.
    pub const fn contains(self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    /// Returns a copy with `flag` set.
    #[must_use]
    pub const fn with(self, flag: u64) -> Self {
        Self(self.0 | flag)
    }

    /// Returns a copy with `flag` cleared.
    #[must_use]
    pub const fn without(self, flag: u64) -> Self {
        Self(self.0 & !flag)
    }

    /// Returns `true` if the data region is compressed.
    pub const fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    /// Returns `true` if the data is marked big-endian.
    pub const fn is_big_endian(self) -> bool {
        self.contains(Self::BIG_ENDIAN)
    }

    /// Returns `true` if the data byte order differs from this host's.
    pub const fn is_foreign_order(self) -> bool {
        self.is_big_endian() != cfg!(target_endian = "big")
    }

    /// Bits set beyond the ones this version understands.
    pub const fn unknown(self) -> u64 {
        self.0 & !Self::KNOWN
    }
}

/// How to treat byte order on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrderPolicy {
    /// Headers must be in host order. The big-endian flag is recorded but
    /// never acted upon.
    #[default]
    Native,
    /// Accept headers written in the opposite byte order, and swap data
    /// whose big-endian flag disagrees with the host.
    Swap,
}

/// Byte order a header was found in, relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOrder {
    Native,
    Swapped,
}

impl FileOrder {
    fn read_u64(self, bytes: &[u8]) -> u64 {
        let value = NativeEndian::read_u64(bytes);
        match self {
            Self::Native => value,
            Self::Swapped => value.swap_bytes(),
        }
    }
}

/// An error parsing the header of a `.ra` file.
#[derive(Debug)]
pub enum ParseHeaderError {
    /// The file does not start with the magic number.
    MagicNumber(u64),
    /// The element kind ordinal is not recognized.
    UnknownElementKind(u64),
    /// The element width is not legal for the kind.
    InvalidWidth {
        /// Element kind.
        kind: ElementKind,
        /// Width in bytes.
        width: u64,
    },
    /// `size` disagrees with the element width and dimensions of an
    /// uncompressed array.
    SizeMismatch {
        /// `elbyte * product(dims)`.
        expected: u64,
        /// The `size` field.
        actual: u64,
    },
    /// The number of elements, the data length, or the dimension block
    /// length overflows.
    LengthOverflow,
}

impl Error for ParseHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MagicNumber(magic) => write!(f, "bad magic number: {magic:#018x}"),
            Self::UnknownElementKind(ordinal) => write!(f, "unknown element kind: {ordinal}"),
            Self::InvalidWidth { kind, width } => {
                write!(f, "{width}-byte elements are not valid for kind {kind}")
            }
            Self::SizeMismatch { expected, actual } => {
                write!(f, "data size {actual} does not match shape ({expected} bytes)")
            }
            Self::LengthOverflow => write!(f, "overflow computing length from shape"),
        }
    }
}

/// An error reading a header.
#[derive(Debug)]
pub enum ReadHeaderError {
    /// An I/O error, including a short read.
    Io(io::Error),
    /// The header bytes are malformed.
    Parse(ParseHeaderError),
}

impl Error for ReadHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

impl fmt::Display for ReadHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Parse(err) => write!(f, "error parsing header: {err}"),
        }
    }
}

impl From<io::Error> for ReadHeaderError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ParseHeaderError> for ReadHeaderError {
    fn from(err: ParseHeaderError) -> Self {
        Self::Parse(err)
    }
}

/// The fixed 48 bytes of a header, decoded but not yet validated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Prelude {
    pub order: FileOrder,
    pub flags: Flags,
    pub eltype: u64,
    pub elbyte: u64,
    pub size: u64,
    pub ndims: u64,
}

impl Prelude {
    pub fn decode(
        bytes: &[u8; FIXED_HEADER_LEN],
        policy: ByteOrderPolicy,
    ) -> Result<Self, ParseHeaderError> {
        let magic = NativeEndian::read_u64(&bytes[..8]);
        let order = if magic == MAGIC_NUMBER {
            FileOrder::Native
        } else if policy == ByteOrderPolicy::Swap && magic.swap_bytes() == MAGIC_NUMBER {
            FileOrder::Swapped
        } else {
            return Err(ParseHeaderError::MagicNumber(magic));
        };
        let field = |offset: u64| {
            let offset = offset as usize;
            order.read_u64(&bytes[offset..offset + 8])
        };
        Ok(Self {
            order,
            flags: Flags::from_bits(field(FieldOffset::FLAGS)),
            eltype: field(FieldOffset::ELTYPE),
            elbyte: field(FieldOffset::ELBYTE),
            size: field(FieldOffset::SIZE),
            ndims: field(FieldOffset::NDIMS),
        })
    }

    /// Length in bytes of the dimension block.
    pub fn dims_len(&self) -> Result<usize, ParseHeaderError> {
        usize::try_from(self.ndims)
            .ok()
            .and_then(|n| n.checked_mul(8))
            .ok_or(ParseHeaderError::LengthOverflow)
    }

    pub fn decode_dims(&self, bytes: &[u8]) -> Vec<u64> {
        bytes.chunks_exact(8).map(|b| self.order.read_u64(b)).collect()
    }

    /// Validates the fields and combines them with the dimensions.
    pub fn into_header(self, dims: Vec<u64>) -> Result<Header, ParseHeaderError> {
        let kind = ElementKind::from_ordinal(self.eltype)
            .ok_or(ParseHeaderError::UnknownElementKind(self.eltype))?;
        if !kind.accepts_width(self.elbyte) {
            return Err(ParseHeaderError::InvalidWidth { kind, width: self.elbyte });
        }
        let header = Header {
            flags: self.flags,
            eltype: ElementType { kind, width: self.elbyte },
            size: self.size,
            dims,
        };
        let expected = header.uncompressed_size().ok_or(ParseHeaderError::LengthOverflow)?;
        if !header.flags.is_compressed() && expected != header.size {
            return Err(ParseHeaderError::SizeMismatch { expected, actual: header.size });
        }
        Ok(header)
    }
}

/// Metadata of a RawArray file: everything except the data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Flag bits.
    pub flags: Flags,
    /// Element kind and width.
    pub eltype: ElementType,
    /// Bytes of data as stored.
    pub size: u64,
    /// Dimensions. The rank is their count.
    pub dims: Vec<u64>,
}

impl Header {
    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of the dimensions, or `None` on overflow.
    pub fn num_elements(&self) -> Option<u64> {
        element_count(&self.dims)
    }

    /// Size in bytes of the data when uncompressed, or `None` on overflow.
    pub fn uncompressed_size(&self) -> Option<u64> {
        self.num_elements()?.checked_mul(self.eltype.width)
    }

    /// Total length in bytes of the encoded header.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + 8 * self.dims.len()
    }

    /// Non-fatal issues with this header.
    pub fn warnings(&self) -> Vec<Warning> {
        match self.flags.unknown() {
            0 => Vec::new(),
            bits => vec![Warning::UnknownFlags(bits)],
        }
    }

    /// Reads a header, leaving `reader` positioned at the first data byte.
    pub fn from_reader<R: io::Read>(
        mut reader: R,
        policy: ByteOrderPolicy,
    ) -> Result<Self, ReadHeaderError> {
        let mut fixed = [0; FIXED_HEADER_LEN];
        chunked_read(&mut reader, &mut fixed)?;
        let prelude = Prelude::decode(&fixed, policy)?;
        let mut buf = Vec::new();
        let dims_len = prelude.dims_len()?;
        buf.try_reserve_exact(dims_len)
            .map_err(|_| ParseHeaderError::LengthOverflow)?;
        buf.resize(dims_len, 0);
        chunked_read(&mut reader, &mut buf)?;
        let dims = prelude.decode_dims(&buf);
        let header = prelude.into_header(dims)?;
        header.log_warnings();
        Ok(header)
    }

    pub(crate) fn log_warnings(&self) {
        for warning in self.warnings() {
            warn!("{warning}");
        }
    }

    /// Encodes the whole header, dimensions included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0; self.encoded_len()];
        encode_prelude(&mut out, self.flags, self.eltype, self.size, self.dims.len() as u64);
        NativeEndian::write_u64_into(&self.dims, &mut out[FIXED_HEADER_LEN..]);
        out
    }

    /// Writes the header, dimensions included.
    pub fn write<W: io::Write>(&self, writer: W) -> io::Result<()> {
        chunked_write(writer, &self.to_bytes())
    }
}

impl fmt::Display for Header {
    /// Human-readable, YAML-like summary.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "---")?;
        let endian = if self.flags.is_big_endian() { "big" } else { "little" };
        writeln!(f, "endian: {endian}")?;
        if self.flags.is_compressed() {
            writeln!(f, "compressed: true")?;
        }
        writeln!(f, "type: {}", self.eltype.name())?;
        writeln!(f, "size: {}", self.size)?;
        writeln!(f, "dimension: {}", self.rank())?;
        writeln!(f, "shape:")?;
        for dim in &self.dims {
            writeln!(f, "  - {dim}")?;
        }
        write!(f, "...")
    }
}

/// Encodes the fixed part of a header into the first 48 bytes of `out`.
pub(crate) fn encode_prelude(
    out: &mut [u8],
    flags: Flags,
    eltype: ElementType,
    size: u64,
    ndims: u64,
) {
    let fields = [MAGIC_NUMBER, flags.bits(), eltype.kind.ordinal(), eltype.width, size, ndims];
    NativeEndian::write_u64_into(&fields, &mut out[..FIXED_HEADER_LEN]);
}

/// Product of `dims`, or `None` on overflow. An empty list has one element.
pub(crate) fn element_count(dims: &[u64]) -> Option<u64> {
    dims.iter().try_fold(1u64, |n, &d| n.checked_mul(d))
}

/// Reads the host-order `u64` at `offset` without parsing the rest of the
/// header.
///
/// The magic number is not checked.
pub fn read_u64_at<P: AsRef<Path>>(path: P, offset: u64) -> io::Result<u64> {
    let mut file = fs::File::open(path)?;
    file.seek(io::SeekFrom::Start(offset))?;
    let mut buf = [0; 8];
    chunked_read(&mut file, &mut buf)?;
    Ok(NativeEndian::read_u64(&buf))
}

/// Reads the raw flag bits of the file at `path`.
pub fn read_flags<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    read_u64_at(path, FieldOffset::FLAGS)
}

/// Reads the element kind ordinal of the file at `path`.
pub fn read_eltype<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    read_u64_at(path, FieldOffset::ELTYPE)
}

/// Reads the element width of the file at `path`.
pub fn read_elbyte<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    read_u64_at(path, FieldOffset::ELBYTE)
}

/// Reads the stored data size of the file at `path`.
pub fn read_size<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    read_u64_at(path, FieldOffset::SIZE)
}

/// Reads the number of dimensions of the file at `path`.
pub fn read_ndims<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    read_u64_at(path, FieldOffset::NDIMS)
}

/// Reads the dimensions of the file at `path`.
pub fn read_dims<P: AsRef<Path>>(path: P) -> io::Result<Vec<u64>> {
    let path = path.as_ref();
    let ndims = read_ndims(path)?;
    let len = usize::try_from(ndims)
        .ok()
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "dimension count overflows"))?;
    let mut file = fs::File::open(path)?;
    file.seek(io::SeekFrom::Start(FieldOffset::DIMS))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|err| io::Error::new(io::ErrorKind::OutOfMemory, err))?;
    buf.resize(len, 0);
    chunked_read(&mut file, &mut buf)?;
    let mut dims = vec![0; len / 8];
    NativeEndian::read_u64_into(&buf, &mut dims);
    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            flags: Flags::empty(),
            eltype: "f32".parse().unwrap(),
            size: 48,
            dims: vec![3, 4],
        }
    }

    #[test]
    fn encodes_fixed_layout() {
        let bytes = header().to_bytes();
        assert_eq!(bytes.len(), 64);
        let field = |i: usize| NativeEndian::read_u64(&bytes[8 * i..8 * i + 8]);
        assert_eq!(field(0), MAGIC_NUMBER);
        assert_eq!(field(1), 0);
        assert_eq!(field(2), 3);
        assert_eq!(field(3), 4);
        assert_eq!(field(4), 48);
        assert_eq!(field(5), 2);
        assert_eq!(field(6), 3);
        assert_eq!(field(7), 4);
    }

    #[test]
    fn magic_spells_rawarray() {
        assert_eq!(&MAGIC_NUMBER.to_le_bytes(), b"rawarray");
    }

    #[test]
    fn reads_back_what_it_writes() {
        let bytes = header().to_bytes();
        let parsed = Header::from_reader(&bytes[..], ByteOrderPolicy::Native).unwrap();
        assert_eq!(parsed, header());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header().to_bytes();
        bytes[0] ^= 0xff;
        let err = Header::from_reader(&bytes[..], ByteOrderPolicy::Native).unwrap_err();
        assert!(matches!(err, ReadHeaderError::Parse(ParseHeaderError::MagicNumber(_))));
    }

    #[test]
    fn truncated_header_is_io_error() {
        let bytes = header().to_bytes();
        let err = Header::from_reader(&bytes[..60], ByteOrderPolicy::Native).unwrap_err();
        assert!(matches!(err, ReadHeaderError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn rejects_size_mismatch_unless_compressed() {
        let mut h = header();
        h.size = 47;
        let err = Header::from_reader(&h.to_bytes()[..], ByteOrderPolicy::Native).unwrap_err();
        assert!(matches!(
            err,
            ReadHeaderError::Parse(ParseHeaderError::SizeMismatch { expected: 48, actual: 47 })
        ));
        h.flags = h.flags.with(Flags::COMPRESSED);
        assert!(Header::from_reader(&h.to_bytes()[..], ByteOrderPolicy::Native).is_ok());
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut bytes = header().to_bytes();
        NativeEndian::write_u64(&mut bytes[16..24], 9);
        let err = Header::from_reader(&bytes[..], ByteOrderPolicy::Native).unwrap_err();
        assert!(matches!(err, ReadHeaderError::Parse(ParseHeaderError::UnknownElementKind(9))));
    }

    #[test]
    fn unknown_flags_warn_but_parse() {
        let mut h = header();
        h.flags = Flags::from_bits(Flags::COMPRESSED | 1 << 5);
        h.size = 10;
        let parsed = Header::from_reader(&h.to_bytes()[..], ByteOrderPolicy::Native).unwrap();
        assert_eq!(parsed.warnings(), vec![Warning::UnknownFlags(1 << 5)]);
    }

    #[test]
    fn swapped_header_needs_swap_policy() {
        let bytes: Vec<u8> = header()
            .to_bytes()
            .chunks_exact(8)
            .flat_map(|c| c.iter().rev().copied())
            .collect();
        assert!(Header::from_reader(&bytes[..], ByteOrderPolicy::Native).is_err());
        let parsed = Header::from_reader(&bytes[..], ByteOrderPolicy::Swap).unwrap();
        assert_eq!(parsed, header());
    }

    #[test]
    fn write_then_read_back() {
        let mut out = Vec::new();
        header().write(&mut out).unwrap();
        assert_eq!(out.len(), header().encoded_len());
        let mut reader = &out[..];
        let parsed = Header::from_reader(&mut reader, ByteOrderPolicy::Native).unwrap();
        assert_eq!(parsed, header());
        assert!(reader.is_empty());
    }

    #[test]
    fn displays_summary() {
        let text = header().to_string();
        assert!(text.contains("type: float32"));
        assert!(text.contains("dimension: 2"));
        assert!(text.contains("  - 3\n  - 4\n"));
    }
}
