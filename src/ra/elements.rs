use crate::eltype::{ElementKind, ElementType};
use half::f16;
use num_complex::{Complex32, Complex64};

/// A Rust scalar type that can be stored as the elements of an array.
///
/// The in-memory size of the type equals [`ElementType::width`] of
/// [`Self::ELEMENT_TYPE`], and every bit pattern is a valid value.
pub trait Element: bytemuck::Pod {
    /// The element kind and width this type is stored as.
    const ELEMENT_TYPE: ElementType;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl Element for $ty {
                const ELEMENT_TYPE: ElementType = ElementType {
                    kind: ElementKind::$kind,
                    width: std::mem::size_of::<$ty>() as u64,
                };
            }
        )+
    };
}

impl_element! {
    i8 => SignedInt,
    i16 => SignedInt,
    i32 => SignedInt,
    i64 => SignedInt,
    u8 => UnsignedInt,
    u16 => UnsignedInt,
    u32 => UnsignedInt,
    u64 => UnsignedInt,
    f16 => Float,
    f32 => Float,
    f64 => Float,
    Complex32 => Complex,
    Complex64 => Complex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_type_codes() {
        assert_eq!(i16::ELEMENT_TYPE.to_string(), "i16");
        assert_eq!(u64::ELEMENT_TYPE.to_string(), "u64");
        assert_eq!(f16::ELEMENT_TYPE.to_string(), "f16");
        assert_eq!(Complex32::ELEMENT_TYPE.to_string(), "c64");
        assert_eq!(Complex64::ELEMENT_TYPE.to_string(), "c128");
    }
}
