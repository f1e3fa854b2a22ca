use crate::{eltype::ElementType, CreateError, Element, RawArray};
use ndarray::{prelude::*, Data, IntoDimension as _};
use std::mem;
use thiserror::Error;

/// An error converting a [`RawArray`] into an [`ndarray::ArrayD`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToNdarrayError {
    /// The requested element type does not match the array.
    #[error("array holds {actual} elements, requested {requested}")]
    ElementType {
        /// Type of the stored elements.
        actual: ElementType,
        /// Type requested by the caller.
        requested: ElementType,
    },
    /// The data must be decompressed first.
    #[error("array data is compressed")]
    Compressed,
    /// A dimension or the total length does not fit in `usize`.
    #[error("shape does not fit in memory")]
    LengthOverflow,
}

impl RawArray {
    /// Copies an ndarray array into a new split-layout array in row-major
    /// order, whatever the memory order of `array`.
    ///
    /// # Example
    ///
    /// ```
    /// use ndarray::array;
    /// use rawarray::RawArray;
    ///
    /// let arr = RawArray::from_ndarray(&array![[1i16, 2, 3], [4, 5, 6]].reversed_axes())?;
    /// assert_eq!(&*arr.dims(), &[3, 2]);
    /// assert_eq!(arr.to_elements::<i16>(), Some(vec![1, 4, 2, 5, 3, 6]));
    /// # Ok::<_, rawarray::CreateError>(())
    /// ```
    pub fn from_ndarray<A, S, D>(array: &ArrayBase<S, D>) -> Result<Self, CreateError>
    where
        A: Element,
        S: Data<Elem = A>,
        D: Dimension,
    {
        let dims: Vec<u64> = array.shape().iter().map(|&n| n as u64).collect();
        match array.as_slice() {
            Some(elements) => Self::from_elements(&dims, elements),
            None => Self::from_elements(&dims, &array.iter().copied().collect::<Vec<_>>()),
        }
    }

    /// Copies the data out into a dynamic-dimensional ndarray array.
    pub fn to_ndarray<A: Element>(&self) -> Result<ArrayD<A>, ToNdarrayError> {
        if self.eltype() != A::ELEMENT_TYPE {
            return Err(ToNdarrayError::ElementType {
                actual: self.eltype(),
                requested: A::ELEMENT_TYPE,
            });
        }
        if self.is_compressed() {
            return Err(ToNdarrayError::Compressed);
        }
        let shape = self
            .dims()
            .iter()
            .map(|&n| usize::try_from(n).map_err(|_| ToNdarrayError::LengthOverflow))
            .collect::<Result<Vec<_>, _>>()?
            .into_dimension();
        shape_length_checked::<A>(&shape).ok_or(ToNdarrayError::LengthOverflow)?;
        let data = self.to_elements::<A>().ok_or(ToNdarrayError::Compressed)?;
        // The element count was validated when the array was built.
        ArrayD::from_shape_vec(shape, data).map_err(|_| ToNdarrayError::LengthOverflow)
    }
}

/// Returns `None` if the number of elements or the length in bytes would
/// overflow `isize`.
fn shape_length_checked<A>(shape: &IxDyn) -> Option<usize> {
    const MAX: usize = isize::MAX as usize;
    let len = shape.size_checked()?;
    (len.checked_mul(mem::size_of::<A>())? < MAX).then_some(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex32;

    #[test]
    fn standard_layout_round_trip() {
        let original = array![[[1.5f32, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]].into_dyn();
        let arr = RawArray::from_ndarray(&original).unwrap();
        assert_eq!(&*arr.dims(), &[2, 2, 2]);
        assert_eq!(arr.to_ndarray::<f32>().unwrap(), original);
    }

    #[test]
    fn complex_elements() {
        let original = array![Complex32::new(1.0, -1.0), Complex32::new(0.0, 2.0)];
        let arr = RawArray::from_ndarray(&original).unwrap();
        assert_eq!(arr.eltype().to_string(), "c64");
        assert_eq!(arr.to_ndarray::<Complex32>().unwrap(), original.into_dyn());
    }

    #[test]
    fn wrong_type_or_compressed() {
        let mut arr = RawArray::from_ndarray(&array![1u32, 2, 3]).unwrap();
        assert!(matches!(
            arr.to_ndarray::<i32>(),
            Err(ToNdarrayError::ElementType { .. })
        ));
        arr.compress().unwrap();
        assert_eq!(arr.to_ndarray::<u32>(), Err(ToNdarrayError::Compressed));
    }
}
