//! Comparison of two arrays.
//!
//! Metadata is compared first, in header order, and the first mismatch is
//! reported. Data is then compared as raw bytes: the L1 and L2 norms are sums
//! over byte differences, not over decoded element values.

use crate::array::RawArray;
use std::fmt;

/// How to compare the data regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffMode {
    /// Find the first differing byte.
    #[default]
    Exact,
    /// Sum of absolute byte differences.
    L1,
    /// Sum of squared byte differences.
    L2,
}

/// The metadata field that differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Flag bits.
    Flags,
    /// Element kind.
    ElType,
    /// Element width.
    ElWidth,
    /// Stored data size.
    Size,
    /// Number of dimensions.
    Rank,
    /// A dimension.
    Dims,
}

/// How the data regions differ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataMismatch {
    /// The first differing byte, from [`DiffMode::Exact`].
    Byte {
        /// Offset into the data region.
        position: usize,
        /// Byte in the first array.
        left: u8,
        /// Byte in the second array.
        right: u8,
    },
    /// Non-zero norm from [`DiffMode::L1`] or [`DiffMode::L2`].
    Norm(f64),
}

/// Outcome of [`diff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiffResult {
    /// Metadata and data agree.
    Equal,
    /// A metadata field differs.
    Metadata(DiffKind),
    /// Metadata agrees but the data differs.
    Data(DataMismatch),
}

impl DiffResult {
    /// Returns `true` for [`DiffResult::Equal`].
    pub fn is_equal(&self) -> bool {
        matches!(self, Self::Equal)
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "arrays are identical"),
            Self::Metadata(kind) => write!(f, "{kind:?} differ"),
            Self::Data(DataMismatch::Byte { position, left, right }) => {
                write!(f, "data differ at byte {position}: {left} != {right}")
            }
            Self::Data(DataMismatch::Norm(norm)) => write!(f, "data differ: norm = {norm}"),
        }
    }
}

/// Compares `a` and `b`.
///
/// # Example
///
/// ```
/// use rawarray::{diff, DataMismatch, DiffMode, DiffResult, RawArray};
///
/// let a = RawArray::from_elements(&[3], &[1u8, 2, 3])?;
/// let b = RawArray::from_elements(&[3], &[1u8, 5, 3])?;
/// assert_eq!(diff(&a, &a, DiffMode::Exact), DiffResult::Equal);
/// assert_eq!(
///     diff(&a, &b, DiffMode::Exact),
///     DiffResult::Data(DataMismatch::Byte { position: 1, left: 2, right: 5 }),
/// );
/// # Ok::<_, rawarray::CreateError>(())
/// ```
pub fn diff(a: &RawArray, b: &RawArray, mode: DiffMode) -> DiffResult {
    if let Some(kind) = metadata_mismatch(a, b) {
        return DiffResult::Metadata(kind);
    }
    let pairs = a.data().iter().zip(b.data()).map(|(&x, &y)| (x, y));
    let norm = match mode {
        DiffMode::Exact => {
            return match pairs.enumerate().find(|(_, (x, y))| x != y) {
                Some((position, (left, right))) => {
                    DiffResult::Data(DataMismatch::Byte { position, left, right })
                }
                None => DiffResult::Equal,
            };
        }
        DiffMode::L1 => pairs.map(|(x, y)| f64::from(x.abs_diff(y))).sum::<f64>(),
        DiffMode::L2 => pairs.map(|(x, y)| f64::from(x.abs_diff(y)).powi(2)).sum::<f64>(),
    };
    if norm == 0.0 {
        DiffResult::Equal
    } else {
        DiffResult::Data(DataMismatch::Norm(norm))
    }
}

fn metadata_mismatch(a: &RawArray, b: &RawArray) -> Option<DiffKind> {
    if a.flags() != b.flags() {
        return Some(DiffKind::Flags);
    }
    if a.kind() != b.kind() {
        return Some(DiffKind::ElType);
    }
    if a.width() != b.width() {
        return Some(DiffKind::ElWidth);
    }
    if a.byte_size() != b.byte_size() {
        return Some(DiffKind::Size);
    }
    if a.rank() != b.rank() {
        return Some(DiffKind::Rank);
    }
    (a.dims() != b.dims()).then_some(DiffKind::Dims)
}

impl RawArray {
    /// Compares this array with `other`. See [`diff`].
    pub fn diff(&self, other: &RawArray, mode: DiffMode) -> DiffResult {
        diff(self, other, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array::Layout, ra::header::Flags};

    fn bytes(values: &[u8]) -> RawArray {
        RawArray::from_elements(&[values.len() as u64], values).unwrap()
    }

    #[test]
    fn self_is_equal_in_every_mode() {
        let a = bytes(&[1, 2, 3, 4]);
        for mode in [DiffMode::Exact, DiffMode::L1, DiffMode::L2] {
            assert_eq!(a.diff(&a, mode), DiffResult::Equal);
        }
    }

    #[test]
    fn layout_does_not_matter() {
        let a = bytes(&[9; 8]);
        let b = a.clone().into_layout(Layout::Unified).unwrap();
        assert_eq!(diff(&a, &b, DiffMode::Exact), DiffResult::Equal);
    }

    #[test]
    fn norms_use_raw_bytes() {
        let a = bytes(&[0, 10, 200]);
        let b = bytes(&[3, 10, 196]);
        assert_eq!(diff(&a, &b, DiffMode::L1), DiffResult::Data(DataMismatch::Norm(7.0)));
        assert_eq!(diff(&a, &b, DiffMode::L2), DiffResult::Data(DataMismatch::Norm(25.0)));
    }

    #[test]
    fn metadata_short_circuits_in_order() {
        let a = RawArray::create("u16", &[2, 3], Flags::empty()).unwrap();
        let flagged = RawArray::create("i8", &[2], Flags::empty().with(Flags::BIG_ENDIAN)).unwrap();
        assert_eq!(diff(&a, &flagged, DiffMode::Exact), DiffResult::Metadata(DiffKind::Flags));
        let signed = RawArray::create("i16", &[2, 3], Flags::empty()).unwrap();
        assert_eq!(diff(&a, &signed, DiffMode::Exact), DiffResult::Metadata(DiffKind::ElType));
        let wide = RawArray::create("u32", &[2, 3], Flags::empty()).unwrap();
        assert_eq!(diff(&a, &wide, DiffMode::Exact), DiffResult::Metadata(DiffKind::ElWidth));
        let small = RawArray::create("u16", &[2, 2], Flags::empty()).unwrap();
        assert_eq!(diff(&a, &small, DiffMode::Exact), DiffResult::Metadata(DiffKind::Size));
        let flat = RawArray::create("u16", &[6], Flags::empty()).unwrap();
        assert_eq!(diff(&a, &flat, DiffMode::Exact), DiffResult::Metadata(DiffKind::Rank));
        let transposed = RawArray::create("u16", &[3, 2], Flags::empty()).unwrap();
        assert_eq!(diff(&a, &transposed, DiffMode::L2), DiffResult::Metadata(DiffKind::Dims));
    }
}
