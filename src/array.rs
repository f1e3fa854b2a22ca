//! The in-memory array and its two ownership layouts.

use crate::{
    eltype::{ElementKind, ElementType, ParseTypeCodeError},
    ra::{
        self,
        header::{
            element_count, encode_prelude, ByteOrderPolicy, FileOrder, Flags, Header, Prelude,
            FIXED_HEADER_LEN,
        },
        io::{chunked_read, chunked_write},
        Element, ReadOptions, ReadRaError, WriteRaError,
    },
};
use byteorder::{ByteOrder, NativeEndian};
use std::{borrow::Cow, collections::TryReserveError, io, mem, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

/// How an array owns its memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// One buffer holding the encoded header, the dimensions and the data, as
    /// they appear on disk.
    #[default]
    Unified,
    /// Separate dimension and data buffers.
    Split,
}

#[derive(Clone, Debug)]
enum Storage {
    /// `buf` is a complete file image. Its header prefix is kept in sync with
    /// the fields of [`RawArray`].
    Unified { buf: Vec<u8>, rank: usize },
    Split { dims: Vec<u64>, data: Vec<u8> },
}

const fn data_offset(rank: usize) -> usize {
    FIXED_HEADER_LEN + 8 * rank
}

fn unified_dims(buf: &[u8], rank: usize) -> Vec<u64> {
    let mut dims = vec![0; rank];
    NativeEndian::read_u64_into(&buf[FIXED_HEADER_LEN..data_offset(rank)], &mut dims);
    dims
}

/// The big-endian flag bit for the byte order opposite to the host's.
const fn foreign_order_bit() -> u64 {
    Flags::host().bits() ^ Flags::BIG_ENDIAN
}

/// Allocates `len` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn zeroed_buffer(len: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// A dense N-dimensional array of typed elements: the contents of one `.ra`
/// file.
///
/// Equality compares metadata and data bytes, not the ownership layout.
#[derive(Clone, Debug)]
pub struct RawArray {
    flags: Flags,
    eltype: ElementType,
    storage: Storage,
}

impl RawArray {
    /// Creates a zero-filled array in the unified layout from a type code
    /// such as `"f32"`.
    ///
    /// # Example
    ///
    /// ```
    /// use rawarray::{Flags, RawArray};
    ///
    /// let arr = RawArray::create("f32", &[3, 4], Flags::empty())?;
    /// assert_eq!(arr.byte_size(), 48);
    /// # Ok::<_, rawarray::CreateError>(())
    /// ```
    pub fn create(type_code: &str, dims: &[u64], flags: Flags) -> Result<Self, CreateError> {
        Self::zeros(type_code.parse()?, dims, flags)
    }

    /// Creates a zero-filled array in the unified layout.
    pub fn zeros(eltype: ElementType, dims: &[u64], flags: Flags) -> Result<Self, CreateError> {
        let eltype = ElementType::new(eltype.kind, eltype.width)?;
        let size = element_count(dims)
            .and_then(|n| n.checked_mul(eltype.width))
            .ok_or(CreateError::LengthOverflow)?;
        let total = usize::try_from(size)
            .ok()
            .and_then(|n| n.checked_add(data_offset(dims.len())))
            .ok_or(CreateError::LengthOverflow)?;
        let mut buf = zeroed_buffer(total).map_err(|_| CreateError::Allocation(total as u64))?;
        NativeEndian::write_u64_into(dims, &mut buf[FIXED_HEADER_LEN..data_offset(dims.len())]);
        let mut array = Self {
            flags,
            eltype,
            storage: Storage::Unified { buf, rank: dims.len() },
        };
        array.sync_prefix();
        Ok(array)
    }

    /// Creates an array in the split layout from owned parts.
    ///
    /// Unless `flags` marks the data compressed, `data.len()` must equal the
    /// element width times the number of elements.
    pub fn from_parts(
        eltype: ElementType,
        dims: Vec<u64>,
        data: Vec<u8>,
        flags: Flags,
    ) -> Result<Self, CreateError> {
        let eltype = ElementType::new(eltype.kind, eltype.width)?;
        let expected = element_count(&dims)
            .and_then(|n| n.checked_mul(eltype.width))
            .ok_or(CreateError::LengthOverflow)?;
        if !flags.is_compressed() && expected != data.len() as u64 {
            return Err(CreateError::SizeMismatch { expected, actual: data.len() as u64 });
        }
        Ok(Self { flags, eltype, storage: Storage::Split { dims, data } })
    }

    /// Creates an array in the split layout by copying `elements`, in
    /// row-major order, marked with the host byte order.
    pub fn from_elements<A: Element>(dims: &[u64], elements: &[A]) -> Result<Self, CreateError> {
        Self::from_parts(
            A::ELEMENT_TYPE,
            dims.to_vec(),
            bytemuck::cast_slice(elements).to_vec(),
            Flags::host(),
        )
    }

    /// Reads the file at `path` into the unified layout.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ReadRaError> {
        Self::read_with(path, &ReadOptions::default())
    }

    /// Reads the file at `path` with the given options.
    pub fn read_with<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self, ReadRaError> {
        let file = ra::open(path.as_ref())?;
        Self::read_from(file, options)
    }

    /// Reads an array from `reader`. Bytes after the data region are left
    /// unread.
    pub fn read_from<R: io::Read>(mut reader: R, options: &ReadOptions) -> Result<Self, ReadRaError> {
        let mut fixed = [0; FIXED_HEADER_LEN];
        chunked_read(&mut reader, &mut fixed)?;
        let prelude = Prelude::decode(&fixed, options.byte_order)?;
        let dims_len = prelude.dims_len()?;
        let mut dims_buf =
            zeroed_buffer(dims_len).map_err(|_| ReadRaError::Allocation(dims_len as u64))?;
        chunked_read(&mut reader, &mut dims_buf)?;
        let header = prelude.into_header(prelude.decode_dims(&dims_buf))?;
        header.log_warnings();

        let data_len = usize::try_from(header.size).map_err(|_| ReadRaError::LengthOverflow)?;
        let storage = match options.layout {
            Layout::Unified => {
                let offset = header.encoded_len();
                let total = offset.checked_add(data_len).ok_or(ReadRaError::LengthOverflow)?;
                let mut buf =
                    zeroed_buffer(total).map_err(|_| ReadRaError::Allocation(total as u64))?;
                NativeEndian::write_u64_into(&header.dims, &mut buf[FIXED_HEADER_LEN..offset]);
                chunked_read(&mut reader, &mut buf[offset..])?;
                Storage::Unified { buf, rank: header.rank() }
            }
            Layout::Split => {
                let mut data = zeroed_buffer(data_len)
                    .map_err(|_| ReadRaError::Allocation(data_len as u64))?;
                chunked_read(&mut reader, &mut data)?;
                Storage::Split { dims: header.dims, data }
            }
        };
        let mut array = Self { flags: header.flags, eltype: header.eltype, storage };
        if options.byte_order == ByteOrderPolicy::Swap {
            // A swapped header means the writer had the other byte order, even
            // if it did not mark the data as such.
            if prelude.order == FileOrder::Swapped {
                array.flags = array.flags.without(Flags::BIG_ENDIAN).with(foreign_order_bit());
            }
            if array.flags.is_foreign_order() && !array.to_host_order() {
                warn!(flags = array.flags.bits(), "data left in foreign byte order");
            }
        }
        array.sync_prefix();
        Ok(array)
    }

    /// Writes the array to `path`, creating or truncating the file.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteRaError> {
        let file = ra::create(path.as_ref())?;
        self.write_to(file)
    }

    /// Writes the array to `writer`.
    ///
    /// A unified array goes out as a single chunked transfer.
    pub fn write_to<W: io::Write>(&self, mut writer: W) -> Result<(), WriteRaError> {
        match &self.storage {
            Storage::Unified { buf, .. } => chunked_write(&mut writer, buf)?,
            Storage::Split { data, .. } => {
                self.header().write(&mut writer)?;
                chunked_write(&mut writer, data)?;
            }
        }
        Ok(())
    }

    /// The ownership layout.
    pub fn layout(&self) -> Layout {
        match self.storage {
            Storage::Unified { .. } => Layout::Unified,
            Storage::Split { .. } => Layout::Split,
        }
    }

    /// Moves the array into `layout`, copying at most once.
    pub fn into_layout(self, layout: Layout) -> Result<Self, CreateError> {
        let Self { flags, eltype, storage } = self;
        let storage = match (storage, layout) {
            (Storage::Unified { mut buf, rank }, Layout::Split) => {
                let dims = unified_dims(&buf, rank);
                buf.drain(..data_offset(rank));
                Storage::Split { dims, data: buf }
            }
            (Storage::Split { dims, data }, Layout::Unified) => {
                let offset = data_offset(dims.len());
                let total = offset.checked_add(data.len()).ok_or(CreateError::LengthOverflow)?;
                let mut buf = Vec::new();
                buf.try_reserve_exact(total)
                    .map_err(|_| CreateError::Allocation(total as u64))?;
                buf.resize(offset, 0);
                NativeEndian::write_u64_into(&dims, &mut buf[FIXED_HEADER_LEN..]);
                buf.extend_from_slice(&data);
                Storage::Unified { buf, rank: dims.len() }
            }
            (storage, _) => storage,
        };
        let mut array = Self { flags, eltype, storage };
        array.sync_prefix();
        Ok(array)
    }

    /// Flag bits.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Element kind and width.
    pub fn eltype(&self) -> ElementType {
        self.eltype
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.eltype.kind
    }

    /// Bytes per element when uncompressed.
    pub fn width(&self) -> u64 {
        self.eltype.width
    }

    /// Returns `true` if the data region is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.is_compressed()
    }

    /// Size of the data region as stored.
    pub fn byte_size(&self) -> u64 {
        self.data().len() as u64
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        match &self.storage {
            Storage::Unified { rank, .. } => *rank,
            Storage::Split { dims, .. } => dims.len(),
        }
    }

    /// The dimensions.
    ///
    /// Borrowed in the split layout; decoded from the buffer in the unified
    /// layout.
    pub fn dims(&self) -> Cow<'_, [u64]> {
        match &self.storage {
            Storage::Unified { buf, rank } => Cow::Owned(unified_dims(buf, *rank)),
            Storage::Split { dims, .. } => Cow::Borrowed(dims),
        }
    }

    /// Number of elements, the product of the dimensions.
    pub fn num_elements(&self) -> u64 {
        // Checked at construction.
        element_count(&self.dims()).unwrap_or(u64::MAX)
    }

    /// The data bytes as stored.
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Unified { buf, rank } => &buf[data_offset(*rank)..],
            Storage::Split { data, .. } => data,
        }
    }

    /// Mutable access to the data bytes. The length cannot change.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Unified { buf, rank } => &mut buf[data_offset(*rank)..],
            Storage::Split { data, .. } => data,
        }
    }

    /// Copies the data out as elements of type `A`.
    ///
    /// Returns `None` if `A` does not match the element type or the data is
    /// compressed.
    pub fn to_elements<A: Element>(&self) -> Option<Vec<A>> {
        if self.eltype != A::ELEMENT_TYPE || self.is_compressed() {
            return None;
        }
        Some(
            self.data()
                .chunks_exact(mem::size_of::<A>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }

    /// The metadata as a standalone header.
    pub fn header(&self) -> Header {
        Header {
            flags: self.flags,
            eltype: self.eltype,
            size: self.byte_size(),
            dims: self.dims().into_owned(),
        }
    }

    /// Changes the dimensions, keeping the number of elements.
    ///
    /// # Example
    ///
    /// ```
    /// use rawarray::{Flags, RawArray};
    ///
    /// let mut arr = RawArray::create("i16", &[2, 6], Flags::empty())?;
    /// arr.reshape(&[3, 2, 2])?;
    /// assert_eq!(&*arr.dims(), &[3, 2, 2]);
    /// assert!(arr.reshape(&[5]).is_err());
    /// # Ok::<_, Box<dyn std::error::Error>>(())
    /// ```
    pub fn reshape(&mut self, new_dims: &[u64]) -> Result<(), ReshapeError> {
        let old = element_count(&self.dims()).ok_or(ReshapeError::LengthOverflow)?;
        let new = element_count(new_dims).ok_or(ReshapeError::LengthOverflow)?;
        if old != new {
            return Err(ReshapeError::ElementCount { old, new });
        }
        match &mut self.storage {
            Storage::Unified { buf, rank } => {
                let mut encoded = vec![0; 8 * new_dims.len()];
                NativeEndian::write_u64_into(new_dims, &mut encoded);
                buf.splice(FIXED_HEADER_LEN..data_offset(*rank), encoded);
                *rank = new_dims.len();
            }
            Storage::Split { dims, .. } => *dims = new_dims.to_vec(),
        }
        self.sync_prefix();
        debug!(dims = ?new_dims, "reshaped");
        Ok(())
    }

    /// Replaces the data and type, leaving the array split.
    ///
    /// A unified buffer cannot hold data of a different length in place, so
    /// its dimensions are copied out before it is released.
    pub(crate) fn replace_data(&mut self, eltype: ElementType, flags: Flags, data: Vec<u8>) {
        let placeholder = Storage::Split { dims: Vec::new(), data: Vec::new() };
        let dims = match mem::replace(&mut self.storage, placeholder) {
            Storage::Unified { buf, rank } => {
                debug!("releasing unified buffer");
                unified_dims(&buf, rank)
            }
            Storage::Split { dims, .. } => dims,
        };
        self.storage = Storage::Split { dims, data };
        self.eltype = eltype;
        self.flags = flags;
    }

    /// Rewrites the header prefix of a unified buffer from the fields.
    fn sync_prefix(&mut self) {
        if let Storage::Unified { buf, rank } = &mut self.storage {
            let size = (buf.len() - data_offset(*rank)) as u64;
            encode_prelude(buf, self.flags, self.eltype, size, *rank as u64);
        }
    }

    /// Byte-swaps every scalar component if the big-endian flag disagrees
    /// with the host, then marks the data host-ordered.
    ///
    /// Returns `false` without changes if the data is compressed or
    /// user-typed; the flag then still records the foreign order, so the
    /// array can be swapped after [`decompress`](Self::decompress).
    /// Returns `true` if the data is host-ordered afterwards.
    ///
    /// # Example
    ///
    /// ```
    /// use rawarray::{Flags, RawArray};
    ///
    /// let foreign = Flags::host().bits() ^ Flags::BIG_ENDIAN;
    /// let data = 0x0102u16.swap_bytes().to_ne_bytes().to_vec();
    /// let mut arr = RawArray::from_parts("u16".parse()?, vec![1], data, Flags::from_bits(foreign))?;
    /// assert!(arr.to_host_order());
    /// assert_eq!(arr.to_elements::<u16>(), Some(vec![0x0102]));
    /// assert_eq!(arr.flags(), Flags::host());
    /// # Ok::<_, Box<dyn std::error::Error>>(())
    /// ```
    pub fn to_host_order(&mut self) -> bool {
        if !self.flags.is_foreign_order() {
            return true;
        }
        let host = self.flags.without(Flags::BIG_ENDIAN).with(Flags::host().bits());
        if self.is_compressed() || self.kind() == ElementKind::User {
            debug!("foreign byte order left as is");
            return false;
        }
        let width = self.eltype.component_width() as usize;
        if width > 1 {
            for component in self.data_mut().chunks_exact_mut(width) {
                component.reverse();
            }
        }
        debug!(width, "swapped data to host byte order");
        self.flags = host;
        self.sync_prefix();
        true
    }
}

impl PartialEq for RawArray {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.eltype == other.eltype
            && self.dims() == other.dims()
            && self.data() == other.data()
    }
}

impl Eq for RawArray {}

/// An error creating an array.
#[derive(Debug, Error)]
pub enum CreateError {
    /// The type code or element width is invalid.
    #[error("invalid element type: {0}")]
    ElementType(#[from] ParseTypeCodeError),
    /// The number of elements or the size in bytes overflows.
    #[error("overflow computing length from shape")]
    LengthOverflow,
    /// The buffer could not be allocated.
    #[error("unable to allocate {0} bytes")]
    Allocation(u64),
    /// The data length disagrees with the element type and dimensions.
    #[error("data has {actual} bytes but the shape needs {expected}")]
    SizeMismatch {
        /// Bytes required by the shape.
        expected: u64,
        /// Bytes supplied.
        actual: u64,
    },
}

/// An error reshaping an array.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReshapeError {
    /// The new dimensions hold a different number of elements.
    #[error("cannot reshape {old} elements into {new}")]
    ElementCount {
        /// Elements in the current shape.
        old: u64,
        /// Elements in the requested shape.
        new: u64,
    },
    /// The element count of the new dimensions overflows.
    #[error("overflow computing number of elements")]
    LengthOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(layout: Layout) -> RawArray {
        let values: Vec<u16> = (0..12).collect();
        RawArray::from_elements(&[3, 4], &values)
            .unwrap()
            .into_layout(layout)
            .unwrap()
    }

    #[test]
    fn create_is_zeroed_and_unified() {
        let arr = RawArray::create("c64", &[2, 5], Flags::empty()).unwrap();
        assert_eq!(arr.layout(), Layout::Unified);
        assert_eq!(arr.byte_size(), 80);
        assert_eq!(arr.rank(), 2);
        assert!(arr.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn unified_buffer_is_a_file_image() {
        let arr = sample(Layout::Unified);
        let mut file = Vec::new();
        arr.write_to(&mut file).unwrap();
        let Storage::Unified { buf, .. } = &arr.storage else { panic!("not unified") };
        assert_eq!(&file, buf);
        assert_eq!(buf.len(), 48 + 16 + 24);
    }

    #[test]
    fn layouts_write_identical_bytes() {
        let mut unified = Vec::new();
        sample(Layout::Unified).write_to(&mut unified).unwrap();
        let mut split = Vec::new();
        sample(Layout::Split).write_to(&mut split).unwrap();
        assert_eq!(unified, split);
    }

    #[test]
    fn layout_round_trip_preserves_contents() {
        let arr = sample(Layout::Split);
        let back = arr
            .clone()
            .into_layout(Layout::Unified)
            .and_then(|arr| arr.into_layout(Layout::Split))
            .unwrap();
        assert_eq!(back, arr);
        assert_eq!(back.layout(), Layout::Split);
    }

    #[test]
    fn reshape_in_both_layouts() {
        for layout in [Layout::Unified, Layout::Split] {
            let mut arr = sample(layout);
            arr.reshape(&[2, 3, 2]).unwrap();
            assert_eq!(&*arr.dims(), &[2, 3, 2]);
            assert_eq!(arr.layout(), layout);
            let mut written = Vec::new();
            arr.write_to(&mut written).unwrap();
            assert_eq!(written[..64], arr.header().to_bytes()[..]);
            assert_eq!(
                arr.reshape(&[5, 5]),
                Err(ReshapeError::ElementCount { old: 12, new: 25 })
            );
            arr.reshape(&[3, 4]).unwrap();
            assert_eq!(arr, sample(layout));
        }
    }

    #[test]
    fn from_parts_checks_size() {
        let err = RawArray::from_parts("u8".parse().unwrap(), vec![4], vec![0; 3], Flags::empty())
            .unwrap_err();
        assert!(matches!(err, CreateError::SizeMismatch { expected: 4, actual: 3 }));
        let compressed = Flags::empty().with(Flags::COMPRESSED);
        assert!(RawArray::from_parts("u8".parse().unwrap(), vec![4], vec![0; 3], compressed).is_ok());
    }

    #[test]
    fn replace_data_splits_unified() {
        let mut arr = sample(Layout::Unified);
        arr.replace_data("u8".parse().unwrap(), arr.flags(), vec![7; 12]);
        assert_eq!(arr.layout(), Layout::Split);
        assert_eq!(&*arr.dims(), &[3, 4]);
        assert_eq!(arr.byte_size(), 12);
    }

    #[test]
    fn element_access_checks_type() {
        let arr = sample(Layout::Unified);
        assert_eq!(arr.to_elements::<u16>().unwrap()[11], 11);
        assert!(arr.to_elements::<i16>().is_none());
    }

    #[test]
    fn foreign_compressed_data_keeps_its_order_flag() {
        let foreign = Flags::from_bits(foreign_order_bit());
        let swapped: Vec<u8> = [1u16, 2, 258]
            .iter()
            .flat_map(|v| v.swap_bytes().to_ne_bytes())
            .collect();
        let mut arr =
            RawArray::from_parts("u16".parse().unwrap(), vec![3], swapped, foreign).unwrap();
        arr.compress().unwrap();
        assert!(!arr.to_host_order());
        assert!(arr.flags().is_foreign_order());
        arr.decompress().unwrap();
        assert!(arr.to_host_order());
        assert_eq!(arr.flags(), Flags::host());
        assert_eq!(arr.to_elements::<u16>().unwrap(), vec![1, 2, 258]);
    }

    #[test]
    fn host_order_is_left_alone() {
        let mut arr = sample(Layout::Unified);
        let before = arr.clone();
        assert!(arr.to_host_order());
        assert_eq!(arr, before);
    }

    #[test]
    fn rank_zero_holds_one_element() {
        let arr = RawArray::create("f64", &[], Flags::empty()).unwrap();
        assert_eq!(arr.num_elements(), 1);
        assert_eq!(arr.byte_size(), 8);
    }
}
