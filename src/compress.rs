//! Whole-buffer LZ4 compression of the data region.
//!
//! The compressed flag marks data holding a raw LZ4 block. The uncompressed
//! length is not stored: it is recomputed from the element width and the
//! dimensions.

use crate::{
    array::{zeroed_buffer, RawArray},
    eltype::{ElementKind, ElementType},
    ra::header::Flags,
};
use bytemuck::pod_read_unaligned;
use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use thiserror::Error;
use tracing::{debug, warn};

/// An error compressing or decompressing an array.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The compressor failed, e.g. by exceeding its worst-case bound.
    #[error("compression failed: {0}")]
    Compress(#[from] lz4_flex::block::CompressError),
    /// The compressed block is corrupt.
    #[error("decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    /// Decompression did not produce exactly the expected number of bytes.
    #[error("decompressed {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// `elbyte * product(dims)`.
        expected: u64,
        /// Bytes produced.
        actual: u64,
    },
    /// The uncompressed size overflows.
    #[error("overflow computing uncompressed size from shape")]
    LengthOverflow,
    /// An output buffer could not be allocated.
    #[error("unable to allocate {0} bytes")]
    Allocation(u64),
    /// Quantization needs integer elements of at most 64 bits.
    #[error("cannot quantize {0} elements")]
    NotQuantizable(ElementType),
}

/// What [`RawArray::quantize_and_compress`] did to the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantization {
    /// The minimum, subtracted from every element. It is not stored in the
    /// file; keep it to recover the original values.
    pub offset: i128,
    /// Element type before quantization.
    pub from: ElementType,
    /// Unsigned element type the shifted values were stored as.
    pub to: ElementType,
}

impl RawArray {
    /// Compresses the data region. Does nothing if it is already compressed.
    ///
    /// A unified array becomes split.
    pub fn compress(&mut self) -> Result<(), CompressError> {
        if self.is_compressed() {
            debug!("already compressed");
            return Ok(());
        }
        let out = compress_block(self.data())?;
        let (eltype, flags) = (self.eltype(), self.flags().with(Flags::COMPRESSED));
        self.replace_data(eltype, flags, out);
        Ok(())
    }

    /// Restores the uncompressed data region. Does nothing if the data is not
    /// compressed.
    ///
    /// A unified array becomes split.
    pub fn decompress(&mut self) -> Result<(), CompressError> {
        if !self.is_compressed() {
            debug!("not compressed");
            return Ok(());
        }
        let expected = self
            .header()
            .uncompressed_size()
            .ok_or(CompressError::LengthOverflow)?;
        let len = usize::try_from(expected).map_err(|_| CompressError::LengthOverflow)?;
        let mut out = zeroed_buffer(len).map_err(|_| CompressError::Allocation(expected))?;
        let actual = decompress_into(self.data(), &mut out)?;
        if actual != len {
            return Err(CompressError::SizeMismatch { expected, actual: actual as u64 });
        }
        debug!(compressed = self.byte_size(), raw = len, "decompressed");
        let (eltype, flags) = (self.eltype(), self.flags().without(Flags::COMPRESSED));
        self.replace_data(eltype, flags, out);
        Ok(())
    }

    /// Lossy compression for integer arrays: subtracts the minimum from
    /// every element, stores the results as the narrowest unsigned type that
    /// holds `max - min`, then compresses.
    ///
    /// Returns `None` without changes if the data is already compressed. On
    /// error the array is left unchanged.
    /// The subtracted minimum is only returned, never written to the file,
    /// so [`decompress`](Self::decompress) yields the shifted values.
    pub fn quantize_and_compress(&mut self) -> Result<Option<Quantization>, CompressError> {
        if self.is_compressed() {
            debug!("already compressed");
            return Ok(None);
        }
        let from = self.eltype();
        let read = integer_reader(from).ok_or(CompressError::NotQuantizable(from))?;
        let width = from.width as usize;

        let (min, max) = self
            .data()
            .chunks_exact(width)
            .map(read)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((v.min(lo), v.max(hi))),
            })
            .unwrap_or((0, 0));
        let to = ElementType {
            kind: ElementKind::UnsignedInt,
            width: narrowest_unsigned_width((max - min) as u128),
        };

        let len = self.num_elements() as usize * to.width as usize;
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| CompressError::Allocation(len as u64))?;
        for chunk in self.data().chunks_exact(width) {
            push_unsigned(&mut out, (read(chunk) - min) as u64, to.width);
        }
        let compressed = compress_block(&out)?;
        warn!(offset = %min, %from, %to, "quantized; the offset is not stored in the file");
        let flags = self.flags().with(Flags::COMPRESSED);
        self.replace_data(to, flags, compressed);
        Ok(Some(Quantization { offset: min, from, to }))
    }
}

/// Compresses `data` into a single LZ4 block.
fn compress_block(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let bound = get_maximum_output_size(data.len());
    let mut out = zeroed_buffer(bound).map_err(|_| CompressError::Allocation(bound as u64))?;
    let len = compress_into(data, &mut out)?;
    debug!(raw = data.len(), compressed = len, "compressed");
    out.truncate(len);
    out.shrink_to_fit();
    Ok(out)
}

fn integer_reader(eltype: ElementType) -> Option<fn(&[u8]) -> i128> {
    let read: fn(&[u8]) -> i128 = match (eltype.kind, eltype.width) {
        (ElementKind::SignedInt, 1) => |b| pod_read_unaligned::<i8>(b).into(),
        (ElementKind::SignedInt, 2) => |b| pod_read_unaligned::<i16>(b).into(),
        (ElementKind::SignedInt, 4) => |b| pod_read_unaligned::<i32>(b).into(),
        (ElementKind::SignedInt, 8) => |b| pod_read_unaligned::<i64>(b).into(),
        (ElementKind::UnsignedInt, 1) => |b| pod_read_unaligned::<u8>(b).into(),
        (ElementKind::UnsignedInt, 2) => |b| pod_read_unaligned::<u16>(b).into(),
        (ElementKind::UnsignedInt, 4) => |b| pod_read_unaligned::<u32>(b).into(),
        (ElementKind::UnsignedInt, 8) => |b| pod_read_unaligned::<u64>(b).into(),
        _ => return None,
    };
    Some(read)
}

fn narrowest_unsigned_width(range: u128) -> u64 {
    if range <= u8::MAX.into() {
        1
    } else if range <= u16::MAX.into() {
        2
    } else if range <= u32::MAX.into() {
        4
    } else {
        8
    }
}

fn push_unsigned(out: &mut Vec<u8>, value: u64, width: u64) {
    match width {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_ne_bytes()),
        4 => out.extend_from_slice(&(value as u32).to_ne_bytes()),
        _ => out.extend_from_slice(&value.to_ne_bytes()),
    }
}
