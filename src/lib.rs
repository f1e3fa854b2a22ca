#![doc = include_str!("../README.md")]
//! ## Operate .ra Files
//!
//! - Reading
//!   - [`RawArray::read`] and [`RawArray::read_with`] for files, with
//!     [`ReadOptions`] choosing the [`Layout`] and [`ByteOrderPolicy`]
//!   - [`RawArray::read_from`] for any reader
//!   - [`read_ra`] convenience function
//!   - [`read_header`] to decode only the header
//!   - [`header::read_dims`] and friends to peek at single header fields
//! - Writing
//!   - [`RawArray::write`] and [`RawArray::write_to`]
//!   - [`write_ra`] convenience function
//! - Transforming
//!   - [`RawArray::reshape`]
//!   - [`RawArray::convert`] between element types
//!   - [`RawArray::compress`], [`RawArray::decompress`] and
//!     [`RawArray::quantize_and_compress`]
//! - Comparing: [`diff`] and [`RawArray::diff`]
//!
//! With the `ndarray` feature, [`RawArray::from_ndarray`] and
//! [`RawArray::to_ndarray`] bridge to [`ndarray::ArrayD`].
//!
//! ## Logging
//!
//! Non-fatal conditions, such as unknown flag bits or lossy conversions, are
//! emitted as [`tracing`] warnings. The crate never installs a subscriber.
//!
//! ## Limitations
//!
//! - Compressed data is a single LZ4 block; files larger than the block
//!   format allows cannot be compressed.
//! - Data is never byte-swapped unless [`ByteOrderPolicy::Swap`] is
//!   requested, and compressed or user-typed data is never swapped.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs)]

mod array;
mod compress;
mod convert;
mod diff;
mod eltype;
mod error;
mod ra;

#[cfg(feature = "ndarray")]
mod impl_ndarray;

pub use crate::{
    array::{CreateError, Layout, RawArray, ReshapeError},
    compress::{CompressError, Quantization},
    convert::{is_supported, ConvertError, ConvertOutcome},
    diff::{diff, DataMismatch, DiffKind, DiffMode, DiffResult},
    eltype::{ElementKind, ElementType, ParseTypeCodeError},
    error::{Error, ErrorKind, Warning},
    ra::{
        header::{self, ByteOrderPolicy, Flags, Header, ParseHeaderError, ReadHeaderError},
        io, read_header, read_header_with, read_ra, write_ra, Element, ReadOptions, ReadRaError,
        WriteRaError,
    },
};
#[cfg(feature = "ndarray")]
pub use crate::impl_ndarray::ToNdarrayError;
