//! The umbrella error type and non-fatal warnings.

use crate::{
    array::{CreateError, ReshapeError},
    compress::CompressError,
    convert::ConvertError,
    eltype::ElementType,
    ra::{ReadRaError, WriteRaError},
};
use std::{fmt, io};
use thiserror::Error;

/// A condition worth reporting that does not stop the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// The header sets flag bits this version does not understand.
    UnknownFlags(u64),
    /// A complex to real conversion drops the imaginary parts.
    DiscardsImaginary {
        /// Source type.
        from: ElementType,
        /// Target type.
        to: ElementType,
    },
    /// The target type is narrower than the source and may lose precision.
    Narrowing {
        /// Source type.
        from: ElementType,
        /// Target type.
        to: ElementType,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownFlags(bits) => {
                write!(f, "unknown flags {bits:#x} set; file may be from a newer version")
            }
            Self::DiscardsImaginary { from, to } => {
                write!(f, "converting {from} to {to} discards the imaginary part")
            }
            Self::Narrowing { from, to } => {
                write!(f, "converting {from} to {to} may lose precision")
            }
        }
    }
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a file failed.
    #[error(transparent)]
    Read(#[from] ReadRaError),
    /// Writing a file failed.
    #[error(transparent)]
    Write(#[from] WriteRaError),
    /// Creating an array failed.
    #[error(transparent)]
    Create(#[from] CreateError),
    /// Reshaping failed.
    #[error(transparent)]
    Reshape(#[from] ReshapeError),
    /// Type conversion failed.
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// Compression or decompression failed.
    #[error(transparent)]
    Compress(#[from] CompressError),
    /// Invalid command-line arguments.
    #[error("{0}")]
    Usage(String),
}

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic number or malformed header.
    Format,
    /// Failed or short transfer, or failure to open.
    Io,
    /// The input file does not exist.
    NotFound,
    /// A buffer could not be allocated.
    Allocation,
    /// No rule converts between the requested types.
    UnsupportedConversion,
    /// The new shape holds a different number of elements.
    Reshape,
    /// The compressor or decompressor failed.
    Compression,
    /// Invalid command-line arguments.
    Usage,
}

impl ErrorKind {
    /// Process exit status for the kind, following `sysexits.h`.
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Usage => 64,
            Self::Format | Self::UnsupportedConversion | Self::Reshape | Self::Compression => 65,
            Self::NotFound => 66,
            Self::Allocation => 71,
            Self::Io => 74,
        }
    }
}

fn io_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::OutOfMemory => ErrorKind::Allocation,
        _ => ErrorKind::Io,
    }
}

impl Error {
    /// Broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Read(err) => match err {
                ReadRaError::Io(err) => io_kind(err),
                ReadRaError::NotFound(_) => ErrorKind::NotFound,
                ReadRaError::ParseHeader(_) | ReadRaError::LengthOverflow => ErrorKind::Format,
                ReadRaError::Allocation(_) => ErrorKind::Allocation,
            },
            Self::Write(WriteRaError::Io(err)) => io_kind(err),
            Self::Create(err) => match err {
                CreateError::ElementType(_) => ErrorKind::Usage,
                CreateError::Allocation(_) => ErrorKind::Allocation,
                CreateError::LengthOverflow | CreateError::SizeMismatch { .. } => ErrorKind::Format,
            },
            Self::Reshape(_) => ErrorKind::Reshape,
            Self::Convert(ConvertError::Allocation(_)) => ErrorKind::Allocation,
            Self::Convert(_) => ErrorKind::UnsupportedConversion,
            Self::Compress(CompressError::Allocation(_)) => ErrorKind::Allocation,
            Self::Compress(_) => ErrorKind::Compression,
            Self::Usage(_) => ErrorKind::Usage,
        }
    }

    /// Process exit status for the error.
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}
