mod elements;
pub mod header;
pub mod io;

pub use self::elements::Element;
use self::header::{ByteOrderPolicy, Header, ParseHeaderError, ReadHeaderError};
use crate::array::{Layout, RawArray};
use std::{
    fs,
    io as stdio,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Options controlling how a file is read.
///
/// # Example
///
/// ```no_run
/// use rawarray::{ByteOrderPolicy, Layout, RawArray, ReadOptions};
/// # use rawarray::ReadRaError;
///
/// let options = ReadOptions::new()
///     .layout(Layout::Split)
///     .byte_order(ByteOrderPolicy::Swap);
/// let arr = RawArray::read_with("array.ra", &options)?;
/// # Ok::<_, ReadRaError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Ownership layout of the returned array.
    pub layout: Layout,
    /// Treatment of foreign byte order.
    pub byte_order: ByteOrderPolicy,
}

impl ReadOptions {
    /// Unified layout, host byte order only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ownership layout.
    #[must_use]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the byte order policy.
    #[must_use]
    pub fn byte_order(mut self, byte_order: ByteOrderPolicy) -> Self {
        self.byte_order = byte_order;
        self
    }
}

/// Reads a `.ra` file located at the specified path.
///
/// This is a convenience function for [`RawArray::read`].
///
/// # Example
///
/// ```no_run
/// use rawarray::read_ra;
/// # use rawarray::ReadRaError;
///
/// let arr = read_ra("array.ra")?;
/// println!("{}", arr.header());
/// # Ok::<_, ReadRaError>(())
/// ```
pub fn read_ra<P: AsRef<Path>>(path: P) -> Result<RawArray, ReadRaError> {
    RawArray::read(path)
}

/// Writes an array to a `.ra` file at the specified path.
///
/// The file is created if it does not exist and truncated if it does.
pub fn write_ra<P: AsRef<Path>>(path: P, array: &RawArray) -> Result<(), WriteRaError> {
    array.write(path)
}

/// Reads only the header (metadata and dimensions) of the file at `path`.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header, ReadRaError> {
    read_header_with(path, ByteOrderPolicy::Native)
}

/// Reads only the header of the file at `path`, using `byte_order`.
pub fn read_header_with<P: AsRef<Path>>(
    path: P,
    byte_order: ByteOrderPolicy,
) -> Result<Header, ReadRaError> {
    let file = open(path.as_ref())?;
    Ok(Header::from_reader(file, byte_order)?)
}

pub(crate) fn open(path: &Path) -> Result<fs::File, ReadRaError> {
    fs::File::open(path).map_err(|err| match err.kind() {
        stdio::ErrorKind::NotFound => ReadRaError::NotFound(path.to_owned()),
        _ => ReadRaError::Io(err),
    })
}

pub(crate) fn create(path: &Path) -> stdio::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(0o644);
    }
    options.open(path)
}

/// An error reading a `.ra` file.
#[derive(Debug, Error)]
pub enum ReadRaError {
    /// An error caused by I/O, including a short read.
    #[error("I/O error: {0}")]
    Io(#[from] stdio::Error),
    /// The file does not exist.
    #[error("no such file: {}", .0.display())]
    NotFound(PathBuf),
    /// An error parsing the file header.
    #[error("error parsing header: {0}")]
    ParseHeader(#[from] ParseHeaderError),
    /// The data length does not fit in memory on this platform.
    #[error("overflow computing length of data")]
    LengthOverflow,
    /// The data buffer could not be allocated.
    #[error("unable to allocate {0} bytes for data")]
    Allocation(u64),
}

impl From<ReadHeaderError> for ReadRaError {
    fn from(err: ReadHeaderError) -> Self {
        match err {
            ReadHeaderError::Io(err) => Self::Io(err),
            ReadHeaderError::Parse(err) => Self::ParseHeader(err),
        }
    }
}

/// An error writing a `.ra` file.
#[derive(Debug, Error)]
pub enum WriteRaError {
    /// An error caused by I/O, including a short write.
    #[error("I/O error: {0}")]
    Io(#[from] stdio::Error),
}
