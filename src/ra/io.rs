//! Bounded-chunk transfers.
//!
//! Every transfer is split into calls of at most [`MAX_CHUNK_BYTES`]. A call
//! that moves fewer bytes than requested is an error: there is no resuming
//! after a partial transfer.

use std::io;
use tracing::debug;

/// Largest number of bytes passed to a single `read`/`write` call.
///
/// This is `2^31` minus one page, the most Linux will move in one system
/// call.
pub const MAX_CHUNK_BYTES: usize = (1 << 31) - 4096;

/// Fills `buf` from `reader` in chunks of at most [`MAX_CHUNK_BYTES`].
///
/// Fails with [`io::ErrorKind::UnexpectedEof`] if any call returns fewer bytes
/// than requested.
pub fn chunked_read<R: io::Read>(mut reader: R, buf: &mut [u8]) -> io::Result<()> {
    chunked_read_with_limit(&mut reader, buf, MAX_CHUNK_BYTES)
}

/// Writes all of `buf` to `writer` in chunks of at most [`MAX_CHUNK_BYTES`].
///
/// Fails with [`io::ErrorKind::WriteZero`] if any call accepts fewer bytes
/// than offered.
pub fn chunked_write<W: io::Write>(mut writer: W, buf: &[u8]) -> io::Result<()> {
    chunked_write_with_limit(&mut writer, buf, MAX_CHUNK_BYTES)
}

fn chunked_read_with_limit<R: io::Read>(
    reader: &mut R,
    buf: &mut [u8],
    limit: usize,
) -> io::Result<()> {
    let total = buf.len();
    let mut done = 0;
    for chunk in buf.chunks_mut(limit) {
        let requested = chunk.len();
        let got = retry_interrupted(|| reader.read(chunk))?;
        if got != requested {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at byte {done} of {total}: requested {requested}, got {got}"
                ),
            ));
        }
        done += got;
    }
    debug!(bytes = total, "chunked read complete");
    Ok(())
}

fn chunked_write_with_limit<W: io::Write>(
    writer: &mut W,
    buf: &[u8],
    limit: usize,
) -> io::Result<()> {
    let total = buf.len();
    let mut done = 0;
    for chunk in buf.chunks(limit) {
        let offered = chunk.len();
        let put = retry_interrupted(|| writer.write(chunk))?;
        if put != offered {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "short write at byte {done} of {total}: offered {offered}, wrote {put}"
                ),
            ));
        }
        done += put;
    }
    writer.flush()?;
    debug!(bytes = total, "chunked write complete");
    Ok(())
}

/// Repeats a call that was interrupted before transferring anything.
fn retry_interrupted(mut f: impl FnMut() -> io::Result<usize>) -> io::Result<usize> {
    loop {
        match f() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader handing out at most `cap` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        cap: usize,
        calls: usize,
    }

    impl io::Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            let n = buf.len().min(self.cap).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn reads_in_bounded_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let mut reader = Trickle { data: &data, cap: 16, calls: 0 };
        let mut buf = vec![0; 100];
        chunked_read_with_limit(&mut reader, &mut buf, 16).unwrap();
        assert_eq!(buf, data);
        assert_eq!(reader.calls, 7);
    }

    #[test]
    fn short_read_is_fatal() {
        let data = [1u8; 10];
        let mut reader = Trickle { data: &data, cap: 4, calls: 0 };
        let mut buf = [0u8; 10];
        let err = chunked_read_with_limit(&mut reader, &mut buf, 8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(reader.calls, 1);
    }

    #[test]
    fn eof_is_a_short_read() {
        let mut buf = [0u8; 4];
        let err = chunked_read(&[1u8, 2][..], &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn writes_in_bounded_chunks() {
        let data: Vec<u8> = (0..50).collect();
        let mut out = Vec::new();
        chunked_write_with_limit(&mut out, &data, 7).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn short_write_is_fatal() {
        let mut space = [0u8; 3];
        let err = chunked_write(&mut space[..], &[9u8; 5]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
