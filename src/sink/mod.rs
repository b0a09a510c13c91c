//! Reliable delivery of compressed bytes to a sink.
//!
//! [`write_all`] is the only path by which the frame writer touches its sink
//! for data.  Unlike [`std::io::Write::write_all`] it tolerates exactly one
//! zero-length transfer in a row before giving up, so a sink that keeps
//! accepting nothing fails with `WouldBlock` instead of `WriteZero` and the
//! caller never spins.
//!
//! [`NonSeekable`] turns any plain writer (pipe, socket, `Vec<u8>`) into a
//! sink whose positioning requests always fail.  The frame writer reports
//! that as "sink not seekable" when content-size recording is requested.

use std::io::{self, Seek, SeekFrom, Write};

/// Write every byte of `buf` to `sink`.
///
/// Retries on `Interrupted`.  A zero-byte transfer is retried once; a second
/// zero-byte transfer in a row fails with `ErrorKind::WouldBlock`.  Any other
/// error is returned as-is.
pub fn write_all<W: Write + ?Sized>(sink: &mut W, mut buf: &[u8]) -> io::Result<()> {
    let mut stalled = false;
    while !buf.is_empty() {
        match sink.write(buf) {
            Ok(0) => {
                if stalled {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "sink keeps accepting zero bytes",
                    ));
                }
                stalled = true;
            }
            Ok(n) => {
                stalled = false;
                buf = &buf[n.min(buf.len())..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ── NonSeekable ──────────────────────────────────────────────────────────────

/// A sink that cannot report or change its position.
#[derive(Debug, Default)]
pub struct NonSeekable<W> {
    inner: W,
}

impl<W: Write> NonSeekable<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for NonSeekable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for NonSeekable<W> {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sink does not support seeking",
        ))
    }
}
