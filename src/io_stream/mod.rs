//! Streaming frame writer.
//!
//! [`FrameWriter`] feeds every `write` through the compression engine and
//! sends whatever the engine produces straight to the sink, so memory use
//! stays at one engine-sized output buffer regardless of input size.
//!
//! # Content size
//! The uncompressed size belongs at the start of the frame but is only known
//! once all input has been seen.  When size recording is requested the
//! writer remembers the sink position, reserves [`RESERVED_LEN`] bytes, and
//! on `close()` seeks back and rewrites the first [`HEADER_LEN`] bytes of the
//! frame (see [`crate::frame`]).  The sink must therefore be seekable; a sink
//! that cannot report its position fails `open` instead of producing a
//! frame that would need buffering.  Sinks that ignore the position for
//! writes (files opened for appending) are caught by checking where each
//! reserved or patched write actually landed.
//!
//! # Failure
//! Engine and sink failures poison the handle: every later `write`/`close`
//! fails with [`WriterError::PreviousWriteFailed`] without touching the sink.
//! A content-size overflow only fails the offending call.

use std::io::{self, Seek, SeekFrom, Write};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::codec::{EngineError, StreamEngine, ZstdEngine};
use crate::frame::{FrameHeader, PrologueCapture, HEADER_LEN, RESERVED_LEN};
use crate::options::WriterOptions;
use crate::sink;

/// Largest content size the header can record.
pub const MAX_CONTENT_SIZE: u64 = u32::MAX as u64;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors from [`FrameWriter`].  None of them carry the sink back: a failed
/// `open` drops a sink passed by value, so pass `&mut W` when the caller
/// needs it afterwards.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error(transparent)]
    EngineInitFailed(EngineError),
    #[error(transparent)]
    Engine(EngineError),
    #[error("seek: sink is not seekable: {0}")]
    SinkNotSeekable(#[source] io::Error),
    #[error("seek: {0}")]
    SeekFailed(#[source] io::Error),
    #[error("write: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("content size overflow")]
    ContentSizeOverflow,
    #[error("previous write failed")]
    PreviousWriteFailed,
    #[error("alloc: cannot allocate {size} bytes")]
    AllocationFailed { size: usize },
}

impl WriterError {
    /// Low-level operation the error came from, if any.  Errors about the
    /// handle's own state (`PreviousWriteFailed`, `ContentSizeOverflow`)
    /// originate in the writer call itself and return `None`.
    pub fn origin(&self) -> Option<&'static str> {
        match self {
            WriterError::EngineInitFailed(e) | WriterError::Engine(e) => Some(e.origin()),
            WriterError::SinkNotSeekable(_) | WriterError::SeekFailed(_) => Some("seek"),
            WriterError::WriteFailed(_)          => Some("write"),
            WriterError::AllocationFailed { .. } => Some("alloc"),
            WriterError::ContentSizeOverflow | WriterError::PreviousWriteFailed => None,
        }
    }
}

// ── FrameWriter ──────────────────────────────────────────────────────────────

pub struct FrameWriter<W: Write + Seek, E: StreamEngine = ZstdEngine> {
    sink:            W,
    engine:          E,
    out_buf:         Vec<u8>,
    errored:         bool,
    record_size:     bool,
    record_checksum: bool,
    content_size:    u64,
    compressed_size: u64,
    frame_start:     u64,
    prologue:        PrologueCapture,
}

impl<W: Write + Seek> FrameWriter<W, ZstdEngine> {
    /// Start a zstd frame on `sink`.
    ///
    /// The sink is only positioned (and must only be seekable) when
    /// `options.record_size` is set.  On failure the sink is dropped without
    /// any further writes; pass `&mut W` to keep it.
    pub fn open(sink: W, options: &WriterOptions) -> Result<Self, WriterError> {
        let engine = ZstdEngine::new(options).map_err(WriterError::EngineInitFailed)?;
        debug!(
            level           = options.level,
            record_size     = options.record_size,
            record_checksum = options.record_checksum,
            "opening zstd frame writer"
        );
        Self::with_engine(sink, engine, options.record_size, options.record_checksum)
    }
}

impl<W: Write + Seek, E: StreamEngine> FrameWriter<W, E> {
    /// Start a frame using a caller-supplied engine.
    ///
    /// `record_checksum` only sets the header's checksum bit; the engine must
    /// have been created with the same setting.
    pub fn with_engine(
        mut sink:        W,
        engine:          E,
        record_size:     bool,
        record_checksum: bool,
    ) -> Result<Self, WriterError> {
        let size = engine.output_size_hint();
        let mut out_buf = Vec::new();
        out_buf
            .try_reserve_exact(size)
            .map_err(|_| WriterError::AllocationFailed { size })?;
        out_buf.resize(size, 0);

        let mut frame_start = 0;
        if record_size {
            frame_start = sink.stream_position().map_err(WriterError::SinkNotSeekable)?;
            // Content size is not yet known; overwritten on close.
            sink::write_all(&mut sink, &[0u8; RESERVED_LEN]).map_err(WriterError::WriteFailed)?;
            expect_position(&mut sink, frame_start + RESERVED_LEN as u64)?;
            debug!(frame_start, "reserved frame header");
        }

        Ok(Self {
            sink,
            engine,
            out_buf,
            errored: false,
            record_size,
            record_checksum,
            content_size: 0,
            compressed_size: if record_size { RESERVED_LEN as u64 } else { 0 },
            frame_start,
            prologue: PrologueCapture::default(),
        })
    }

    /// Total bytes accepted by successful writes.
    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    /// Total bytes delivered to the sink so far.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Compress `buf` into the frame.
    ///
    /// The number of sink transfers this causes depends on engine buffering:
    /// zero, one or many.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), WriterError> {
        if self.errored {
            return Err(WriterError::PreviousWriteFailed);
        }
        if buf.is_empty() {
            return Ok(());
        }

        let total = self.content_size.saturating_add(buf.len() as u64);
        if self.record_size && total > MAX_CONTENT_SIZE {
            return Err(WriterError::ContentSizeOverflow);
        }
        self.content_size = total;
        trace!(len = buf.len(), content_size = total, "write");

        let result = self.feed(buf);
        self.latch(result)
    }

    /// Finish the frame and release the sink.
    ///
    /// Consumes the writer: engine, buffer and sink are released on every
    /// path, including failures.
    pub fn close(mut self) -> Result<(), WriterError> {
        if self.errored {
            return Err(WriterError::PreviousWriteFailed);
        }

        let result = self.end_stream();
        self.latch(result)?;

        if self.record_size {
            self.patch_header()?;
        }
        self.sink.flush().map_err(WriterError::WriteFailed)?;

        debug!(
            content_size    = self.content_size,
            compressed_size = self.compressed_size,
            "frame closed"
        );
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn latch(&mut self, result: Result<(), WriterError>) -> Result<(), WriterError> {
        if let Err(e) = &result {
            warn!(error = %e, "frame writer failed; rejecting further writes");
            self.errored = true;
        }
        result
    }

    fn feed(&mut self, mut input: &[u8]) -> Result<(), WriterError> {
        while !input.is_empty() {
            let progress = self
                .engine
                .compress(input, &mut self.out_buf)
                .map_err(WriterError::Engine)?;
            if progress.consumed == 0 && progress.produced == 0 {
                return Err(WriterError::Engine(EngineError::Stalled));
            }
            self.emit(progress.produced)?;
            input = &input[progress.consumed.min(input.len())..];
        }
        Ok(())
    }

    fn end_stream(&mut self) -> Result<(), WriterError> {
        loop {
            let end = self
                .engine
                .end_stream(&mut self.out_buf)
                .map_err(WriterError::Engine)?;
            self.emit(end.produced)?;
            if end.finished {
                return Ok(());
            }
        }
    }

    /// Send the first `len` bytes of the output buffer to the sink.
    fn emit(&mut self, len: usize) -> Result<(), WriterError> {
        if len == 0 {
            return Ok(());
        }
        let out = &self.out_buf[..len];
        if self.record_size && !self.prologue.is_complete() {
            self.prologue.observe(out);
        }
        sink::write_all(&mut self.sink, out).map_err(WriterError::WriteFailed)?;
        self.compressed_size += len as u64;
        Ok(())
    }

    /// Rewrite the frame start with the real content size, then return the
    /// sink to the end of the frame.
    fn patch_header(&mut self) -> Result<(), WriterError> {
        let prologue = self
            .prologue
            .parse()
            .map_err(|e| WriterError::Engine(EngineError::Prologue(e)))?;
        let content_size =
            u32::try_from(self.content_size).map_err(|_| WriterError::ContentSizeOverflow)?;
        let header = FrameHeader {
            checksum:          self.record_checksum,
            window_descriptor: prologue.window_descriptor,
            content_size,
        };

        let frame_end = self.sink.stream_position().map_err(WriterError::SeekFailed)?;
        let pos = self
            .sink
            .seek(SeekFrom::Start(self.frame_start))
            .map_err(WriterError::SeekFailed)?;
        if pos != self.frame_start {
            return Err(misplaced(pos, self.frame_start));
        }

        let bytes: [u8; HEADER_LEN] = header.to_bytes();
        sink::write_all(&mut self.sink, &bytes).map_err(WriterError::WriteFailed)?;
        expect_position(&mut self.sink, self.frame_start + HEADER_LEN as u64)?;
        self.sink.seek(SeekFrom::Start(frame_end)).map_err(WriterError::SeekFailed)?;
        debug!(content_size, frame_start = self.frame_start, "patched frame header");
        Ok(())
    }
}

/// Fail unless the last write ended at `expected`.  An append-mode sink
/// reports a position but writes at its end regardless.
fn expect_position<W: Seek>(sink: &mut W, expected: u64) -> Result<(), WriterError> {
    let pos = sink.stream_position().map_err(WriterError::SeekFailed)?;
    if pos != expected {
        return Err(misplaced(pos, expected));
    }
    Ok(())
}

fn misplaced(pos: u64, expected: u64) -> WriterError {
    WriterError::SeekFailed(io::Error::new(
        io::ErrorKind::Other,
        format!("sink at offset {pos}, expected {expected}"),
    ))
}
