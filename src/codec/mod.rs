//! Compression engine adapter.
//!
//! The frame writer never looks inside the compressor.  It only needs three
//! capabilities, captured by [`StreamEngine`]:
//!   - a recommended output chunk size,
//!   - "feed input, produce output" (called until the input is consumed),
//!   - "end the stream, produce trailing output" (called until finished).
//!
//! Neither side can predict how many output buffers one input chunk or the
//! final flush will need, hence the call-until-done shape.
//!
//! # Frame prologue
//! [`ZstdEngine`] always disables zstd's own content-size field.  With no
//! dictionary the frame it starts is then preceded by a fixed 6-byte
//! prologue (magic, frame descriptor, window descriptor), which is what the
//! frame writer's header patch replaces.

use std::io;
use thiserror::Error;
use zstd::stream::raw::{CParameter, Encoder, InBuffer, Operation, OutBuffer};

use crate::frame::HeaderError;
use crate::options::{EngineParams, WriterOptions};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("create: {0}")]
    Init(#[source] io::Error),
    #[error("compress: {0}")]
    Compress(#[source] io::Error),
    #[error("end_stream: {0}")]
    EndStream(#[source] io::Error),
    /// The engine consumed no input and produced no output.
    #[error("compress: engine made no progress")]
    Stalled,
    /// The engine started its frame with a prologue the header patch cannot
    /// replace.
    #[error("end_stream: {0}")]
    Prologue(#[source] HeaderError),
}

impl EngineError {
    /// Name of the engine operation that failed.
    pub fn origin(&self) -> &'static str {
        match self {
            EngineError::Init(_)                             => "create",
            EngineError::Compress(_) | EngineError::Stalled  => "compress",
            EngineError::EndStream(_) | EngineError::Prologue(_) => "end_stream",
        }
    }
}

// ── Engine trait ─────────────────────────────────────────────────────────────

/// Bytes used from each side by one [`StreamEngine::compress`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub produced: usize,
}

/// Result of one [`StreamEngine::end_stream`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndProgress {
    pub produced: usize,
    /// No trailing output is left once this is set.
    pub finished: bool,
}

pub trait StreamEngine {
    /// Output buffer size the engine works best with.
    fn output_size_hint(&self) -> usize;

    /// Consume some of `input`, writing compressed bytes into `output`.
    fn compress(&mut self, input: &[u8], output: &mut [u8]) -> Result<Progress, EngineError>;

    /// Emit trailing bytes (last block, checksum) into `output`.
    fn end_stream(&mut self, output: &mut [u8]) -> Result<EndProgress, EngineError>;
}

// ── zstd ─────────────────────────────────────────────────────────────────────

/// [`StreamEngine`] backed by the zstd streaming compressor.
pub struct ZstdEngine {
    encoder: Encoder<'static>,
}

impl ZstdEngine {
    pub fn new(options: &WriterOptions) -> Result<Self, EngineError> {
        let mut encoder = Encoder::new(options.level).map_err(EngineError::Init)?;
        for param in cparameters(options.record_checksum, &options.params) {
            encoder.set_parameter(param).map_err(EngineError::Init)?;
        }
        Ok(Self { encoder })
    }
}

/// Parameters applied on top of the compression level.
fn cparameters(checksum: bool, params: &EngineParams) -> Vec<CParameter> {
    let mut out = vec![
        CParameter::ChecksumFlag(checksum),
        CParameter::ContentSizeFlag(false),
    ];
    if params.is_empty() {
        return out;
    }
    let explicit: [(Option<u32>, fn(u32) -> CParameter); 6] = [
        (params.window_log,    CParameter::WindowLog),
        (params.hash_log,      CParameter::HashLog),
        (params.chain_log,     CParameter::ChainLog),
        (params.search_log,    CParameter::SearchLog),
        (params.min_match,     CParameter::MinMatch),
        (params.target_length, CParameter::TargetLength),
    ];
    out.extend(explicit.into_iter().filter_map(|(v, make)| v.map(make)));
    out
}

impl StreamEngine for ZstdEngine {
    fn output_size_hint(&self) -> usize {
        zstd::zstd_safe::CCtx::out_size()
    }

    fn compress(&mut self, input: &[u8], output: &mut [u8]) -> Result<Progress, EngineError> {
        let mut src = InBuffer::around(input);
        let mut dst = OutBuffer::around(output);
        self.encoder.run(&mut src, &mut dst).map_err(EngineError::Compress)?;
        Ok(Progress { consumed: src.pos(), produced: dst.pos() })
    }

    fn end_stream(&mut self, output: &mut [u8]) -> Result<EndProgress, EngineError> {
        let mut dst = OutBuffer::around(output);
        let remaining = self.encoder.finish(&mut dst, true).map_err(EngineError::EndStream)?;
        Ok(EndProgress { produced: dst.pos(), finished: remaining == 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Prologue, PROLOGUE_LEN};

    fn compress_all(engine: &mut ZstdEngine, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; engine.output_size_hint()];
        let mut out = Vec::new();
        let mut input = data;
        while !input.is_empty() {
            let p = engine.compress(input, &mut buf).unwrap();
            out.extend_from_slice(&buf[..p.produced]);
            input = &input[p.consumed..];
        }
        loop {
            let end = engine.end_stream(&mut buf).unwrap();
            out.extend_from_slice(&buf[..end.produced]);
            if end.finished {
                break;
            }
        }
        out
    }

    #[test]
    fn output_hint_is_nonzero() {
        let engine = ZstdEngine::new(&WriterOptions::default()).unwrap();
        assert!(engine.output_size_hint() > 0);
    }

    #[test]
    fn stream_roundtrips_through_zstd() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let mut engine = ZstdEngine::new(&WriterOptions::new(1)).unwrap();
        let frame = compress_all(&mut engine, &data);
        assert_eq!(zstd::decode_all(&frame[..]).unwrap(), data);
    }

    #[test]
    fn prologue_has_no_content_size() {
        for checksum in [false, true] {
            let opts = WriterOptions::new(3).record_checksum(checksum);
            let mut engine = ZstdEngine::new(&opts).unwrap();
            let frame = compress_all(&mut engine, b"prologue check");
            let mut head = [0u8; PROLOGUE_LEN];
            head.copy_from_slice(&frame[..PROLOGUE_LEN]);
            let prologue = Prologue::parse(&head).unwrap();
            assert_eq!(prologue.checksum, checksum);
        }
    }

    #[test]
    fn empty_stream_still_has_prologue() {
        let mut engine = ZstdEngine::new(&WriterOptions::default()).unwrap();
        let frame = compress_all(&mut engine, b"");
        let mut head = [0u8; PROLOGUE_LEN];
        head.copy_from_slice(&frame[..PROLOGUE_LEN]);
        assert!(Prologue::parse(&head).is_ok());
        assert!(zstd::decode_all(&frame[..]).unwrap().is_empty());
    }

    #[test]
    fn explicit_params_are_applied() {
        let opts = WriterOptions::new(3).window_log(12);
        let mut engine = ZstdEngine::new(&opts).unwrap();
        let frame = compress_all(&mut engine, &[7u8; 10_000]);
        let mut head = [0u8; PROLOGUE_LEN];
        head.copy_from_slice(&frame[..PROLOGUE_LEN]);
        // Window descriptor: exponent in the high five bits, 2^(10 + e).
        assert_eq!(Prologue::parse(&head).unwrap().window_descriptor >> 3, 2);
    }

    #[test]
    fn level_only_engine_sets_frame_flags_alone() {
        let params = cparameters(true, &EngineParams::default());
        assert_eq!(params.len(), 2);
        let params = cparameters(false, &EngineParams { min_match: Some(5), ..EngineParams::default() });
        assert_eq!(params.len(), 3);
        assert!(matches!(params[2], CParameter::MinMatch(5)));
    }

    #[test]
    fn out_of_range_params_fail_creation() {
        let opts = WriterOptions::new(3).window_log(99);
        assert!(matches!(ZstdEngine::new(&opts), Err(EngineError::Init(_))));
    }
}
