//! Writer configuration.
//!
//! ```
//! use zstdwriter::options::{EngineParams, WriterOptions};
//!
//! let opts = WriterOptions::new(19)
//!     .record_size(true)
//!     .record_checksum(false)
//!     .params(EngineParams { window_log: Some(23), ..EngineParams::default() });
//! assert_eq!(opts.params.window_log, Some(23));
//! ```

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ── EngineParams ─────────────────────────────────────────────────────────────

/// Explicit engine parameters.  `None` keeps whatever the compression level
/// selects.  Values are passed to the engine unchecked; the engine rejects
/// out-of-range ones at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineParams {
    pub window_log:    Option<u32>,
    pub hash_log:      Option<u32>,
    pub chain_log:     Option<u32>,
    pub search_log:    Option<u32>,
    pub min_match:     Option<u32>,
    pub target_length: Option<u32>,
}

impl EngineParams {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── WriterOptions ────────────────────────────────────────────────────────────

/// Configuration for [`FrameWriter::open`](crate::io_stream::FrameWriter::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub level:           i32,
    pub params:          EngineParams,
    /// Patch the uncompressed size into the frame header on close.
    /// Requires a seekable sink.
    pub record_size:     bool,
    /// Append a content checksum to the frame.
    pub record_checksum: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl WriterOptions {
    /// Level-only configuration: no size recording, checksum on.
    pub fn new(level: i32) -> Self {
        Self {
            level,
            params:          EngineParams::default(),
            record_size:     false,
            record_checksum: true,
        }
    }

    pub fn record_size(mut self, yes: bool) -> Self {
        self.record_size = yes;
        self
    }

    pub fn record_checksum(mut self, yes: bool) -> Self {
        self.record_checksum = yes;
        self
    }

    pub fn params(mut self, params: EngineParams) -> Self {
        self.params = params;
        self
    }

    /// Shorthand for setting only [`EngineParams::window_log`].
    pub fn window_log(mut self, window_log: u32) -> Self {
        self.params.window_log = Some(window_log);
        self
    }
}
