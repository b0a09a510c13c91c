//! Frame header written over the start of the frame on close.
//!
//! # Layout
//! ```text
//! offset  size  field
//!      0     4  magic 0xFD2FB528 (LE)
//!      4     1  frame descriptor: 0x80 | checksum << 2
//!      5     1  window descriptor (copied from the engine's prologue)
//!      6     4  uncompressed content size (LE u32)
//! ```
//! Descriptor `0x80` selects a 4-byte content-size field with the
//! single-segment bit clear, so the window descriptor must stay in front of
//! the size.  The patch covers the 4 reserved bytes plus the engine's own
//! 6-byte prologue, which leaves every compressed block where the engine put
//! it.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use thiserror::Error;

pub const MAGIC: u32 = 0xFD2F_B528;
/// Bytes reserved at the frame start before the engine writes anything.
pub const RESERVED_LEN: usize = 4;
/// Magic, frame descriptor, window descriptor.
pub const PROLOGUE_LEN: usize = 6;
/// Bytes rewritten on close.
pub const HEADER_LEN: usize = RESERVED_LEN + PROLOGUE_LEN;

/// Frame_Content_Size_flag = 2: a 4-byte size field.
const FCS_FOUR_BYTES: u8 = 0x80;
const CHECKSUM_BIT:   u8 = 1 << 2;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("Unsupported frame descriptor {0:#04x}")]
    UnsupportedDescriptor(u8),
    #[error("Truncated frame prologue ({0} of 6 bytes)")]
    TruncatedPrologue(usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Engine prologue ──────────────────────────────────────────────────────────

/// The start of a frame as the engine wrote it: magic, a descriptor with at
/// most the checksum bit set, and a window descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prologue {
    pub checksum:          bool,
    pub window_descriptor: u8,
}

impl Prologue {
    pub fn parse(bytes: &[u8; PROLOGUE_LEN]) -> Result<Self, HeaderError> {
        let magic = LittleEndian::read_u32(&bytes[..4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }
        let descriptor = bytes[4];
        if descriptor & !CHECKSUM_BIT != 0 {
            return Err(HeaderError::UnsupportedDescriptor(descriptor));
        }
        Ok(Self {
            checksum:          descriptor & CHECKSUM_BIT != 0,
            window_descriptor: bytes[5],
        })
    }
}

/// Collects the first [`PROLOGUE_LEN`] bytes of engine output, however the
/// engine splits it across flushes.
#[derive(Debug, Default)]
pub struct PrologueCapture {
    bytes: [u8; PROLOGUE_LEN],
    len:   usize,
}

impl PrologueCapture {
    pub fn observe(&mut self, chunk: &[u8]) {
        let take = (PROLOGUE_LEN - self.len).min(chunk.len());
        self.bytes[self.len..self.len + take].copy_from_slice(&chunk[..take]);
        self.len += take;
    }

    pub fn is_complete(&self) -> bool {
        self.len == PROLOGUE_LEN
    }

    pub fn parse(&self) -> Result<Prologue, HeaderError> {
        if !self.is_complete() {
            return Err(HeaderError::TruncatedPrologue(self.len));
        }
        Prologue::parse(&self.bytes)
    }
}

// ── FrameHeader ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub checksum:          bool,
    pub window_descriptor: u8,
    pub content_size:      u32,
}

impl FrameHeader {
    pub fn descriptor(&self) -> u8 {
        FCS_FOUR_BYTES | ((self.checksum as u8) << 2)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        buf[4] = self.descriptor();
        buf[5] = self.window_descriptor;
        LittleEndian::write_u32(&mut buf[6..10], self.content_size);
        buf
    }

    /// Parse a header in the layout above.  Only used to inspect frames this
    /// crate produced; any other descriptor is rejected.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }
        let descriptor = reader.read_u8()?;
        if descriptor & !CHECKSUM_BIT != FCS_FOUR_BYTES {
            return Err(HeaderError::UnsupportedDescriptor(descriptor));
        }
        let window_descriptor = reader.read_u8()?;
        let content_size      = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            checksum: descriptor & CHECKSUM_BIT != 0,
            window_descriptor,
            content_size,
        })
    }
}
