//! Protocol error types.

use thiserror::Error;

/// Framing errors. All of these are fatal for the connection that produced
/// them: a misaligned byte stream cannot be resynchronized.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'SWRP', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("inconsistent frame lengths: header_len {header_len} exceeds total_len {total_len}")]
    LengthMismatch { header_len: u32, total_len: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
