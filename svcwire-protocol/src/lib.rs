//! # svcwire-protocol
//!
//! Wire protocol implementation for the svcwire transport.
//!
//! This crate provides:
//! - Length-prefixed binary framing with magic bytes and message id correlation
//! - A streaming decoder that tolerates partial reads
//! - Error-marked reply bodies for transport-level failures
//!
//! Header and body bytes are opaque to this layer; routing and payload
//! marshaling belong to the application.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, FRAME_PRELUDE_SIZE, MAGIC};

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default port for svcwire endpoints.
pub const DEFAULT_PORT: u16 = 7320;

/// Maximum frame size (header + body, 16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Marker prefix on reply bodies the transport generates for routing or
/// invocation failures. Callers detect this class of reply by prefix.
pub const ERROR_MARKER: &str = "CSE.TCP";

static NEXT_MSG_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next message id from the process-wide sequence.
///
/// Ids are monotonically increasing and never reused within a process;
/// servers echo the request's id on the corresponding reply frame.
pub fn next_msg_id() -> u64 {
    NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed)
}

/// Builds an error-marked reply body carrying a human-readable reason.
pub fn error_body(reason: &str) -> Bytes {
    Bytes::from(format!("{} {}", ERROR_MARKER, reason))
}

/// Returns whether a reply body is an error-marked transport reply.
pub fn is_error_body(body: &[u8]) -> bool {
    body.starts_with(ERROR_MARKER.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_ids_strictly_increase() {
        let a = next_msg_id();
        let b = next_msg_id();
        let c = next_msg_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_error_body_marker() {
        let body = error_body("no such operation");
        assert!(is_error_body(&body));
        assert_eq!(&body[..], b"CSE.TCP no such operation");
    }

    #[test]
    fn test_regular_body_is_not_error() {
        assert!(!is_error_body(b"{\"ok\":true}"));
        assert!(!is_error_body(b""));
    }
}
