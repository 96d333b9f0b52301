//! Binary frame format for the svcwire transport.
//!
//! Frame layout (20-byte prelude + header + body):
//!
//! ```text
//! +--------+---------+-----------+------------+--------+------+
//! | magic  | msg_id  | total_len | header_len | header | body |
//! | 4 bytes| 8 bytes |  4 bytes  |  4 bytes   |        |      |
//! +--------+---------+-----------+------------+--------+------+
//! ```
//!
//! `total_len` counts header + body; `header_len` counts the header alone.
//! Both halves are opaque byte buffers: the header carries application
//! routing information, the body carries the payload.

use crate::error::ProtocolError;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic bytes identifying svcwire frames: "SWRP"
pub const MAGIC: [u8; 4] = *b"SWRP";

/// Size of the fixed frame prelude in bytes (4+8+4+4 = 20).
pub const FRAME_PRELUDE_SIZE: usize = 20;

/// A parsed svcwire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message id correlating a request with its reply.
    pub msg_id: u64,
    /// Opaque routing header.
    pub header: Bytes,
    /// Opaque payload.
    pub body: Bytes,
}

impl Frame {
    /// Creates a frame with an explicit message id (used for replies,
    /// which must echo the request's id).
    pub fn new(msg_id: u64, header: Bytes, body: Bytes) -> Self {
        Self {
            msg_id,
            header,
            body,
        }
    }

    /// Creates a request frame with a fresh message id.
    pub fn request(header: Bytes, body: Bytes) -> Self {
        Self::new(crate::next_msg_id(), header, body)
    }

    /// Returns the combined header + body length.
    pub fn total_len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let total_len = self.total_len();
        if total_len > MAX_FRAME_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: total_len as u32,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_PRELUDE_SIZE + total_len);
        buf.put_slice(&MAGIC);
        buf.put_u64(self.msg_id);
        buf.put_u32(total_len as u32);
        buf.put_u32(self.header.len() as u32);
        buf.put_slice(&self.header);
        buf.put_slice(&self.body);
        Ok(buf)
    }

    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was consumed,
    /// `Ok(None)` if more bytes are needed (nothing is consumed), or
    /// `Err` on protocol violations, which are connection-fatal.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_PRELUDE_SIZE {
            return Ok(None);
        }

        // Peek at the prelude without consuming.
        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let msg_id = u64::from_be_bytes(buf[4..12].try_into().unwrap());
        let total_len = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        let header_len = u32::from_be_bytes(buf[16..20].try_into().unwrap());

        if total_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: total_len,
                max: MAX_FRAME_SIZE,
            });
        }
        if header_len > total_len {
            return Err(ProtocolError::LengthMismatch {
                header_len,
                total_len,
            });
        }

        if buf.len() < FRAME_PRELUDE_SIZE + total_len as usize {
            return Ok(None);
        }

        buf.advance(FRAME_PRELUDE_SIZE);
        let header = buf.split_to(header_len as usize).freeze();
        let body = buf.split_to((total_len - header_len) as usize).freeze();

        Ok(Some(Self {
            msg_id,
            header,
            body,
        }))
    }
}
