//! Encoder and streaming decoder for svcwire frames.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::{Bytes, BytesMut};

/// Encodes frames for the wire.
pub struct Encoder;

impl Encoder {
    /// Encodes a frame into wire bytes.
    pub fn encode_frame(frame: &Frame) -> Result<BytesMut, ProtocolError> {
        frame.encode()
    }

    /// Encodes a reply frame echoing `msg_id`.
    pub fn encode_reply(msg_id: u64, header: Bytes, body: Bytes) -> Result<BytesMut, ProtocolError> {
        Frame::new(msg_id, header, body).encode()
    }
}

/// Streaming frame decoder.
///
/// Socket reads are appended with [`Decoder::extend`]; complete frames are
/// pulled off with [`Decoder::decode_frame`]. Partial frames stay buffered
/// until the rest arrives. Any error is fatal for the byte stream.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends raw bytes from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
