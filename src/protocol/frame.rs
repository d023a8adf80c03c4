//! Frame struct and frame encoding.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use whatels_client::protocol::{build_frame, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new("watch!", Bytes::from_static(b"*.erl"));
//! assert_eq!(frame.opcode(), "watch!");
//! assert_eq!(frame.payload_len(), 5);
//!
//! let bytes = build_frame("watch!", b"*.erl");
//! assert_eq!(&bytes[..], b"watch! 5\r\n*.erl\r\n");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, CRLF};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Operation token from the header line.
    pub opcode: String,
    /// Payload bytes, exactly as many as the header declared.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from opcode and payload.
    pub fn new(opcode: impl Into<String>, payload: Bytes) -> Self {
        Self {
            opcode: opcode.into(),
            payload,
        }
    }

    /// Get the opcode.
    #[inline]
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Header that describes this frame.
    pub fn header(&self) -> Header {
        Header::new(self.opcode.clone(), self.payload.len())
    }

    /// Encode this frame for the wire.
    pub fn encode(&self) -> Bytes {
        build_frame(&self.opcode, &self.payload)
    }
}

/// Build a complete frame as a single contiguous buffer.
///
/// The declared length is the payload's byte length.
pub fn build_frame(opcode: &str, payload: &[u8]) -> Bytes {
    let header = Header::new(opcode, payload.len());
    let mut buf = BytesMut::with_capacity(header.frame_len());
    encode_frame_into(&header, payload, &mut buf);
    buf.freeze()
}

/// Append header, payload and trailing CRLF to `buf`.
pub fn encode_frame_into(header: &Header, payload: &[u8], buf: &mut BytesMut) {
    debug_assert_eq!(header.payload_length, payload.len());
    header.encode_into(buf);
    buf.put_slice(payload);
    buf.put_slice(CRLF);
}
