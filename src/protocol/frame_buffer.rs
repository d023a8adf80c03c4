//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need a complete CRLF-terminated header line
//! - `WaitingForPayload`: Header parsed, need payload plus trailing CRLF
//!
//! Unconsumed bytes always stay in the buffer, so a frame split across any
//! number of socket reads decodes the same as one delivered whole.
//!
//! # Example
//!
//! ```
//! use whatels_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(b"watch! 5\r\n*.e").unwrap().is_empty());
//! let frames = buffer.push(b"rl\r\n").unwrap();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"*.erl");
//! ```

use bytes::BytesMut;

use super::wire_format::{
    find_crlf, Header, CRLF, DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_PAYLOAD_SIZE,
};
use super::Frame;
use crate::error::ParseError;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header line.
    WaitingForHeader,
    /// Header parsed, waiting for payload and trailing CRLF.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// A malformed header is unrecoverable: the length needed to find the next
/// frame boundary is unknown. The offending bytes are left in place and every
/// later push reports the same error until [`FrameBuffer::clear`] is called.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: usize,
    /// Maximum header line length before giving up on finding CRLF.
    max_header_len: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default limits.
    ///
    /// Default capacity: 8KB, max payload: 16MB, max header: 1KB.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_HEADER_LEN)
    }

    /// Create a new frame buffer with custom limits.
    pub fn with_limits(max_payload_size: usize, max_header_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
            max_header_len,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Frames are returned in arrival order. Partial data is kept for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns error on a malformed header line, a header that never
    /// terminates, or a payload exceeding the maximum size. If frames were
    /// completed earlier in the same push they are returned instead, and the
    /// error is reported by the next call.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>, ParseError> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                // The offending bytes stay buffered.
                Err(_) if !frames.is_empty() => break,
                Err(e) => return Err(e),
            }
        }

        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation; nothing is consumed
    pub fn try_extract_one(&mut self) -> Result<Option<Frame>, ParseError> {
        match &self.state {
            State::WaitingForHeader => {
                let line_end = match find_crlf(&self.buffer) {
                    Some(pos) => pos,
                    None if self.buffer.len() > self.max_header_len + 1 => {
                        return Err(ParseError::HeaderTooLong {
                            max: self.max_header_len,
                        });
                    }
                    None => return Ok(None),
                };

                if line_end > self.max_header_len {
                    return Err(ParseError::HeaderTooLong {
                        max: self.max_header_len,
                    });
                }

                // Parse header (peek, don't consume yet)
                let header = Header::parse(&self.buffer[..line_end])?;

                if header.payload_length > self.max_payload_size {
                    return Err(ParseError::PayloadTooLarge {
                        size: header.payload_length,
                        max: self.max_payload_size,
                    });
                }

                // Consume header line and its CRLF
                let _ = self.buffer.split_to(line_end + CRLF.len());

                self.state = State::WaitingForPayload { header };

                // Try to get payload immediately
                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let needed = header.payload_length + CRLF.len();
                if self.buffer.len() < needed {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(header.payload_length).freeze();
                // Trailing delimiter is skipped, not validated.
                let _ = self.buffer.split_to(CRLF.len());

                let opcode = header.opcode.clone();
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(opcode, payload)))
            }
        }
    }

    /// Append data to the buffer without extracting frames.
    ///
    /// Pair with [`FrameBuffer::try_extract_one`] to handle each frame (or
    /// error) as soon as it is found.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
