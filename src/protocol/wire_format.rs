//! Wire format encoding and decoding.
//!
//! Every frame is a text header line followed by the payload:
//! ```text
//! <OPCODE> <decimal-byte-length>\r\n<payload bytes>\r\n
//! ```
//!
//! The length counts payload bytes, not characters. The trailing CRLF is
//! skipped on decode and never checked against the payload.

use bytes::{BufMut, BytesMut};

use crate::error::ParseError;

/// Line delimiter used by the header and after the payload.
pub const CRLF: &[u8] = b"\r\n";

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum header line length, excluding its CRLF.
pub const DEFAULT_MAX_HEADER_LEN: usize = 1024;

/// Decoded header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Operation token, e.g. `path-symbols`.
    pub opcode: String,
    /// Payload length in bytes.
    pub payload_length: usize,
}

impl Header {
    /// Create a new header.
    pub fn new(opcode: impl Into<String>, payload_length: usize) -> Self {
        Self {
            opcode: opcode.into(),
            payload_length,
        }
    }

    /// Parse a header line (without its CRLF).
    ///
    /// The line must split on a single space into exactly two tokens, the
    /// second being a decimal length.
    ///
    /// # Example
    ///
    /// ```
    /// use whatels_client::protocol::Header;
    ///
    /// let header = Header::parse(b"path-symbols 36").unwrap();
    /// assert_eq!(header.opcode, "path-symbols");
    /// assert_eq!(header.payload_length, 36);
    /// ```
    pub fn parse(line: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8("header"))?;

        let mut parts = line.split(' ');
        let (opcode, length) = match (parts.next(), parts.next(), parts.next()) {
            (Some(op), Some(len), None) if !op.is_empty() => (op, len),
            _ => return Err(ParseError::MalformedHeader(line.to_string())),
        };

        if length.is_empty() || !length.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidLength(length.to_string()));
        }
        let payload_length = length
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidLength(length.to_string()))?;

        Ok(Self::new(opcode, payload_length))
    }

    /// Encoded header line length, including its CRLF.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.opcode.len() + 1 + decimal_digits(self.payload_length) + CRLF.len()
    }

    /// Total frame size on the wire for this header.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.encoded_len() + self.payload_length + CRLF.len()
    }

    /// Append the header line (with CRLF) to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(self.opcode.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.payload_length.to_string().as_bytes());
        buf.put_slice(CRLF);
    }
}

/// Find the offset of the first CRLF in `buf`.
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
