//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the line-delimited framing:
//! - `<opcode> <length>\r\n` header line encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, encode_frame_into, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{find_crlf, Header, CRLF, DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_PAYLOAD_SIZE};
