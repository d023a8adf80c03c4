//! Error types for whatels-client.

use thiserror::Error;

/// Main error type for all whatels operations.
#[derive(Debug, Error)]
pub enum WhatelsError {
    /// Socket-level failure (connect, read or write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame or its payload could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Connection closed while a request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The operation requires a connected client.
    #[error("Not connected")]
    NotConnected,

    /// The connection is in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// A query is already waiting for its response.
    #[error("A request is already in flight")]
    RequestInFlight,

    /// The caller-specified request timeout expired.
    #[error("Request timed out")]
    Timeout,

    /// The configured dialect has no such operation.
    #[error("Unsupported in this dialect: {0}")]
    Unsupported(&'static str),
}

impl WhatelsError {
    /// True for malformed frames and payloads.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, WhatelsError::Parse(_))
    }

    /// True for failures at the socket layer, including peer disconnects.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, WhatelsError::Io(_) | WhatelsError::ConnectionClosed)
    }
}

/// Framing and payload decode failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Header line is not exactly `<opcode> <length>`.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Length token is not a decimal number.
    #[error("invalid payload length: {0:?}")]
    InvalidLength(String),

    /// Declared payload length exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// No CRLF found within the maximum header length.
    #[error("header line exceeds {max} bytes")]
    HeaderTooLong { max: usize },

    /// Header or payload is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Two-line payload did not have exactly two lines.
    #[error("expected {expected} payload lines, found {found}")]
    PayloadLines { expected: usize, found: usize },

    /// Symbols document failed to decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using WhatelsError.
pub type Result<T> = std::result::Result<T, WhatelsError>;
