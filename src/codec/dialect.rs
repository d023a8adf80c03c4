//! Dialect-aware message codec.
//!
//! Two incompatible wire dialects exist and the server does not negotiate:
//!
//! | Dialect       | Query           | Response        | Response payload       |
//! |---------------|-----------------|-----------------|------------------------|
//! | `PathSymbols` | `path-symbols?` | `path-symbols`  | `<path>\r\n<json>`     |
//! | `Legacy`      | `SYMBOLS?`      | `SYMBOLS`       | `<json>`               |
//!
//! Only the `PathSymbols` dialect has `watch!`.
//!
//! # Example
//!
//! ```
//! use whatels_client::codec::{Codec, Dialect, Message};
//! use whatels_client::protocol::{build_frame, FrameBuffer};
//!
//! let codec = Codec::new(Dialect::PathSymbols);
//! assert_eq!(&codec.encode_query("/a.erl")[..], b"path-symbols? 6\r\n/a.erl\r\n");
//!
//! let wire = build_frame("path-symbols", b"/a.erl\r\n{\"functions\":[],\"errors\":[]}");
//! let frame = FrameBuffer::new().push(&wire).unwrap().remove(0);
//! match codec.decode(&frame).unwrap() {
//!     Message::PathSymbols(push) => assert_eq!(push.path, "/a.erl"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use bytes::Bytes;

use super::opcode::Opcode;
use super::symbols::{PathSymbols, Symbols};
use crate::error::{ParseError, Result, WhatelsError};
use crate::protocol::{build_frame, Frame};

/// Wire dialect spoken by the server. A deployment parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `path-symbols` / `path-symbols?` / `watch!`.
    #[default]
    PathSymbols,
    /// `SYMBOLS` / `SYMBOLS?`, no path line and no watch.
    Legacy,
}

impl Dialect {
    /// Opcode used for symbol queries.
    pub fn query_opcode(self) -> Opcode {
        match self {
            Dialect::PathSymbols => Opcode::PathSymbolsQuery,
            Dialect::Legacy => Opcode::SymbolsQuery,
        }
    }

    /// Opcode carrying symbols back to the client.
    pub fn response_opcode(self) -> Opcode {
        match self {
            Dialect::PathSymbols => Opcode::PathSymbols,
            Dialect::Legacy => Opcode::Symbols,
        }
    }

    /// Whether `watch!` subscriptions exist in this dialect.
    pub fn supports_watch(self) -> bool {
        matches!(self, Dialect::PathSymbols)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Symbols keyed by path. Pushed after `watch!`, or answering a query.
    PathSymbols(PathSymbols),
    /// Symbols with no path (legacy response).
    SymbolsOnly(Symbols),
    /// Opcode not expected in the configured dialect.
    Unknown { opcode: String },
}

impl Message {
    /// Symbols carried by the message, if any.
    pub fn symbols(&self) -> Option<&Symbols> {
        match self {
            Message::PathSymbols(push) => Some(&push.symbols),
            Message::SymbolsOnly(symbols) => Some(symbols),
            Message::Unknown { .. } => None,
        }
    }

    /// Take the symbols out of the message.
    pub fn into_symbols(self) -> Option<Symbols> {
        match self {
            Message::PathSymbols(push) => Some(push.symbols),
            Message::SymbolsOnly(symbols) => Some(symbols),
            Message::Unknown { .. } => None,
        }
    }
}

/// Maps frames to messages for one dialect, and requests to frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    dialect: Dialect,
}

impl Codec {
    /// Create a codec for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The configured dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Encode a symbols query for a server-visible path.
    pub fn encode_query(&self, path: &str) -> Bytes {
        build_frame(self.dialect.query_opcode().as_str(), path.as_bytes())
    }

    /// Encode a `watch!` subscription.
    pub fn encode_watch(&self, wildcard: &str) -> Result<Bytes> {
        if !self.dialect.supports_watch() {
            return Err(WhatelsError::Unsupported("watch"));
        }
        Ok(build_frame(Opcode::Watch.as_str(), wildcard.as_bytes()))
    }

    /// Decode a frame.
    ///
    /// Opcodes other than the dialect's response opcode decode to
    /// [`Message::Unknown`]; the caller decides what to do with them.
    pub fn decode(&self, frame: &Frame) -> std::result::Result<Message, ParseError> {
        let response = self.dialect.response_opcode();
        match Opcode::parse(frame.opcode()) {
            Some(op) if op == response => {}
            _ => {
                return Ok(Message::Unknown {
                    opcode: frame.opcode().to_string(),
                })
            }
        }

        let payload =
            std::str::from_utf8(frame.payload()).map_err(|_| ParseError::InvalidUtf8("payload"))?;

        match self.dialect {
            Dialect::PathSymbols => decode_path_symbols(payload).map(Message::PathSymbols),
            Dialect::Legacy => Symbols::from_json(payload.as_bytes()).map(Message::SymbolsOnly),
        }
    }
}

/// Payload is exactly two CRLF-separated lines: path, then JSON.
fn decode_path_symbols(payload: &str) -> std::result::Result<PathSymbols, ParseError> {
    let lines: Vec<&str> = payload.split("\r\n").collect();
    if lines.len() != 2 {
        return Err(ParseError::PayloadLines {
            expected: 2,
            found: lines.len(),
        });
    }

    Ok(PathSymbols {
        path: lines[0].to_string(),
        symbols: Symbols::from_json(lines[1].as_bytes())?,
    })
}
