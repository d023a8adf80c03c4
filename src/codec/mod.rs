//! Codec module - typed messages on top of frames.
//!
//! - [`Opcode`] - the operation token table
//! - [`Codec`] / [`Dialect`] - request encoding and frame decoding
//! - [`Symbols`] and friends - the JSON payload schema
//!
//! # Design
//!
//! The codec is stateless apart from the configured dialect, so the read
//! loop and the request path each hold their own copy.

mod dialect;
mod opcode;
mod symbols;

pub use dialect::{Codec, Dialect, Message};
pub use opcode::Opcode;
pub use symbols::{ErrorInfo, FunctionInfo, PathSymbols, Symbols};
