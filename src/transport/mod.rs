//! Transport module - socket setup.
//!
//! The connection itself is generic over any `AsyncRead + AsyncWrite`
//! stream; this module only knows how to open the TCP one.

mod tcp;

pub use tcp::{connect_tcp, DEFAULT_HOST, DEFAULT_PORT};
