//! # whatels-client
//!
//! Rust client for the whatels symbol-index protocol.
//!
//! A remote indexing server extracts symbols (function names, arities,
//! lines) and diagnostics from source files. This crate speaks its
//! line-delimited TCP protocol: one-shot queries for a path, and `watch!`
//! subscriptions whose pushes fill a local path cache.
//!
//! ## Architecture
//!
//! - **Framer** ([`protocol`]): `<opcode> <length>\r\n<payload>\r\n` frames
//! - **Codec** ([`codec`]): opcodes, dialects, JSON symbol payloads
//! - **Connection** ([`Connection`]): socket ownership, request
//!   correlation, push cache
//! - **Client** ([`Client`]): builder and facade
//!
//! ## Example
//!
//! ```no_run
//! use whatels_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new();
//!     client.connect().await?;
//!
//!     client.watch("*.erl")?;
//!     let symbols = client.get_symbols("/src/app.erl").await?;
//!     println!("{:?}", symbols.module);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod connection;
mod materialize;
mod subscription;
mod writer;

pub use client::{Client, ClientBuilder};
pub use codec::{Dialect, ErrorInfo, FunctionInfo, PathSymbols, Symbols};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::{ParseError, Result, WhatelsError};
pub use materialize::{SourceMaterializer, TempDirMaterializer};
pub use subscription::{Subscription, WatchEvent};
