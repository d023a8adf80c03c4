//! Client builder and facade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the server
//! address, dialect and limits. The [`Client`] forwards to a [`Connection`]
//! and replaces it with a fresh one when reconnecting after `close`.
//!
//! # Example
//!
//! ```no_run
//! use whatels_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder().port(10999).build();
//!     client.connect().await?;
//!
//!     let symbols = client.get_symbols("/src/app.erl").await?;
//!     for function in &symbols.functions {
//!         println!("{} at line {}", function.display_name(), function.line);
//!     }
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::codec::{Dialect, Symbols};
use crate::connection::{Connection, ConnectionConfig, ConnectionState};
use crate::error::{Result, WhatelsError};
use crate::materialize::SourceMaterializer;
use crate::subscription::Subscription;

/// Builder for configuring a [`Client`].
pub struct ClientBuilder {
    config: ConnectionConfig,
}

impl ClientBuilder {
    /// Create a builder with defaults (`127.0.0.1:10999`, path-symbols dialect).
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
        }
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the wire dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    /// Fail `get_symbols` calls that wait longer than `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Fail `connect` if the socket takes longer than `timeout` to open.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the largest accepted payload.
    ///
    /// Default: 16MB
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the longest accepted header line.
    ///
    /// Default: 1KB
    pub fn max_header_len(mut self, len: usize) -> Self {
        self.config.max_header_len = len;
        self
    }

    /// Set the outbound queue length.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the queue length of each watch subscription.
    ///
    /// Default: 1024
    pub fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.config.subscription_capacity = capacity;
        self
    }

    /// Build a disconnected client.
    pub fn build(self) -> Client {
        Client {
            connection: Connection::new(self.config),
        }
    }

    /// Build the client and connect it.
    pub async fn connect(self) -> Result<Client> {
        let mut client = self.build();
        client.connect().await?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbol-index client.
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client for the default endpoint, not yet connected.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// True while requests may be sent.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Connect to the server. No-op if already connected.
    ///
    /// After `close` this starts over with a new connection and an empty
    /// path cache.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.state() == ConnectionState::Closed {
            self.connection = Connection::new(self.connection.config().clone());
        }
        self.connection.connect().await
    }

    /// Query symbols for a path the server can read.
    pub async fn get_symbols(&self, path: &str) -> Result<Symbols> {
        self.connection.get_symbols(path).await
    }

    /// Query symbols, failing with `Timeout` after `limit`.
    pub async fn get_symbols_timeout(&self, path: &str, limit: Duration) -> Result<Symbols> {
        self.connection.get_symbols_timeout(path, limit).await
    }

    /// Query symbols for inline source text.
    ///
    /// The text is written by `materializer` to a path the server can open,
    /// which is then queried like any other.
    pub async fn get_symbols_for_source(
        &self,
        source: &str,
        materializer: &dyn SourceMaterializer,
    ) -> Result<Symbols> {
        if !self.connection.is_connected() {
            return Err(WhatelsError::NotConnected);
        }
        let path = materializer.materialize(source)?;
        self.connection.get_symbols(&path.to_string_lossy()).await
    }

    /// Subscribe to pushes for paths matching `wildcard`.
    pub fn watch(&self, wildcard: &str) -> Result<()> {
        self.connection.watch(wildcard)
    }

    /// Subscribe and receive every later push as a stream.
    pub fn watch_stream(&self, wildcard: &str) -> Result<Subscription> {
        self.connection.watch_stream(wildcard)
    }

    /// Last pushed symbols for `path`.
    pub fn get_path_symbols(&self, path: &str) -> Option<Symbols> {
        self.connection.get_path_symbols(path)
    }

    /// Snapshot of every cached path.
    pub fn get_all_path_symbols(&self) -> HashMap<String, Symbols> {
        self.connection.get_all_path_symbols()
    }

    /// Close the connection. No-op if not connected.
    pub fn close(&self) {
        self.connection.close();
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
