//! Connection state machine and request correlation.
//!
//! A [`Connection`] owns one socket. Two background tasks drive it:
//!
//! ```text
//!              ┌──────────── Mutex<Inner> ────────────┐
//!              │ state · pending slot · cache · subs  │
//!              └──────▲───────────────────▲───────────┘
//! get_symbols ─┤      │                   │
//! watch       ─┼─► Writer Task ─► Socket ─► Read Loop (FrameBuffer + Codec)
//! ```
//!
//! The protocol has no correlation identifier, so at most one query may be
//! outstanding: the next symbols-bearing frame resolves it, whether the
//! server meant it as a reply or as a push. Pushes also update the
//! path cache and go to every `watch_stream` subscriber.
//!
//! Every connect starts a new session. Background tasks carry the session
//! they were spawned for and leave the shared state alone once it moved on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{Codec, Dialect, Message, Symbols};
use crate::error::{ParseError, Result, WhatelsError};
use crate::protocol::{FrameBuffer, DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::subscription::{Subscription, WatchEvent, DEFAULT_SUBSCRIPTION_CAPACITY};
use crate::transport::{connect_tcp, DEFAULT_HOST, DEFAULT_PORT};
use crate::writer::{writer_channel, OutboundFrame, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Socket read buffer size.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Wire dialect spoken by the server.
    pub dialect: Dialect,
    /// Default limit for `get_symbols`. `None` waits until close.
    pub request_timeout: Option<Duration>,
    /// Limit for establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Largest accepted payload.
    pub max_payload_size: usize,
    /// Longest accepted header line.
    pub max_header_len: usize,
    /// Outbound frame queue length.
    pub channel_capacity: usize,
    /// Queue length of each watch subscription.
    pub subscription_capacity: usize,
}

impl ConnectionConfig {
    /// `host:port` as passed to the socket.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dialect: Dialect::default(),
            request_timeout: None,
            connect_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
        }
    }
}

/// Lifecycle of a connection.
///
/// `Closed` is terminal. A transport failure returns to `Disconnected`, from
/// which `connect` may be called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// The single in-flight query.
struct Pending {
    id: u64,
    tx: oneshot::Sender<Result<Symbols>>,
}

/// State shared with the background tasks.
struct Inner {
    state: ConnectionState,
    session: u64,
    writer: Option<WriterHandle>,
    /// Reader and writer tasks of the current session.
    tasks: Vec<JoinHandle<()>>,
    pending: Option<Pending>,
    next_request_id: u64,
    cache: HashMap<String, Symbols>,
    subscribers: Vec<mpsc::Sender<WatchEvent>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: 0,
            writer: None,
            tasks: Vec::new(),
            pending: None,
            next_request_id: 1,
            cache: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    /// True if a background task of `session` may still act.
    fn is_live(&self, session: u64) -> bool {
        self.session == session && self.state == ConnectionState::Connected
    }

    /// Hand `result` to the waiting query. Returns false if none was waiting.
    fn resolve_pending(&mut self, result: Result<Symbols>) -> bool {
        match self.pending.take() {
            Some(pending) => {
                // The caller may have given up already.
                let _ = pending.tx.send(result);
                true
            }
            None => false,
        }
    }

    fn notify_subscribers(&mut self, event: WatchEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Watch subscriber is full, dropping update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Tear down transport resources. Returns the tasks to abort; each
    /// holds one half of the socket, which closes once both are gone.
    fn release_transport(&mut self) -> Vec<JoinHandle<()>> {
        self.writer = None;
        self.subscribers.clear();
        std::mem::take(&mut self.tasks)
    }
}

fn abort_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
    }
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the pending slot if the query it belongs to is abandoned
/// (timeout, or the caller dropped the future).
struct PendingGuard<'a> {
    shared: &'a Mutex<Inner>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.shared);
        if inner.pending.as_ref().is_some_and(|p| p.id == self.id) {
            inner.pending = None;
        }
    }
}

/// Returns a `Connecting` state to `Disconnected` if `connect` is cancelled.
struct ConnectingGuard<'a> {
    shared: &'a Mutex<Inner>,
    session: u64,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock(self.shared);
        if inner.session == self.session && inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
        }
    }
}

/// One conversation with the indexing server.
///
/// All methods take `&self`; wrap in an `Arc` to share between tasks.
/// Dropping the connection closes it.
pub struct Connection {
    config: ConnectionConfig,
    codec: Codec,
    shared: Arc<Mutex<Inner>>,
}

impl Connection {
    /// Create a disconnected connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            codec: Codec::new(config.dialect),
            config,
            shared: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Create a connection over an already open stream.
    ///
    /// Starts in `Connected`. Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let conn = Self::new(config);
        {
            let mut inner = lock(&conn.shared);
            inner.session += 1;
            let session = inner.session;
            conn.attach(&mut inner, session, stream);
        }
        conn
    }

    /// Get the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// True while requests may be sent.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the TCP connection to the configured server.
    ///
    /// Succeeds immediately if already connected. On failure the connection
    /// returns to `Disconnected` and may be retried.
    ///
    /// # Errors
    ///
    /// - `InvalidState` while another connect is in progress or after close
    /// - `Io` if the socket cannot be opened, including `TimedOut` when the
    ///   connect timeout expires
    pub async fn connect(&self) -> Result<()> {
        let addr = self.config.addr();
        self.connect_with(&addr, connect_tcp(&addr, self.config.connect_timeout))
            .await
    }

    /// Run the connect state transitions around `open`, which yields the
    /// stream once the transport is up.
    async fn connect_with<F, S>(&self, addr: &str, open: F) -> Result<()>
    where
        F: Future<Output = Result<S>>,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let session = {
            let mut inner = lock(&self.shared);
            match inner.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    return Err(WhatelsError::InvalidState("connect already in progress"))
                }
                ConnectionState::Closed => {
                    return Err(WhatelsError::InvalidState("connection is closed"))
                }
                ConnectionState::Disconnected => {}
            }
            inner.session += 1;
            inner.state = ConnectionState::Connecting;
            inner.session
        };

        let mut guard = ConnectingGuard {
            shared: &self.shared,
            session,
            armed: true,
        };

        tracing::debug!("Connecting to {} (session {})", addr, session);

        let result = open.await;

        let mut inner = lock(&self.shared);
        if inner.session != session || inner.state != ConnectionState::Connecting {
            // Closed while the socket was opening.
            guard.armed = false;
            return Err(WhatelsError::ConnectionClosed);
        }

        match result {
            Ok(stream) => {
                guard.armed = false;
                self.attach(&mut inner, session, stream);
                tracing::debug!("Connected to {}", addr);
                Ok(())
            }
            Err(e) => {
                // Guard resets to Disconnected once the lock is released.
                drop(inner);
                tracing::debug!("Connect to {} failed: {}", addr, e);
                Err(e)
            }
        }
    }

    /// Spawn the reader and writer tasks for `stream`.
    fn attach<S>(&self, inner: &mut Inner, session: u64, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        let (writer, writer_loop) = writer_channel(write_half, self.config.channel_capacity);
        let shared = self.shared.clone();
        let writer_task = tokio::spawn(async move {
            if let Err(e) = writer_loop.await {
                tracing::error!("Writer task error: {}", e);
                transport_failed(&shared, session, e);
            }
        });

        let frames = FrameBuffer::with_limits(self.config.max_payload_size, self.config.max_header_len);
        let reader_task = tokio::spawn(read_loop(
            read_half,
            frames,
            self.codec,
            self.shared.clone(),
            session,
        ));

        inner.cache.clear();
        inner.state = ConnectionState::Connected;
        inner.writer = Some(writer);
        inner.tasks = vec![reader_task, writer_task];
    }

    /// Query symbols for a path the server can read.
    ///
    /// Uses the configured `request_timeout`, if any.
    ///
    /// # Errors
    ///
    /// - `NotConnected` unless connected
    /// - `RequestInFlight` if another query has not resolved yet; nothing is
    ///   sent in that case
    /// - `Parse` if the answering frame could not be decoded
    /// - `Io` / `ConnectionClosed` if the transport fails or `close` is called
    /// - `Timeout` if the configured limit expires
    pub async fn get_symbols(&self, path: &str) -> Result<Symbols> {
        self.request(path, self.config.request_timeout).await
    }

    /// Query symbols, failing with `Timeout` after `limit`.
    ///
    /// The protocol has no cancel message: a reply arriving after the
    /// timeout is treated as an ordinary push.
    pub async fn get_symbols_timeout(&self, path: &str, limit: Duration) -> Result<Symbols> {
        self.request(path, Some(limit)).await
    }

    async fn request(&self, path: &str, limit: Option<Duration>) -> Result<Symbols> {
        let (id, rx, writer) = {
            let mut inner = lock(&self.shared);
            if inner.state != ConnectionState::Connected {
                return Err(WhatelsError::NotConnected);
            }
            if inner.pending.is_some() {
                return Err(WhatelsError::RequestInFlight);
            }
            let writer = inner.writer.clone().ok_or(WhatelsError::NotConnected)?;

            let id = inner.next_request_id;
            inner.next_request_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.pending = Some(Pending { id, tx });
            (id, rx, writer)
        };
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        tracing::debug!("Querying symbols for {} (request {})", path, id);
        writer
            .send(OutboundFrame::new(self.codec.encode_query(path)))
            .await?;
        drop(writer);

        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| WhatelsError::Timeout)?,
            None => rx.await,
        };

        // A dropped sender means the slot was discarded by close().
        outcome.unwrap_or(Err(WhatelsError::ConnectionClosed))
    }

    /// Subscribe to pushes for paths matching `wildcard`.
    ///
    /// Fire-and-forget: never waits, and the server sends no
    /// acknowledgement. Pushes land in the path cache.
    ///
    /// # Errors
    ///
    /// - `Unsupported` in the legacy dialect
    /// - `NotConnected` unless connected
    /// - `Io(WouldBlock)` if the outbound queue is full
    pub fn watch(&self, wildcard: &str) -> Result<()> {
        let frame = self.codec.encode_watch(wildcard)?;
        let writer = self.connected_writer()?;
        tracing::debug!("Watching {}", wildcard);
        writer.try_send(OutboundFrame::new(frame))
    }

    /// Like [`Connection::watch`], also returning a stream of every later
    /// push (for any path) and of undecodable pushes.
    pub fn watch_stream(&self, wildcard: &str) -> Result<Subscription> {
        let frame = self.codec.encode_watch(wildcard)?;

        let (writer, subscription) = {
            let mut inner = lock(&self.shared);
            if inner.state != ConnectionState::Connected {
                return Err(WhatelsError::NotConnected);
            }
            let writer = inner.writer.clone().ok_or(WhatelsError::NotConnected)?;
            // Register before sending so no push is missed.
            let (tx, subscription) = Subscription::channel(self.config.subscription_capacity);
            inner.subscribers.push(tx);
            (writer, subscription)
        };

        tracing::debug!("Watching {} with subscription", wildcard);
        writer.try_send(OutboundFrame::new(frame))?;
        Ok(subscription)
    }

    fn connected_writer(&self) -> Result<WriterHandle> {
        let inner = lock(&self.shared);
        if inner.state != ConnectionState::Connected {
            return Err(WhatelsError::NotConnected);
        }
        inner.writer.clone().ok_or(WhatelsError::NotConnected)
    }

    /// Last pushed symbols for `path`.
    pub fn get_path_symbols(&self, path: &str) -> Option<Symbols> {
        lock(&self.shared).cache.get(path).cloned()
    }

    /// Snapshot of every cached path.
    pub fn get_all_path_symbols(&self) -> HashMap<String, Symbols> {
        lock(&self.shared).cache.clone()
    }

    /// Close the connection.
    ///
    /// The socket is dropped at once, along with any frames not yet written.
    /// A waiting `get_symbols` fails with `ConnectionClosed` and watch
    /// subscriptions end. The cache stays readable. No-op when already
    /// closed or disconnected.
    pub fn close(&self) {
        let (tasks, pending) = {
            let mut inner = lock(&self.shared);
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Closed => return,
                ConnectionState::Connecting | ConnectionState::Connected => {}
            }
            tracing::debug!("Closing connection (session {})", inner.session);
            inner.state = ConnectionState::Closed;
            let tasks = inner.release_transport();
            (tasks, inner.pending.take())
        };

        drop(pending);
        abort_all(tasks);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Move to `Disconnected` after a transport failure and fail the pending
/// query with `err`.
fn transport_failed(shared: &Mutex<Inner>, session: u64, err: WhatelsError) {
    let tasks = {
        let mut inner = lock(shared);
        if !inner.is_live(session) {
            return;
        }
        inner.state = ConnectionState::Disconnected;
        let tasks = inner.release_transport();
        if inner.pending.is_some() {
            tracing::warn!("Connection lost with a request in flight: {}", err);
            inner.resolve_pending(Err(err));
        } else {
            tracing::debug!("Connection lost: {}", err);
        }
        tasks
    };

    abort_all(tasks);
}

/// Main read loop - reads bytes, extracts frames, dispatches them.
async fn read_loop<R>(
    mut reader: R,
    mut frames: FrameBuffer,
    codec: Codec,
    shared: Arc<Mutex<Inner>>,
    session: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                transport_failed(&shared, session, WhatelsError::ConnectionClosed);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                transport_failed(&shared, session, WhatelsError::Io(e));
                return;
            }
        };

        frames.extend(&buf[..n]);
        loop {
            match frames.try_extract_one() {
                Ok(Some(frame)) => {
                    let decoded = codec.decode(&frame);
                    dispatch(&shared, session, decoded);
                }
                Ok(None) => break,
                Err(e) => {
                    // Without a length the next frame boundary is unknown.
                    tracing::error!("Unrecoverable framing error: {}", e);
                    transport_failed(&shared, session, WhatelsError::Parse(e));
                    return;
                }
            }
        }
    }
}

/// Route one decoded frame to the pending query, the cache and subscribers.
fn dispatch(
    shared: &Mutex<Inner>,
    session: u64,
    decoded: std::result::Result<Message, ParseError>,
) {
    let mut inner = lock(shared);
    if !inner.is_live(session) {
        return;
    }

    match decoded {
        Ok(Message::PathSymbols(push)) => {
            tracing::debug!("Received symbols for {}", push.path);
            inner
                .cache
                .insert(push.path.clone(), push.symbols.clone());
            let symbols = push.symbols.clone();
            inner.notify_subscribers(WatchEvent::Symbols(push));
            inner.resolve_pending(Ok(symbols));
        }
        Ok(Message::SymbolsOnly(symbols)) => {
            if !inner.resolve_pending(Ok(symbols)) {
                tracing::warn!("Received symbols with no request in flight, discarding");
            }
        }
        Ok(Message::Unknown { opcode }) => {
            tracing::warn!("Unknown message: {:?}, discarding", opcode);
        }
        Err(e) => {
            tracing::warn!("Failed to decode frame: {}", e);
            if inner.pending.is_some() {
                inner.resolve_pending(Err(WhatelsError::Parse(e)));
            } else {
                inner.notify_subscribers(WatchEvent::Malformed(Arc::new(e)));
            }
        }
    }
}
