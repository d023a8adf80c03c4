//! Push delivery for `watch!` subscriptions.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::codec::PathSymbols;
use crate::error::ParseError;

/// Default per-subscription queue length.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1024;

/// Something the server pushed while no query was waiting.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// New symbols for a path. The cache already holds them.
    Symbols(PathSymbols),
    /// A frame whose payload could not be decoded.
    Malformed(Arc<ParseError>),
}

/// Receiving end of a `watch_stream` call.
///
/// Ends (`recv` returns `None`) when the connection closes or drops.
/// If the consumer falls behind by more than the configured capacity,
/// further events are dropped until it catches up.
pub struct Subscription {
    rx: mpsc::Receiver<WatchEvent>,
}

impl Subscription {
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<WatchEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }
}
