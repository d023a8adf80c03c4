//! TCP transport to the indexing server.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::Result;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 10999;

/// Open a TCP connection, optionally bounded by a timeout.
///
/// Nagle is disabled: frames are small and every query waits on its reply.
/// An expired timeout is an `Io` error of kind `TimedOut`.
pub async fn connect_tcp(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let stream = bounded(timeout, TcpStream::connect(addr)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn bounded<F, T>(limit: Option<Duration>, connect: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))),
        None => connect.await,
    }
}
