//! TCP transport layer for PCOM communication.
//!
//! This module provides the [`Transport`] and [`Connector`] traits and their
//! tokio TCP implementations. The transport layer is separated from the
//! protocol layer: it only knows about sockets and bytes, never frames.
//!
//! # Design
//!
//! - **Protocol agnostic** - handles only byte transmission
//! - **Async** - every operation takes its own timeout
//! - **Replaceable** - channels hold a `Box<dyn Transport>` obtained from a
//!   `Connector`, so tests can script the controller side
//!
//! # Constants
//!
//! - [`DEFAULT_PORT`] - default PCOM TCP port (20256)
//! - [`DEFAULT_TIMEOUT`] - default timeout (2 seconds)
//! - [`RECEIVE_BUFFER_SIZE`] - size of a single socket read

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{PcomError, Result};

/// Default PCOM TCP port.
pub const DEFAULT_PORT: u16 = 20256;

/// Default timeout for connect, send and receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Size of a single socket read.
pub const RECEIVE_BUFFER_SIZE: usize = 1500;

/// A connected byte stream.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Writes all of `data`, returning the number of bytes written.
    ///
    /// Fails with `Timeout` when the write does not complete in time,
    /// `Disposed` after [`close`](Transport::close), and `Io` otherwise.
    async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Reads into `buffer`, returning the number of bytes read.
    ///
    /// Returns 0 when the peer closed the connection.
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Closes the stream. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Connects to `host:port` within `timeout`.
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Box<dyn Transport>>;
}

/// Opens [`TcpTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Box<dyn Transport>> {
        let transport = TcpTransport::connect(host, port, timeout).await?;
        Ok(Box::new(transport))
    }
}

/// TCP transport for PCOM communication.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connects to `host:port` within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `PcomError::Timeout` if the connection is not established in
    /// time, or an I/O error if it is refused.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| PcomError::timeout(format!("connecting to {host}:{port}")))??;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        debug!(%peer, "TCP connection established");
        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(PcomError::Disposed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        tokio::time::timeout(timeout, stream.write_all(data))
            .await
            .map_err(|_| PcomError::timeout("sending request"))??;
        Ok(data.len())
    }

    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        let read = tokio::time::timeout(timeout, stream.read(buffer))
            .await
            .map_err(|_| PcomError::timeout("waiting for response data"))??;
        Ok(read)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // the socket is dropped either way
            let _ = stream.shutdown().await;
            debug!(peer = %self.peer, "TCP connection closed");
        }
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("open", &self.stream.is_some())
            .finish()
    }
}
