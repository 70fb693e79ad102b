//! Channels: a socket plus the rules for exchanging one framed message.
//!
//! A [`Channel`] owns at most one transport and runs request/response
//! exchanges over it. Two implementations exist:
//!
//! - [`EthernetChannel`](crate::EthernetChannel) talks to one controller
//!   and wraps every message in the 6-byte TCP sub-header.
//! - [`SerialChannel`](crate::SerialChannel) tunnels the serial links of
//!   several controllers over one socket and frames by start marker,
//!   terminator and declared length.
//!
//! Both share the same exchange core: one exchange at a time per channel,
//! a per-attempt deadline, and a retry loop that reconnects before every
//! attempt after the first.
//!
//! # Cancellation
//!
//! Every suspension point (gate acquisition, connect, send, receive) races
//! the caller's [`CancellationToken`]. A cancelled exchange closes the
//! socket so that a late response cannot be read by the next exchange.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PcomError, Result};
use crate::header::Protocol;
use crate::response::{ProcessMessageResult, TransferStats};
use crate::transport::{Connector, Transport, RECEIVE_BUFFER_SIZE};
use crate::utils::format_frame;

/// Reads are not attempted with less time than this left on the deadline.
pub const MIN_RECEIVE_WINDOW: Duration = Duration::from_millis(50);

/// One request to run over a channel.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    /// Encoded Protocol A or Protocol B request frame.
    pub request: &'a [u8],
    /// Protocol of `request`.
    pub protocol: Protocol,
    /// Unit id the request is addressed to.
    pub unit_id: u8,
    /// Budget of each attempt.
    pub timeout: Duration,
    /// Attempts made after the first one fails.
    pub retries: u32,
}

/// A connection able to run request/response exchanges.
#[async_trait]
pub trait Channel: Send + Sync + fmt::Debug {
    /// `host:port` of the remote end.
    fn endpoint(&self) -> String;

    /// Returns `true` while a socket is open.
    fn is_connected(&self) -> bool;

    /// Opens the socket if it is not open yet.
    async fn initialize(&self, timeout: Duration, cancel: &CancellationToken) -> Result<()>;

    /// Sends `exchange.request` and waits for the complete response frame.
    async fn process_message(
        &self,
        exchange: Exchange<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessMessageResult>;

    /// Closes the socket. Further exchanges fail with `Disposed`.
    async fn close(&self);
}

/// How messages are delimited on a channel.
pub(crate) trait Framing: Send + Sync + fmt::Debug {
    /// Prepares `request` for the wire.
    fn wrap(&self, request: &[u8], protocol: Protocol, transaction_id: u16) -> Result<Vec<u8>>;

    /// Returns the response frame once `received` holds all of it.
    ///
    /// Errors abort the attempt; `Ok(None)` asks for more data.
    fn extract(
        &self,
        received: &[u8],
        protocol: Protocol,
        transaction_id: u16,
    ) -> Result<Option<Vec<u8>>>;
}

/// Races `future` against `cancel`.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PcomError::Cancelled),
        result = future => result,
    }
}

struct LinkState {
    transport: Option<Box<dyn Transport>>,
    initialized: bool,
    transaction_id: u16,
}

/// Exchange core shared by both channel kinds.
pub(crate) struct Link<F> {
    host: String,
    port: u16,
    connector: Arc<dyn Connector>,
    framing: F,
    // admission gate: held for the whole exchange
    state: Mutex<LinkState>,
    init_gate: Mutex<()>,
    connected: AtomicBool,
    disposed: AtomicBool,
}

impl<F: Framing> Link<F> {
    pub(crate) fn new(host: String, port: u16, connector: Arc<dyn Connector>, framing: F) -> Self {
        Self {
            host,
            port,
            connector,
            framing,
            state: Mutex::new(LinkState {
                transport: None,
                initialized: false,
                transaction_id: 0,
            }),
            init_gate: Mutex::new(()),
            connected: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) async fn initialize(&self, timeout: Duration, cancel: &CancellationToken) -> Result<()> {
        let gate = self.lock_init(cancel).await?;
        self.initialize_locked(&gate, timeout, cancel).await
    }

    /// Takes the init gate. Hold it across [`initialize_locked`](Self::initialize_locked).
    pub(crate) async fn lock_init(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, ()>> {
        if self.is_disposed() {
            return Err(PcomError::Disposed);
        }
        if cancel.is_cancelled() {
            return Err(PcomError::Cancelled);
        }
        cancellable(cancel, async { Ok(self.init_gate.lock().await) }).await
    }

    /// Opens the socket unless it is already open. The caller holds the init gate.
    pub(crate) async fn initialize_locked(
        &self,
        _gate: &MutexGuard<'_, ()>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let transport = cancellable(
            cancel,
            self.connector.connect(&self.host, self.port, timeout),
        )
        .await?;

        let mut state = cancellable(cancel, async { Ok(self.state.lock().await) }).await?;
        if self.is_disposed() {
            let mut transport = transport;
            transport.close().await;
            return Err(PcomError::Disposed);
        }
        if let Some(mut stale) = state.transport.replace(transport) {
            stale.close().await;
        }
        state.initialized = true;
        self.connected.store(true, Ordering::Release);

        info!(endpoint = %self.endpoint(), "channel connected");
        Ok(())
    }

    pub(crate) async fn exchange(
        &self,
        exchange: Exchange<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessMessageResult> {
        if self.is_disposed() {
            return Err(PcomError::Disposed);
        }
        if cancel.is_cancelled() {
            return Err(PcomError::Cancelled);
        }

        let mut state = cancellable(cancel, async { Ok(self.state.lock().await) }).await?;
        if !state.initialized {
            return Err(PcomError::NotInitialized);
        }

        let started = Instant::now();
        let mut stats = TransferStats::default();
        let mut last_error = None;

        for attempt in 0..=exchange.retries {
            if cancel.is_cancelled() {
                return Err(PcomError::Cancelled);
            }
            if self.is_disposed() {
                return Err(PcomError::Disposed);
            }
            if let Some(error) = &last_error {
                warn!(
                    endpoint = %self.endpoint(),
                    unit_id = exchange.unit_id,
                    protocol = %exchange.protocol,
                    attempt,
                    %error,
                    "exchange failed, reconnecting"
                );
                // attempts after the first always start on a fresh socket
                self.drop_transport(&mut state).await;
            }

            match self.attempt(&mut state, exchange, &mut stats, cancel).await {
                Ok(response) => {
                    stats.duration = started.elapsed();
                    return Ok(ProcessMessageResult { stats, response });
                }
                Err(PcomError::Cancelled) => {
                    self.drop_transport(&mut state).await;
                    return Err(PcomError::Cancelled);
                }
                Err(error) => last_error = Some(error),
            }
        }

        // the socket may hold a partial frame
        self.drop_transport(&mut state).await;
        Err(last_error.unwrap_or_else(|| PcomError::timeout("no attempt was made")))
    }

    async fn attempt(
        &self,
        state: &mut LinkState,
        exchange: Exchange<'_>,
        stats: &mut TransferStats,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if state.transport.is_none() {
            let transport = cancellable(
                cancel,
                self.connector.connect(&self.host, self.port, exchange.timeout),
            )
            .await?;
            state.transport = Some(transport);
            self.connected.store(true, Ordering::Release);
            info!(endpoint = %self.endpoint(), "channel reconnected");
        }

        state.transaction_id = state.transaction_id.wrapping_add(1);
        let transaction_id = state.transaction_id;
        let frame = self
            .framing
            .wrap(exchange.request, exchange.protocol, transaction_id)?;

        let transport = state.transport.as_mut().ok_or(PcomError::Disposed)?;
        let deadline = Instant::now() + exchange.timeout;

        debug!(
            endpoint = %self.endpoint(),
            unit_id = exchange.unit_id,
            transaction_id,
            frame = %format_frame(exchange.protocol, exchange.request),
            "sending request"
        );
        let sent = cancellable(cancel, transport.send(&frame, exchange.timeout)).await?;
        stats.bytes_sent += sent;
        stats.packets_sent += 1;

        let mut received = Vec::new();
        let mut chunk = vec![0u8; RECEIVE_BUFFER_SIZE];
        loop {
            if let Some(response) =
                self.framing
                    .extract(&received, exchange.protocol, transaction_id)?
            {
                debug!(
                    endpoint = %self.endpoint(),
                    unit_id = exchange.unit_id,
                    transaction_id,
                    frame = %format_frame(exchange.protocol, &response),
                    "received response"
                );
                return Ok(response);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < MIN_RECEIVE_WINDOW {
                return Err(incomplete(&received, exchange.timeout));
            }

            let read = match cancellable(cancel, transport.receive(&mut chunk, remaining)).await {
                Ok(0) => return Err(PcomError::connection("connection closed by the remote end")),
                Ok(read) => read,
                Err(PcomError::Timeout { .. }) => return Err(incomplete(&received, exchange.timeout)),
                Err(error) => return Err(error),
            };
            stats.bytes_received += read;
            stats.packets_received += 1;
            received.extend_from_slice(&chunk[..read]);
        }
    }

    async fn drop_transport(&self, state: &mut LinkState) {
        if let Some(mut transport) = state.transport.take() {
            transport.close().await;
        }
        self.connected.store(false, Ordering::Release);
    }

    pub(crate) async fn close(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock().await;
        self.drop_transport(&mut state).await;
        info!(endpoint = %self.endpoint(), "channel closed");
    }
}

fn incomplete(received: &[u8], timeout: Duration) -> PcomError {
    if received.is_empty() {
        PcomError::timeout(format!("no response within {timeout:?}"))
    } else {
        PcomError::timeout(format!(
            "incomplete frame after {timeout:?}, {} bytes received",
            received.len()
        ))
    }
}

impl<F: fmt::Debug> fmt::Debug for Link<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("framing", &self.framing)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
