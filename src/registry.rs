//! Registry of shared serial-over-LAN channels.
//!
//! Clients that reach different controllers through the same serial gateway
//! must share one socket. The registry maps each `(host, port)` to its
//! [`SerialChannel`] and tracks who is attached to it; the socket is closed
//! when the last attachment is released.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use unitronics_pcom::SharedChannelRegistry;
//!
//! # async fn run() -> unitronics_pcom::Result<()> {
//! let registry = Arc::new(SharedChannelRegistry::default());
//! let cancel = CancellationToken::new();
//!
//! let first = registry.acquire("10.0.0.9", 20256, Duration::from_secs(2), &cancel).await?;
//! let second = registry.acquire("10.0.0.9", 20256, Duration::from_secs(2), &cancel).await?;
//! assert!(Arc::ptr_eq(first.channel(), second.channel()));
//!
//! registry.release(first).await;
//! registry.release(second).await; // closes the socket
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::Channel;
use crate::error::Result;
use crate::serial::SerialChannel;
use crate::transport::{Connector, TcpConnector};

/// Identifies one user of a shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(u64);

impl AttachmentId {
    /// Wraps a caller-chosen id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type ChannelKey = (String, u16);

/// Proof of attachment returned by [`SharedChannelRegistry::acquire`].
///
/// Hand it back to [`SharedChannelRegistry::release`] to detach.
#[derive(Debug)]
pub struct SharedChannelLease {
    key: ChannelKey,
    attachment: AttachmentId,
    channel: Arc<SerialChannel>,
}

impl SharedChannelLease {
    /// The shared channel.
    pub fn channel(&self) -> &Arc<SerialChannel> {
        &self.channel
    }

    /// Attachment id held by this lease.
    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }
}

/// Shared serial channels keyed by `(host, port)`.
pub struct SharedChannelRegistry {
    connector: Arc<dyn Connector>,
    channels: Mutex<HashMap<ChannelKey, Arc<SerialChannel>>>,
    // registry-issued ids count down from the top to stay clear of caller ids
    next_attachment: AtomicU64,
}

impl SharedChannelRegistry {
    /// Creates an empty registry whose channels connect through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            channels: Mutex::new(HashMap::new()),
            next_attachment: AtomicU64::new(u64::MAX),
        }
    }

    /// Returns the channel for `host:port`, creating it if needed, with
    /// `attachment` attached.
    ///
    /// The channel is initialized before it is returned. If that fails,
    /// `attachment` is detached again and the error is returned.
    ///
    /// # Errors
    ///
    /// Connection and timeout errors from the connect, `Throttled` if the
    /// shared channel is cooling down after a failed connect, or `Cancelled`.
    pub async fn get_or_create(
        &self,
        attachment: AttachmentId,
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<SerialChannel>> {
        let channel = {
            let mut channels = self.channels.lock();
            let channel = channels
                .entry((host.to_string(), port))
                .or_insert_with(|| {
                    debug!(host, port, "creating shared channel");
                    Arc::new(SerialChannel::new(host, port, Arc::clone(&self.connector)))
                });
            channel.attach(attachment);
            Arc::clone(channel)
        };

        if let Err(error) = channel.initialize(timeout, cancel).await {
            self.remove(attachment, host, port).await;
            return Err(error);
        }
        Ok(channel)
    }

    /// Detaches `attachment` from the channel for `host:port`.
    ///
    /// The last detach closes the channel and drops it from the registry.
    /// Unknown keys and attachments are ignored.
    pub async fn remove(&self, attachment: AttachmentId, host: &str, port: u16) {
        let key = (host.to_string(), port);
        let orphan = {
            let mut channels = self.channels.lock();
            match channels.get(&key) {
                Some(channel) if channel.detach(attachment) == 0 => channels.remove(&key),
                _ => None,
            }
        };

        if let Some(channel) = orphan {
            debug!(host, port, "closing shared channel");
            channel.close().await;
        }
    }

    /// Attaches to the channel for `host:port` under a fresh attachment id.
    pub async fn acquire(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SharedChannelLease> {
        let attachment = AttachmentId(self.next_attachment.fetch_sub(1, Ordering::Relaxed));
        let channel = self
            .get_or_create(attachment, host, port, timeout, cancel)
            .await?;
        Ok(SharedChannelLease {
            key: (host.to_string(), port),
            attachment,
            channel,
        })
    }

    /// Gives back a lease obtained from [`acquire`](Self::acquire).
    pub async fn release(&self, lease: SharedChannelLease) {
        let (host, port) = &lease.key;
        self.remove(lease.attachment, host, *port).await;
    }

    /// Returns `true` if a channel for `host:port` is registered.
    pub fn contains(&self, host: &str, port: u16) -> bool {
        self.channels.lock().contains_key(&(host.to_string(), port))
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    /// Returns `true` if no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}

impl Default for SharedChannelRegistry {
    fn default() -> Self {
        Self::new(Arc::new(TcpConnector))
    }
}

impl fmt::Debug for SharedChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedChannelRegistry")
            .field("connector", &self.connector)
            .field("channels", &self.channels.lock().len())
            .finish()
    }
}
