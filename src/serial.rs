//! Serial-over-LAN channel.
//!
//! A serial gateway forwards the bytes of one TCP connection to an RS-232 or
//! RS-485 link shared by several controllers. Messages carry no sub-header;
//! a response is complete once its start marker, its terminator and (for
//! Protocol B) its declared payload length are all present.
//!
//! Several clients attach to one [`SerialChannel`] through the
//! [`SharedChannelRegistry`](crate::SharedChannelRegistry). While more than one
//! client is attached, a failed connect blocks further connect attempts for
//! `min(attached, 10)` seconds so the attached clients do not hammer the
//! gateway in lockstep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::channel::{Channel, Exchange, Framing, Link};
use crate::error::{PcomError, Result};
use crate::header::{Protocol, BINARY_FOOTER_SIZE, BINARY_HEADER_SIZE, BINARY_LENGTH_OFFSET};
use crate::registry::AttachmentId;
use crate::response::ProcessMessageResult;
use crate::transport::Connector;

/// Upper bound of the initialize cooldown, in seconds.
pub const MAX_INITIALIZE_COOLDOWN_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SerialFraming;

impl Framing for SerialFraming {
    fn wrap(&self, request: &[u8], _protocol: Protocol, _transaction_id: u16) -> Result<Vec<u8>> {
        Ok(request.to_vec())
    }

    fn extract(
        &self,
        received: &[u8],
        protocol: Protocol,
        _transaction_id: u16,
    ) -> Result<Option<Vec<u8>>> {
        let stx = protocol.response_stx();
        let mut offset = 0;
        loop {
            let Some(start) = received[offset..]
                .windows(stx.len())
                .position(|window| window == stx)
            else {
                return Ok(None);
            };
            // bytes before the start marker are line noise
            let frame = &received[offset + start..];

            match protocol {
                Protocol::PcomA => {
                    let end = frame.iter().position(|byte| *byte == protocol.etx());
                    return Ok(end.map(|index| frame[..=index].to_vec()));
                }
                Protocol::PcomB => {
                    if frame.len() < BINARY_HEADER_SIZE {
                        return Ok(None);
                    }
                    let length = u16::from_le_bytes([
                        frame[BINARY_LENGTH_OFFSET],
                        frame[BINARY_LENGTH_OFFSET + 1],
                    ]);
                    let total = BINARY_HEADER_SIZE + usize::from(length) + BINARY_FOOTER_SIZE;
                    if frame.len() < total {
                        return Ok(None);
                    }
                    if frame[total - 1] == protocol.etx() {
                        return Ok(Some(frame[..total].to_vec()));
                    }
                    // false start: the declared length does not land on an end marker
                    offset += start + 1;
                }
            }
        }
    }
}

/// Channel shared by every controller behind one serial gateway.
#[derive(Debug)]
pub struct SerialChannel {
    link: Link<SerialFraming>,
    attachments: Mutex<HashSet<AttachmentId>>,
    last_failed_initialize: Mutex<Option<Instant>>,
}

impl SerialChannel {
    /// Creates an uninitialized channel with no attachments.
    pub fn new(host: impl Into<String>, port: u16, connector: Arc<dyn Connector>) -> Self {
        Self {
            link: Link::new(host.into(), port, connector, SerialFraming),
            attachments: Mutex::new(HashSet::new()),
            last_failed_initialize: Mutex::new(None),
        }
    }

    /// Records `attachment` as a user of this channel.
    ///
    /// Returns `false` if it was already attached.
    pub fn attach(&self, attachment: AttachmentId) -> bool {
        self.attachments.lock().insert(attachment)
    }

    /// Removes `attachment` and returns the number still attached.
    pub fn detach(&self, attachment: AttachmentId) -> usize {
        let mut attachments = self.attachments.lock();
        attachments.remove(&attachment);
        attachments.len()
    }

    /// Number of attached clients.
    pub fn attachment_count(&self) -> usize {
        self.attachments.lock().len()
    }

    fn cooldown(&self) -> Option<Duration> {
        let attached = self.attachment_count();
        if attached <= 1 {
            return None;
        }
        let last = (*self.last_failed_initialize.lock())?;
        let cooldown = Duration::from_secs((attached as u64).min(MAX_INITIALIZE_COOLDOWN_SECS));
        cooldown.checked_sub(last.elapsed()).filter(|left| !left.is_zero())
    }
}

#[async_trait]
impl Channel for SerialChannel {
    fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn initialize(&self, timeout: Duration, cancel: &CancellationToken) -> Result<()> {
        if self.link.is_connected() {
            return Ok(());
        }

        // callers queued behind a failing connect must see its cooldown
        let gate = self.link.lock_init(cancel).await?;
        if self.link.is_connected() {
            return Ok(());
        }
        if let Some(retry_after) = self.cooldown() {
            return Err(PcomError::Throttled {
                endpoint: self.endpoint(),
                retry_after,
            });
        }

        match self.link.initialize_locked(&gate, timeout, cancel).await {
            Ok(()) => {
                *self.last_failed_initialize.lock() = None;
                Ok(())
            }
            Err(PcomError::Cancelled) => Err(PcomError::Cancelled),
            Err(error) => {
                warn!(
                    endpoint = %self.endpoint(),
                    attached = self.attachment_count(),
                    %error,
                    "shared channel failed to connect"
                );
                *self.last_failed_initialize.lock() = Some(Instant::now());
                Err(error)
            }
        }
    }

    async fn process_message(
        &self,
        exchange: Exchange<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessMessageResult> {
        self.link.exchange(exchange, cancel).await
    }

    async fn close(&self) {
        self.link.close().await
    }
}
