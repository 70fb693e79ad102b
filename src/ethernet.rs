//! Direct Ethernet channel.
//!
//! Every message sent to an Ethernet-enabled controller is prefixed with a
//! 6-byte sub-header:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0..2 | transaction id (little-endian) |
//! | 2 | protocol tag (101 = PCOM-A, 102 = PCOM-B) |
//! | 3 | status (0 = success) |
//! | 4..6 | payload length (big-endian) |
//!
//! The controller echoes the sub-header with the length of its reply, so a
//! response is complete as soon as that many bytes follow the sub-header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, Exchange, Framing, Link};
use crate::error::{PcomError, Result};
use crate::header::{Protocol, TcpHeader, MAX_TCP_PAYLOAD, TCP_HEADER_SIZE};
use crate::response::ProcessMessageResult;
use crate::transport::{Connector, TcpConnector};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EthernetFraming;

impl Framing for EthernetFraming {
    fn wrap(&self, request: &[u8], protocol: Protocol, transaction_id: u16) -> Result<Vec<u8>> {
        let length = u16::try_from(request.len())
            .ok()
            .filter(|length| usize::from(*length) <= MAX_TCP_PAYLOAD)
            .ok_or_else(|| {
                PcomError::invalid_parameter(
                    "request",
                    format!(
                        "{} bytes exceeds the {} byte Ethernet payload limit",
                        request.len(),
                        MAX_TCP_PAYLOAD
                    ),
                )
            })?;

        let mut frame = Vec::with_capacity(TCP_HEADER_SIZE + request.len());
        frame.extend_from_slice(&TcpHeader::new(transaction_id, protocol, length).to_bytes());
        frame.extend_from_slice(request);
        Ok(frame)
    }

    fn extract(
        &self,
        received: &[u8],
        protocol: Protocol,
        transaction_id: u16,
    ) -> Result<Option<Vec<u8>>> {
        if received.len() < TCP_HEADER_SIZE {
            return Ok(None);
        }

        let header = TcpHeader::from_bytes(received, protocol)?;
        header.validate(transaction_id, protocol)?;

        let end = TCP_HEADER_SIZE + usize::from(header.length);
        if received.len() < end {
            return Ok(None);
        }
        Ok(Some(received[TCP_HEADER_SIZE..end].to_vec()))
    }
}

/// Channel to a single controller over its own TCP connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use unitronics_pcom::{Channel, EthernetChannel, Exchange, Protocol};
/// use unitronics_pcom::pcom_a::build_identification_request;
///
/// # async fn run() -> unitronics_pcom::Result<()> {
/// let cancel = CancellationToken::new();
/// let channel = EthernetChannel::tcp("192.168.1.20", 20256);
/// channel.initialize(Duration::from_secs(2), &cancel).await?;
///
/// let request = build_identification_request(0);
/// let result = channel
///     .process_message(
///         Exchange {
///             request: &request,
///             protocol: Protocol::PcomA,
///             unit_id: 0,
///             timeout: Duration::from_secs(2),
///             retries: 1,
///         },
///         &cancel,
///     )
///     .await?;
/// println!("{} bytes received", result.stats.bytes_received);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EthernetChannel {
    link: Link<EthernetFraming>,
}

impl EthernetChannel {
    /// Creates an uninitialized channel that connects through `connector`.
    pub fn new(host: impl Into<String>, port: u16, connector: Arc<dyn Connector>) -> Self {
        Self {
            link: Link::new(host.into(), port, connector, EthernetFraming),
        }
    }

    /// Creates an uninitialized channel over plain TCP.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, Arc::new(TcpConnector))
    }
}

#[async_trait]
impl Channel for EthernetChannel {
    fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn initialize(&self, timeout: Duration, cancel: &CancellationToken) -> Result<()> {
        self.link.initialize(timeout, cancel).await
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
