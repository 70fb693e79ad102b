//! High-level PCOM client for communicating with Unitronics controllers.
//!
//! This module provides the [`Client`] struct, the primary interface for
//! reading and writing controller operands.
//!
//! # Overview
//!
//! On connect the client opens (or attaches to) a channel, identifies the
//! controller and derives its [`ControllerProfile`]. The profile then decides
//! for every operation:
//! - the receive-buffer size used to batch reads
//! - whether reads and writes travel as Protocol B (binary) or Protocol A (ASCII)
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use unitronics_pcom::{Client, ClientConfig, OperandKind, ReadOperandsRequest};
//!
//! # async fn run() -> unitronics_pcom::Result<()> {
//! let cancel = CancellationToken::new();
//! let client = Client::connect(ClientConfig::new("192.168.1.20", 0), &cancel).await?;
//!
//! let mut request = ReadOperandsRequest::new();
//! request.add_range(OperandKind::MI, 0, 10)?;
//! request.add(OperandKind::MB, 3);
//! let result = client.read_operands(&request, &cancel).await?;
//! println!("MI 0 = {:?}", result.get(OperandKind::MI, 0));
//!
//! client.write_operand(OperandKind::MF, 4, 12.5f32, &cancel).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! The [`ClientConfig`] struct allows customization of:
//! - Host and port of the controller or serial gateway
//! - Unit id of the controller
//! - Per-attempt timeout and retry count
//!
//! # Thread Safety
//!
//! All operations take `&self`. A `Client` can be shared between tasks behind
//! an `Arc`; exchanges on its channel are serialized.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::batch::{plan_ascii_reads, plan_binary_reads};
use crate::channel::{Channel, Exchange};
use crate::error::{PcomError, Result};
use crate::ethernet::EthernetChannel;
use crate::header::Protocol;
use crate::model::{ControllerModel, ControllerProfile, Version};
use crate::operand::{OperandAddress, OperandKind, ReadOperandsRequest};
use crate::pcom_a::{self, Identification};
use crate::pcom_b;
use crate::registry::{SharedChannelLease, SharedChannelRegistry};
use crate::response::{
    ProcessMessageResult, ReadClockResult, ReadOperandsResult, WriteClockResult,
    WriteOperandResult,
};
use crate::transport::{Connector, TcpConnector, DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::value::OperandValue;

/// Default number of retries after a failed attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Highest unit id addressable on a serial link.
pub const MAX_SERIAL_UNIT_ID: u8 = 127;

/// Configuration for creating a PCOM client.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or IP address of the controller or serial gateway.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Unit id of the controller.
    pub unit_id: u8,
    /// Budget of each attempt.
    pub timeout: Duration,
    /// Attempts made after the first one fails.
    pub retries: u32,
}

impl ClientConfig {
    /// Creates a configuration with the default port, timeout and retries.
    ///
    /// # Example
    ///
    /// ```
    /// use unitronics_pcom::ClientConfig;
    ///
    /// let config = ClientConfig::new("192.168.1.20", 0);
    /// assert_eq!(config.port, 20256);
    /// ```
    pub fn new(host: impl Into<String>, unit_id: u8) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            unit_id,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Sets a custom port (default is 20256).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets a custom timeout (default is 2 seconds).
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use unitronics_pcom::ClientConfig;
    ///
    /// let config = ClientConfig::new("192.168.1.20", 0)
    ///     .with_timeout(Duration::from_secs(5))
    ///     .with_retries(3);
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries (default is 1).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Checks the configuration.
    ///
    /// `shared` additionally limits the unit id to the serial range.
    ///
    /// # Errors
    ///
    /// Returns `PcomError::InvalidParameter` naming the first invalid field.
    pub fn validate(&self, shared: bool) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PcomError::invalid_parameter("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(PcomError::invalid_parameter("port", "must not be 0"));
        }
        if self.timeout.is_zero() {
            return Err(PcomError::invalid_parameter(
                "timeout",
                "must be greater than 0",
            ));
        }
        if shared && self.unit_id > MAX_SERIAL_UNIT_ID {
            return Err(PcomError::invalid_parameter(
                "unit_id",
                format!("must be at most {MAX_SERIAL_UNIT_ID} on a serial link"),
            ));
        }
        Ok(())
    }

    fn context(&self, protocol: Protocol) -> String {
        format!(
            "{}:{} unit {} {}",
            self.host, self.port, self.unit_id, protocol
        )
    }
}

/// Wraps `error` with the endpoint it happened on. Cancellation passes through.
fn annotate(config: &ClientConfig, protocol: Protocol, error: PcomError) -> PcomError {
    match error {
        PcomError::Cancelled => PcomError::Cancelled,
        error => error.with_context(config.context(protocol)),
    }
}

async fn exchange(
    channel: &dyn Channel,
    config: &ClientConfig,
    request: &[u8],
    protocol: Protocol,
    cancel: &CancellationToken,
) -> Result<ProcessMessageResult> {
    channel
        .process_message(
            Exchange {
                request,
                protocol,
                unit_id: config.unit_id,
                timeout: config.timeout,
                retries: config.retries,
            },
            cancel,
        )
        .await
}

async fn identify(
    channel: &dyn Channel,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<Identification> {
    let request = pcom_a::build_identification_request(config.unit_id);
    let result = exchange(channel, config, &request, Protocol::PcomA, cancel).await?;
    pcom_a::unpack_identification_response(config.unit_id, &result.response)
}

enum Binding {
    Direct,
    Shared {
        registry: Arc<SharedChannelRegistry>,
        lease: Mutex<Option<SharedChannelLease>>,
    },
}

/// PCOM client for one controller.
///
/// Reads are batched to fit the controller's receive buffer; each batched
/// message is one exchange. Failed exchanges are retried `retries` times on
/// a fresh socket.
pub struct Client {
    config: ClientConfig,
    channel: Arc<dyn Channel>,
    binding: Binding,
    identification: Identification,
    profile: ControllerProfile,
    closed: AtomicBool,
}

impl Client {
    /// Connects to an Ethernet-enabled controller over TCP.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the connection
    /// cannot be established, or the controller cannot be identified.
    pub async fn connect(config: ClientConfig, cancel: &CancellationToken) -> Result<Self> {
        Self::connect_with(config, Arc::new(TcpConnector), cancel).await
    }

    /// Connects to an Ethernet-enabled controller through `connector`.
    pub async fn connect_with(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        config.validate(false)?;

        let channel: Arc<dyn Channel> = Arc::new(EthernetChannel::new(
            config.host.clone(),
            config.port,
            connector,
        ));
        channel
            .initialize(config.timeout, cancel)
            .await
            .map_err(|error| annotate(&config, Protocol::PcomA, error))?;

        match identify(channel.as_ref(), &config, cancel).await {
            Ok(identification) => Ok(Self::new(config, channel, Binding::Direct, identification)),
            Err(error) => {
                channel.close().await;
                Err(annotate(&config, Protocol::PcomA, error))
            }
        }
    }

    /// Connects to a controller behind a serial gateway, sharing the
    /// gateway's socket with every other client of `registry`.
    pub async fn connect_shared(
        config: ClientConfig,
        registry: Arc<SharedChannelRegistry>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        config.validate(true)?;

        let lease = registry
            .acquire(&config.host, config.port, config.timeout, cancel)
            .await
            .map_err(|error| annotate(&config, Protocol::PcomA, error))?;
        let channel: Arc<dyn Channel> = Arc::clone(lease.channel()) as Arc<dyn Channel>;

        match identify(channel.as_ref(), &config, cancel).await {
            Ok(identification) => {
                let binding = Binding::Shared {
                    registry,
                    lease: Mutex::new(Some(lease)),
                };
                Ok(Self::new(config, channel, binding, identification))
            }
            Err(error) => {
                registry.release(lease).await;
                Err(annotate(&config, Protocol::PcomA, error))
            }
        }
    }

    fn new(
        config: ClientConfig,
        channel: Arc<dyn Channel>,
        binding: Binding,
        identification: Identification,
    ) -> Self {
        let profile = identification.profile();
        info!(
            endpoint = %channel.endpoint(),
            unit_id = config.unit_id,
            model = %profile.model(),
            version = %profile.version(),
            buffer_size = profile.buffer_size(),
            "controller identified"
        );
        Self {
            config,
            channel,
            binding,
            identification,
            profile,
            closed: AtomicBool::new(false),
        }
    }

    async fn exchange(
        &self,
        request: &[u8],
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> Result<ProcessMessageResult> {
        if self.is_closed() {
            return Err(PcomError::Disposed);
        }
        exchange(self.channel.as_ref(), &self.config, request, protocol, cancel).await
    }

    /// Reads every operand in `request`.
    ///
    /// Uses Protocol B when the controller supports it, otherwise Protocol A.
    /// The result holds exactly the requested addresses; counters are summed
    /// over all messages.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperand` for a kind that cannot be read, or the
    /// first transport or decode error. No partial result is returned.
    pub async fn read_operands(
        &self,
        request: &ReadOperandsRequest,
        cancel: &CancellationToken,
    ) -> Result<ReadOperandsResult> {
        let protocol = self.read_protocol();
        self.read_operands_with(request, protocol, cancel)
            .await
            .map_err(|error| annotate(&self.config, protocol, error))
    }

    async fn read_operands_with(
        &self,
        request: &ReadOperandsRequest,
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> Result<ReadOperandsResult> {
        let unit_id = self.config.unit_id;
        let buffer_size = self.profile.buffer_size();
        let mut result = ReadOperandsResult::default();

        match protocol {
            Protocol::PcomB => {
                for read in plan_binary_reads(request, buffer_size)? {
                    let message = read.build(unit_id);
                    let exchange = self.exchange(&message, protocol, cancel).await?;
                    result.stats.accumulate(&exchange.stats);
                    for (address, value) in read.unpack(unit_id, &exchange.response)? {
                        if request.contains(address.kind, address.address) {
                            result.values.insert(address, value);
                        }
                    }
                }
            }
            Protocol::PcomA => {
                for read in plan_ascii_reads(request, buffer_size)? {
                    let message = read.build(unit_id);
                    let exchange = self.exchange(&message, protocol, cancel).await?;
                    result.stats.accumulate(&exchange.stats);
                    for (address, value) in read.unpack(unit_id, &exchange.response)? {
                        if request.contains(read.kind, address) {
                            result
                                .values
                                .insert(OperandAddress::new(read.kind, address), value);
                        }
                    }
                }
            }
        }

        debug!(
            unit_id,
            %protocol,
            values = result.values.len(),
            packets_sent = result.stats.packets_sent,
            "read operands"
        );
        Ok(result)
    }

    /// Writes one operand.
    ///
    /// `value` is converted to the kind's value type first; a value that does
    /// not fit is rejected rather than truncated.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tokio_util::sync::CancellationToken;
    /// # use unitronics_pcom::{Client, OperandKind, OperandValue};
    /// # async fn run(client: &Client) -> unitronics_pcom::Result<()> {
    /// let cancel = CancellationToken::new();
    /// client.write_operand(OperandKind::MB, 10, true, &cancel).await?;
    /// client.write_operand(OperandKind::ML, 2, -70_000i32, &cancel).await?;
    /// client
    ///     .write_operand(OperandKind::TimerPreset, 0, std::time::Duration::from_secs(3), &cancel)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn write_operand(
        &self,
        kind: OperandKind,
        address: u16,
        value: impl Into<OperandValue>,
        cancel: &CancellationToken,
    ) -> Result<WriteOperandResult> {
        let protocol = self.write_protocol(kind);
        self.write_operand_with(kind, address, value.into(), protocol, cancel)
            .await
            .map_err(|error| annotate(&self.config, protocol, error))
    }

    async fn write_operand_with(
        &self,
        kind: OperandKind,
        address: u16,
        value: OperandValue,
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> Result<WriteOperandResult> {
        let unit_id = self.config.unit_id;
        let value = value.coerce(kind)?;

        let stats = match protocol {
            Protocol::PcomB => {
                let message = pcom_b::build_write_operand_request(unit_id, kind, address, value)?;
                let exchange = self.exchange(&message, protocol, cancel).await?;
                pcom_b::unpack_write_operand_response(unit_id, &exchange.response)?;
                exchange.stats
            }
            Protocol::PcomA => {
                let message = pcom_a::build_write_operand_request(unit_id, kind, address, value)?;
                let exchange = self.exchange(&message, protocol, cancel).await?;
                pcom_a::unpack_write_operand_response(unit_id, kind, &exchange.response)?;
                exchange.stats
            }
        };

        debug!(unit_id, %protocol, operand = %OperandAddress::new(kind, address), %value, "wrote operand");
        Ok(WriteOperandResult { stats })
    }

    /// Reads the controller clock.
    pub async fn read_clock(&self, cancel: &CancellationToken) -> Result<ReadClockResult> {
        let unit_id = self.config.unit_id;
        async {
            let message = pcom_a::build_read_clock_request(unit_id);
            let exchange = self.exchange(&message, Protocol::PcomA, cancel).await?;
            let clock = pcom_a::unpack_read_clock_response(unit_id, &exchange.response)?;
            Ok::<_, PcomError>(ReadClockResult {
                stats: exchange.stats,
                clock,
            })
        }
        .await
        .map_err(|error| annotate(&self.config, Protocol::PcomA, error))
    }

    /// Sets the controller clock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for dates outside 2000 to 2099.
    pub async fn write_clock(
        &self,
        clock: NaiveDateTime,
        cancel: &CancellationToken,
    ) -> Result<WriteClockResult> {
        let unit_id = self.config.unit_id;
        async {
            let message = pcom_a::build_write_clock_request(unit_id, clock)?;
            let exchange = self.exchange(&message, Protocol::PcomA, cancel).await?;
            pcom_a::unpack_write_clock_response(unit_id, &exchange.response)?;
            Ok::<_, PcomError>(WriteClockResult {
                stats: exchange.stats,
            })
        }
        .await
        .map_err(|error| annotate(&self.config, Protocol::PcomA, error))
    }

    /// Closes the client.
    ///
    /// A direct client closes its socket. A shared client detaches from the
    /// registry, which closes the socket once nobody is attached. Closing
    /// twice is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.binding {
            Binding::Direct => self.channel.close().await,
            Binding::Shared { registry, lease } => {
                let lease = lease.lock().take();
                if let Some(lease) = lease {
                    registry.release(lease).await;
                }
            }
        }
        debug!(endpoint = %self.channel.endpoint(), unit_id = self.config.unit_id, "client closed");
    }

    fn read_protocol(&self) -> Protocol {
        if self.profile.supports_binary_read() {
            Protocol::PcomB
        } else {
            Protocol::PcomA
        }
    }

    fn write_protocol(&self, kind: OperandKind) -> Protocol {
        if self.profile.supports_binary_write() && kind.binary_write_code().is_some() {
            Protocol::PcomB
        } else {
            Protocol::PcomA
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Configuration the client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Identification reply of the controller.
    pub fn identification(&self) -> &Identification {
        &self.identification
    }

    /// Capability profile of the controller.
    pub fn profile(&self) -> ControllerProfile {
        self.profile
    }

    /// Controller model.
    pub fn model(&self) -> ControllerModel {
        self.profile.model()
    }

    /// Firmware version.
    pub fn version(&self) -> Version {
        self.profile.version()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("channel", &self.channel)
            .field("unit_id", &self.config.unit_id)
            .field("model", &self.profile.model())
            .field("version", &self.profile.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::ethernet::tests::reply;
    use crate::mock::MockConnector;
    use crate::pcom_a::tests::response as ascii_response;
    use crate::pcom_b::tests::response as binary_response;
    use chrono::NaiveDate;

    const ENHANCED_V3: &str = "35T2A30901";
    const ENHANCED_V2: &str = "35T2A20901";
    const BASIC: &str = "B1  A30901";

    /// Answers like a controller reporting `identification`.
    ///
    /// Binary reads are answered with `binary_read`; ASCII commands with the
    /// payload registered for their first two characters.
    fn controller(
        identification: &'static str,
        binary_read: Vec<u8>,
        ascii: Vec<(&'static str, String)>,
    ) -> MockConnector {
        let connector = MockConnector::new();
        connector.set_responder(move |frame| {
            let request = &frame[6..];
            let payload = if request.starts_with(b"/_OPLC") {
                let unit_id = request[6];
                match request[12] {
                    pcom_b::CMD_READ_OPERANDS => {
                        binary_response(unit_id, pcom_b::CMD_READ_OPERANDS, &binary_read)
                    }
                    command => binary_response(unit_id, command, &[0, 0, 0, 0]),
                }
            } else {
                let text = std::str::from_utf8(request).ok()?;
                let unit_id = u8::from_str_radix(&text[1..3], 16).ok()?;
                let command = &text[3..5];
                let payload = match command {
                    "ID" => identification.to_string(),
                    other => ascii
                        .iter()
                        .find(|(name, _)| *name == other)
                        .map(|(_, payload)| payload.clone())
                        .unwrap_or_default(),
                };
                ascii_response(unit_id, command, &payload)
            };
            Some(reply(frame, &payload))
        });
        connector
    }

    fn config() -> ClientConfig {
        ClientConfig::new("plc", 0).with_timeout(Duration::from_millis(500))
    }

    async fn connect(connector: &MockConnector) -> Client {
        Client::connect_with(config(), Arc::new(connector.clone()), &CancellationToken::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("10.0.0.5", 3);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.unit_id, 3);
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.retries, 1);

        let config = config.with_port(20257).with_retries(0);
        assert_eq!(config.port, 20257);
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::new("plc", 0).validate(false).is_ok());
        assert!(ClientConfig::new(" ", 0).validate(false).is_err());
        assert!(ClientConfig::new("plc", 0).with_port(0).validate(false).is_err());
        assert!(ClientConfig::new("plc", 0)
            .with_timeout(Duration::ZERO)
            .validate(false)
            .is_err());
        assert!(ClientConfig::new("plc", 200).validate(false).is_ok());
        assert!(matches!(
            ClientConfig::new("plc", 200).validate(true),
            Err(PcomError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_identifies_controller() {
        let connector = controller(ENHANCED_V3, Vec::new(), Vec::new());
        let client = connect(&connector).await;

        assert_eq!(client.model(), ControllerModel::V350);
        assert_eq!(client.version(), Version::new(3, 9, 1));
        assert_eq!(client.profile().buffer_size(), 1000);
        assert_eq!(client.identification().model_code, "35T2");
        assert_eq!(connector.sent()[0][6..], *b"/00IDED\r");
    }

    #[tokio::test]
    async fn test_connect_failure_has_context() {
        let connector = MockConnector::new();
        connector.push_refused_connection();

        let err = Client::connect_with(config(), Arc::new(connector), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(err.to_string().starts_with("plc:20256 unit 0 PCOM-A: "));
    }

    #[tokio::test]
    async fn test_binary_read() {
        // MB block (vectorial, 8 bits) then MI block aligned to an even offset
        let payload = vec![0b0000_0101, 0, 0x01, 0x00, 0xFE, 0xFF, 0x10, 0x00];
        let connector = controller(ENHANCED_V3, payload, Vec::new());
        let client = connect(&connector).await;

        let mut request = ReadOperandsRequest::new();
        request.add_range(OperandKind::MB, 0, 3).unwrap();
        request.add_range(OperandKind::MI, 0, 3).unwrap();
        let result = client
            .read_operands(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.len(), 6);
        assert_eq!(result.get(OperandKind::MB, 0), Some(OperandValue::Bool(true)));
        assert_eq!(result.get(OperandKind::MB, 1), Some(OperandValue::Bool(false)));
        assert_eq!(result.get(OperandKind::MB, 2), Some(OperandValue::Bool(true)));
        assert_eq!(result.get(OperandKind::MB, 3), None);
        assert_eq!(result.get(OperandKind::MI, 0), Some(OperandValue::I16(1)));
        assert_eq!(result.get(OperandKind::MI, 1), Some(OperandValue::I16(-2)));
        assert_eq!(result.get(OperandKind::MI, 2), Some(OperandValue::I16(16)));
        assert_eq!(result.stats.packets_sent, 1);
        assert!(connector.sent()[1][6..].starts_with(b"/_OPLC"));
    }

    #[tokio::test]
    async fn test_ascii_read_on_basic_model() {
        let connector = controller(
            BASIC,
            Vec::new(),
            vec![("RW", "0001FFFF002A".to_string())],
        );
        let client = connect(&connector).await;
        assert_eq!(client.profile().buffer_size(), 256);

        let mut request = ReadOperandsRequest::new();
        request.add(OperandKind::MI, 10).add(OperandKind::MI, 12);
        let result = client
            .read_operands(&request, &CancellationToken::new())
            .await
            .unwrap();

        // MI 11 was read to span the gap but is not reported
        assert_eq!(result.len(), 2);
        assert_eq!(result.get_as::<i16>(OperandKind::MI, 10), Some(1));
        assert_eq!(result.get_as::<i16>(OperandKind::MI, 12), Some(42));
        assert_eq!(&connector.sent()[1][6..17], b"/00RW000A03");
    }

    #[tokio::test]
    async fn test_empty_read_sends_nothing() {
        let connector = controller(ENHANCED_V3, Vec::new(), Vec::new());
        let client = connect(&connector).await;

        let result = client
            .read_operands(&ReadOperandsRequest::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_write_protocol_follows_firmware() {
        let cancel = CancellationToken::new();

        let connector = controller(ENHANCED_V3, Vec::new(), Vec::new());
        let client = connect(&connector).await;
        client
            .write_operand(OperandKind::MF, 3, 12.5f32, &cancel)
            .await
            .unwrap();
        assert!(connector.sent()[1][6..].starts_with(b"/_OPLC"));

        // force bits have no binary write code
        client
            .write_operand(OperandKind::OutputForce, 3, true, &cancel)
            .await
            .unwrap();
        assert!(connector.sent()[2][6..].starts_with(b"/00SE"));

        let connector = controller(ENHANCED_V2, Vec::new(), Vec::new());
        let client = connect(&connector).await;
        client
            .write_operand(OperandKind::MI, 7, 5i16, &cancel)
            .await
            .unwrap();
        assert!(connector.sent()[1][6..].starts_with(b"/00SW0007010005"));
    }

    #[tokio::test]
    async fn test_write_rejects_narrowing() {
        let connector = controller(BASIC, Vec::new(), Vec::new());
        let client = connect(&connector).await;

        let err = client
            .write_operand(OperandKind::MI, 0, 70_000i32, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_clock_round_trip() {
        let connector = controller(
            BASIC,
            Vec::new(),
            vec![("RC", "56341203180325".to_string())],
        );
        let client = connect(&connector).await;
        let cancel = CancellationToken::new();

        let expected = NaiveDate::from_ymd_opt(2025, 3, 18)
            .unwrap()
            .and_hms_opt(12, 34, 56)
            .unwrap();
        let result = client.read_clock(&cancel).await.unwrap();
        assert_eq!(result.clock, expected);

        client.write_clock(expected, &cancel).await.unwrap();
        assert!(connector.sent()[2][6..].starts_with(b"/00SC56341203180325"));
    }

    #[tokio::test]
    async fn test_close_direct_is_idempotent() {
        let connector = controller(BASIC, Vec::new(), Vec::new());
        let client = connect(&connector).await;

        client.close().await;
        client.close().await;
        assert!(client.is_closed());

        let err = client
            .read_clock(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.root(), PcomError::Disposed));
    }

    #[tokio::test]
    async fn test_shared_clients_share_socket() {
        let connector = MockConnector::new();
        connector.set_responder(|request| {
            let text = std::str::from_utf8(request).ok()?;
            let unit_id = u8::from_str_radix(&text[1..3], 16).ok()?;
            Some(ascii_response(unit_id, &text[3..5], BASIC))
        });
        let registry = Arc::new(SharedChannelRegistry::new(Arc::new(connector.clone())));
        let cancel = CancellationToken::new();

        let first = Client::connect_shared(
            ClientConfig::new("gateway", 1),
            Arc::clone(&registry),
            &cancel,
        )
        .await
        .unwrap();
        let second = Client::connect_shared(
            ClientConfig::new("gateway", 2),
            Arc::clone(&registry),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(connector.connects(), 1);
        assert_eq!(first.model(), ControllerModel::M90);
        assert_eq!(second.model(), ControllerModel::M90);

        first.close().await;
        assert!(registry.contains("gateway", DEFAULT_PORT));
        second.close().await;
        second.close().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_read_is_not_annotated() {
        let connector = controller(ENHANCED_V3, Vec::new(), Vec::new());
        let client = connect(&connector).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut request = ReadOperandsRequest::new();
        request.add(OperandKind::MI, 0);
        let err = client.read_operands(&request, &cancel).await.unwrap_err();
        assert!(matches!(err, PcomError::Cancelled));
    }
}
