//! # Unitronics PCOM Protocol Library
//!
//! A Rust library for communicating with Unitronics controllers using the
//! PCOM protocol, over direct Ethernet or through serial-over-LAN gateways.
//!
//! ## Features
//!
//! - **Both PCOM flavours**: Protocol A (ASCII) and Protocol B (binary)
//! - **Model aware**: the controller is identified on connect and every
//!   operation picks the protocol and batch size the controller supports
//! - **Batched reads**: any mix of operands is split into as few messages as
//!   the controller's receive buffer allows
//! - **Shared gateways**: clients behind one serial gateway share its socket
//! - **Async**: built on tokio, every operation can be cancelled
//! - **No panics**: all errors returned as `Result<T, PcomError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use unitronics_pcom::{Client, ClientConfig, OperandKind, ReadOperandsRequest};
//!
//! #[tokio::main]
//! async fn main() -> unitronics_pcom::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let client = Client::connect(ClientConfig::new("192.168.1.20", 0), &cancel).await?;
//!     println!("connected to {} {}", client.model(), client.version());
//!
//!     // MI 0..10 and MB 5 in as few messages as possible
//!     let mut request = ReadOperandsRequest::new();
//!     request.add_range(OperandKind::MI, 0, 10)?;
//!     request.add(OperandKind::MB, 5);
//!     let result = client.read_operands(&request, &cancel).await?;
//!     println!("MI 3 = {:?}", result.get(OperandKind::MI, 3));
//!
//!     // Write a float
//!     client.write_operand(OperandKind::MF, 0, 21.5f32, &cancel).await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Operands
//!
//! | Kind | Value | Protocol A | Protocol B |
//! |------|-------|:----------:|:----------:|
//! | [`OperandKind::MB`], [`OperandKind::SB`], [`OperandKind::XB`] | `bool` | read/write | read/write |
//! | [`OperandKind::Input`] | `bool` | read | read |
//! | [`OperandKind::InputForce`], [`OperandKind::OutputForce`] | `bool` | write | ✗ |
//! | [`OperandKind::MI`], [`OperandKind::SI`], [`OperandKind::XI`] | `i16` | read/write | read/write |
//! | [`OperandKind::ML`], [`OperandKind::SL`], [`OperandKind::XL`] | `i32` | read/write | read/write |
//! | [`OperandKind::DW`], [`OperandKind::SDW`], [`OperandKind::XDW`] | `u32` | read/write | read/write |
//! | [`OperandKind::MF`] | `f32` | read/write | read/write |
//! | [`OperandKind::TimerCurrent`], [`OperandKind::TimerPreset`] | milliseconds | read/write | read/write |
//!
//! See [`OperandKind`] for the full catalog.
//!
//! ## Shared Serial Gateways
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use unitronics_pcom::{Client, ClientConfig, SharedChannelRegistry};
//!
//! # async fn run() -> unitronics_pcom::Result<()> {
//! let registry = Arc::new(SharedChannelRegistry::default());
//! let cancel = CancellationToken::new();
//!
//! // Two controllers on the RS-485 line behind 10.0.0.9
//! let first = Client::connect_shared(ClientConfig::new("10.0.0.9", 1), Arc::clone(&registry), &cancel).await?;
//! let second = Client::connect_shared(ClientConfig::new("10.0.0.9", 2), Arc::clone(&registry), &cancel).await?;
//!
//! first.close().await;
//! second.close().await; // the gateway socket closes here
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a [`PcomError`]. [`PcomError::category`] groups them for
//! callers that only need to know what kind of thing went wrong:
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use unitronics_pcom::{Client, ClientConfig, ErrorCategory};
//!
//! # async fn run() {
//! let cancel = CancellationToken::new();
//! match Client::connect(ClientConfig::new("192.168.1.20", 0), &cancel).await {
//!     Ok(client) => println!("{:?}", client.profile()),
//!     Err(e) if e.category() == ErrorCategory::Timeout => println!("controller did not answer"),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # }
//! ```
//!
//! ## Layers
//!
//! The crate is usable at every level:
//!
//! 1. [`pcom_a`] and [`pcom_b`] build and parse single frames
//! 2. [`batch`] plans the messages for a read request
//! 3. [`EthernetChannel`] and [`SerialChannel`] run request/response exchanges
//! 4. [`Client`] ties them together for one controller

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
mod channel;
pub mod checksum;
mod client;
mod error;
mod ethernet;
mod header;
#[cfg(test)]
mod mock;
mod model;
mod operand;
pub mod pcom_a;
pub mod pcom_b;
mod registry;
mod response;
mod serial;
mod transport;
pub mod utils;
mod value;

// Public re-exports
pub use channel::{Channel, Exchange, MIN_RECEIVE_WINDOW};
pub use client::{Client, ClientConfig, DEFAULT_RETRIES, MAX_SERIAL_UNIT_ID};
pub use error::{ChecksumScope, ErrorCategory, PcomError, Result};
pub use ethernet::EthernetChannel;
pub use header::{
    BinaryHeader, Protocol, TcpHeader, BINARY_FOOTER_SIZE, BINARY_HEADER_SIZE, MAX_TCP_PAYLOAD,
    TCP_HEADER_SIZE,
};
pub use model::{ControllerModel, ControllerProfile, ModelTier, Version};
pub use operand::{AddressingMode, OperandAddress, OperandKind, ReadOperandsRequest, ValueType};
pub use pcom_a::Identification;
pub use registry::{AttachmentId, SharedChannelLease, SharedChannelRegistry};
pub use response::{
    ProcessMessageResult, ReadClockResult, ReadOperandsResult, TransferStats, WriteClockResult,
    WriteOperandResult,
};
pub use serial::{SerialChannel, MAX_INITIALIZE_COOLDOWN_SECS};
pub use transport::{
    Connector, TcpConnector, TcpTransport, Transport, DEFAULT_PORT, DEFAULT_TIMEOUT,
    RECEIVE_BUFFER_SIZE,
};
pub use value::{OperandValue, MAX_TIMER_MS};
