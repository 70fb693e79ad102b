//! Frame headers for PCOM over TCP.
//!
//! Two headers are defined here:
//!
//! - [`TcpHeader`]: the 6-byte sub-header that prefixes every message on a
//!   direct Ethernet connection. It carries either protocol.
//! - [`BinaryHeader`]: the fixed 24-byte header of a Protocol B frame.
//!
//! # TCP Sub-Header Structure
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-1 | ID | Transaction id (little-endian) |
//! | 2 | PROTO | Protocol tag (101 = PCOM-A, 102 = PCOM-B) |
//! | 3 | STATUS | 0 = success |
//! | 4-5 | LEN | Payload length (big-endian) |
//!
//! # Binary Header Structure
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-5 | STX | `/_OPLC` |
//! | 6 | DST | Destination unit id |
//! | 7 | SRC | Source id (always 254 on requests) |
//! | 8-11 | RSV | `01 00 00 00` |
//! | 12 | CMD | Command code |
//! | 13 | SUB | Sub-command (0) |
//! | 14-19 | DET | Command-specific detail |
//! | 20-21 | LEN | Payload length (little-endian) |
//! | 22-23 | CHK | Checksum of bytes 0-21 (little-endian) |
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::{Protocol, TcpHeader};
//!
//! let header = TcpHeader::new(7, Protocol::PcomA, 12);
//! let bytes = header.to_bytes();
//! assert_eq!(bytes, [0x07, 0x00, 101, 0x00, 0x00, 0x0C]);
//! ```

use std::fmt;

use crate::checksum::binary_checksum;
use crate::error::{PcomError, Result};

/// TCP sub-header size in bytes.
pub const TCP_HEADER_SIZE: usize = 6;

/// Largest payload a controller announces in the TCP sub-header.
pub const MAX_TCP_PAYLOAD: usize = 1009;

/// Binary header size in bytes.
pub const BINARY_HEADER_SIZE: usize = 24;

/// Binary footer size: payload checksum plus terminator.
pub const BINARY_FOOTER_SIZE: usize = 3;

/// Binary start marker.
pub const BINARY_STX: &[u8; 6] = b"/_OPLC";

/// Binary terminator.
pub const BINARY_ETX: u8 = b'\\';

/// Source id placed in every binary request.
pub const BINARY_SOURCE_ID: u8 = 254;

/// Offset of the payload length inside a binary header.
pub(crate) const BINARY_LENGTH_OFFSET: usize = 20;

/// The PCOM protocol carried by a message.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// ASCII protocol.
    PcomA,
    /// Binary protocol.
    PcomB,
}

impl Protocol {
    /// Tag used in the TCP sub-header.
    pub fn tag(self) -> u8 {
        match self {
            Protocol::PcomA => 101,
            Protocol::PcomB => 102,
        }
    }

    /// Start marker of a response frame.
    pub fn response_stx(self) -> &'static [u8] {
        match self {
            Protocol::PcomA => b"/A",
            Protocol::PcomB => BINARY_STX,
        }
    }

    /// Terminator byte of a frame.
    pub fn etx(self) -> u8 {
        match self {
            Protocol::PcomA => b'\r',
            Protocol::PcomB => BINARY_ETX,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::PcomA => write!(f, "PCOM-A"),
            Protocol::PcomB => write!(f, "PCOM-B"),
        }
    }
}

/// Sub-header of a message on a direct Ethernet connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Transaction id echoed by the controller.
    pub transaction_id: u16,
    /// Raw protocol tag.
    pub protocol: u8,
    /// Status flag (0 = success).
    pub status: u8,
    /// Length of the wrapped payload.
    pub length: u16,
}

impl TcpHeader {
    /// Creates a request header.
    pub fn new(transaction_id: u16, protocol: Protocol, length: u16) -> Self {
        Self {
            transaction_id,
            protocol: protocol.tag(),
            status: 0,
            length,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; TCP_HEADER_SIZE] {
        let id = self.transaction_id.to_le_bytes();
        let len = self.length.to_be_bytes();
        [id[0], id[1], self.protocol, self.status, len[0], len[1]]
    }

    /// Parses a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns `PcomError::Framing` if the slice is too short.
    pub fn from_bytes(data: &[u8], protocol: Protocol) -> Result<Self> {
        if data.len() < TCP_HEADER_SIZE {
            return Err(PcomError::framing(
                protocol,
                format!(
                    "TCP header too short: expected {} bytes, got {}",
                    TCP_HEADER_SIZE,
                    data.len()
                ),
            ));
        }

        Ok(Self {
            transaction_id: u16::from_le_bytes([data[0], data[1]]),
            protocol: data[2],
            status: data[3],
            length: u16::from_be_bytes([data[4], data[5]]),
        })
    }

    /// Checks a response header against the request it answers.
    pub fn validate(&self, transaction_id: u16, protocol: Protocol) -> Result<()> {
        if self.status != 0 {
            return Err(PcomError::framing(
                protocol,
                format!("TCP header status flag is 0x{:02X}", self.status),
            ));
        }

        if self.transaction_id != transaction_id {
            return Err(PcomError::TransactionMismatch {
                expected: transaction_id,
                received: self.transaction_id,
            });
        }

        if self.protocol != protocol.tag() {
            return Err(PcomError::ProtocolMismatch {
                expected: protocol,
                received: self.protocol,
            });
        }

        if self.length == 0 || usize::from(self.length) > MAX_TCP_PAYLOAD {
            return Err(PcomError::framing(
                protocol,
                format!(
                    "TCP header length {} is outside 1..={}",
                    self.length, MAX_TCP_PAYLOAD
                ),
            ));
        }

        Ok(())
    }
}

/// Header of a Protocol B frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    /// Destination id.
    pub destination: u8,
    /// Source id.
    pub source: u8,
    /// Command code.
    pub command: u8,
    /// Command-specific detail bytes.
    pub detail: [u8; 6],
    /// Payload length.
    pub length: u16,
}

impl BinaryHeader {
    /// Creates a request header addressed to `unit_id`.
    pub fn new_request(unit_id: u8, command: u8, detail: [u8; 6], length: u16) -> Self {
        Self {
            destination: unit_id,
            source: BINARY_SOURCE_ID,
            command,
            detail,
            length,
        }
    }

    /// Serializes the header, checksum included.
    pub fn to_bytes(self) -> [u8; BINARY_HEADER_SIZE] {
        let mut bytes = [0u8; BINARY_HEADER_SIZE];
        bytes[..6].copy_from_slice(BINARY_STX);
        bytes[6] = self.destination;
        bytes[7] = self.source;
        bytes[8] = 1;
        bytes[12] = self.command;
        bytes[14..20].copy_from_slice(&self.detail);
        bytes[20..22].copy_from_slice(&self.length.to_le_bytes());
        let checksum = binary_checksum(&bytes[..22]);
        bytes[22..24].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Parses a header and verifies its checksum.
    ///
    /// The caller is expected to have checked the start marker already.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < BINARY_HEADER_SIZE {
            return Err(PcomError::framing(
                Protocol::PcomB,
                format!(
                    "header too short: expected {} bytes, got {}",
                    BINARY_HEADER_SIZE,
                    data.len()
                ),
            ));
        }

        let expected = binary_checksum(&data[..22]);
        let received = u16::from_le_bytes([data[22], data[23]]);
        if expected != received {
            return Err(PcomError::checksum(
                Protocol::PcomB,
                crate::error::ChecksumScope::Header,
                expected,
                received,
            ));
        }

        let mut detail = [0u8; 6];
        detail.copy_from_slice(&data[14..20]);

        Ok(Self {
            destination: data[6],
            source: data[7],
            command: data[12],
            detail,
            length: u16::from_le_bytes([data[20], data[21]]),
        })
    }
}
