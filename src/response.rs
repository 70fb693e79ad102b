//! Exchange results and transfer counters.
//!
//! Every channel exchange reports how many bytes and packets moved in each
//! direction. The client sums these across the messages of one operation and
//! hands them back alongside the decoded values.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::TransferStats;
//!
//! let mut total = TransferStats::default();
//! total.accumulate(&TransferStats {
//!     bytes_sent: 12,
//!     packets_sent: 1,
//!     bytes_received: 20,
//!     packets_received: 2,
//!     ..Default::default()
//! });
//! assert_eq!(total.bytes_sent, 12);
//! assert_eq!(total.packets_received, 2);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::operand::{OperandAddress, OperandKind};
use crate::value::OperandValue;

/// Bytes and packets moved by one or more exchanges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes written to the socket, sub-headers included.
    pub bytes_sent: usize,
    /// Number of socket writes.
    pub packets_sent: usize,
    /// Bytes read from the socket.
    pub bytes_received: usize,
    /// Number of socket reads that returned data.
    pub packets_received: usize,
    /// Wall time spent in the exchanges, retries included.
    pub duration: Duration,
}

impl TransferStats {
    /// Adds `other` to these counters.
    pub fn accumulate(&mut self, other: &TransferStats) {
        self.bytes_sent += other.bytes_sent;
        self.packets_sent += other.packets_sent;
        self.bytes_received += other.bytes_received;
        self.packets_received += other.packets_received;
        self.duration += other.duration;
    }
}

/// Outcome of a single channel exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMessageResult {
    /// Transfer counters of the exchange.
    pub stats: TransferStats,
    /// The complete response frame, without any transport sub-header.
    pub response: Vec<u8>,
}

/// Values returned by [`Client::read_operands`](crate::Client::read_operands).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOperandsResult {
    /// Counters summed across every message of the read.
    pub stats: TransferStats,
    /// One value per requested address.
    pub values: BTreeMap<OperandAddress, OperandValue>,
}

impl ReadOperandsResult {
    /// Returns the value read for `kind` at `address`.
    pub fn get(&self, kind: OperandKind, address: u16) -> Option<OperandValue> {
        self.values.get(&OperandAddress::new(kind, address)).copied()
    }

    /// Returns the value converted to `T`, if present and of that type.
    pub fn get_as<T>(&self, kind: OperandKind, address: u16) -> Option<T>
    where
        T: TryFrom<OperandValue>,
    {
        self.get(kind, address).and_then(|value| T::try_from(value).ok())
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was read.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Acknowledgement of [`Client::write_operand`](crate::Client::write_operand).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOperandResult {
    /// Counters of the write exchange.
    pub stats: TransferStats,
}

/// Controller clock returned by [`Client::read_clock`](crate::Client::read_clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadClockResult {
    /// Counters of the exchange.
    pub stats: TransferStats,
    /// Clock value as reported by the controller, without a time zone.
    pub clock: NaiveDateTime,
}

/// Acknowledgement of [`Client::write_clock`](crate::Client::write_clock).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteClockResult {
    /// Counters of the exchange.
    pub stats: TransferStats,
}
