//! Operand kinds and the protocol catalog.
//!
//! This module defines the [`OperandKind`] enum, the memory categories of a
//! Unitronics controller, together with everything the codecs need to know
//! about each kind: its width, whether it is bit-addressed (vectorial) or
//! word-addressed, its Protocol A mnemonics and its Protocol B type codes.
//!
//! # Catalog Overview
//!
//! | Kind | A read | A write | B read | B write | Width | Mode |
//! |------|--------|---------|-------:|--------:|------:|------|
//! | Input | RE | - | 9 | - | 1 | bit |
//! | Output | RA | SA | 10 | 10 | 1 | bit |
//! | InputForce | - | SD | - | - | 1 | bit |
//! | OutputForce | - | SE | - | - | 1 | bit |
//! | MB | RB | SB | 1 | 1 | 1 | bit |
//! | SB | GS | SS | 2 | 2 | 1 | bit |
//! | TimerRunBit | RT | - | 11 | - | 1 | bit |
//! | CounterRunBit | RM | - | 12 | - | 1 | bit |
//! | XB | RZB | SZB | 26 | 64 | 1 | bit |
//! | MI | RW | SW | 3 | 3 | 2 | word |
//! | SI | GF | SF | 4 | 4 | 2 | word |
//! | XI | RZI | SZI | 27 | 65 | 2 | word |
//! | CounterCurrent | GX | SK | 18 | 145 | 2 | word |
//! | CounterPreset | GY | SJ | 19 | 144 | 2 | word |
//! | ML | RNL | SNL | 5 | 5 | 4 | word |
//! | SL | RNH | SNH | 6 | 6 | 4 | word |
//! | XL | RZL | SZL | 28 | 66 | 4 | word |
//! | DW | RND | SND | 16 | 16 | 4 | word |
//! | SDW | RNJ | SNJ | 17 | 36 | 4 | word |
//! | XDW | RZD | SZD | 29 | 67 | 4 | word |
//! | MF | RNF | SNF | 7 | 7 | 4 | word |
//! | TimerCurrent | GT | SNK | 20 | 129 | 4 | word |
//! | TimerPreset | GP | SNT | 21 | 128 | 4 | word |
//!
//! The vectorial Protocol B code of a bit kind is its read code plus `0x80`.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::{AddressingMode, OperandKind};
//!
//! assert_eq!(OperandKind::MI.byte_width(), 2);
//! assert_eq!(OperandKind::MB.addressing_mode(), AddressingMode::BitAddressed);
//! assert_eq!(OperandKind::ML.ascii_read_command(), Some("RNL"));
//! assert_eq!(OperandKind::MB.binary_vectorial_code(), Some(0x81));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{PcomError, Result};

/// Addressing mode of an operand kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Each address occupies `byte_width` bytes (non-vectorial blocks).
    WordAddressed,
    /// Each address is one bit, packed 8 per byte (vectorial blocks).
    BitAddressed,
}

/// Typed value carried by an operand kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// 32-bit float.
    F32,
    /// Timer value in milliseconds.
    DurationMs,
}

/// Memory categories of a Unitronics controller.
///
/// The declaration order is the order in which Protocol A batches kinds.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandKind {
    /// Memory bit.
    MB,
    /// System bit.
    SB,
    /// Memory integer.
    MI,
    /// System integer.
    SI,
    /// Memory long.
    ML,
    /// System long.
    SL,
    /// Memory float.
    MF,
    /// Physical input.
    Input,
    /// Physical output.
    Output,
    /// Input force flag.
    InputForce,
    /// Output force flag.
    OutputForce,
    /// Timer run bit.
    TimerRunBit,
    /// Counter run bit.
    CounterRunBit,
    /// Memory double word.
    DW,
    /// System double word.
    SDW,
    /// Counter current value.
    CounterCurrent,
    /// Counter preset value.
    CounterPreset,
    /// Timer current value.
    TimerCurrent,
    /// Timer preset value.
    TimerPreset,
    /// Fast bit.
    XB,
    /// Fast integer.
    XI,
    /// Fast double word.
    XDW,
    /// Fast long.
    XL,
}

struct CatalogEntry {
    byte_width: usize,
    mode: AddressingMode,
    value: ValueType,
    ascii_read: Option<&'static str>,
    ascii_write: Option<&'static str>,
    binary_read: Option<u8>,
    binary_write: Option<u8>,
}

const fn bit(
    ascii_read: Option<&'static str>,
    ascii_write: Option<&'static str>,
    binary_read: Option<u8>,
    binary_write: Option<u8>,
) -> CatalogEntry {
    CatalogEntry {
        byte_width: 1,
        mode: AddressingMode::BitAddressed,
        value: ValueType::Bool,
        ascii_read,
        ascii_write,
        binary_read,
        binary_write,
    }
}

const fn word(
    value: ValueType,
    ascii_read: &'static str,
    ascii_write: &'static str,
    binary_read: u8,
    binary_write: u8,
) -> CatalogEntry {
    let byte_width = match value {
        ValueType::I16 => 2,
        _ => 4,
    };
    CatalogEntry {
        byte_width,
        mode: AddressingMode::WordAddressed,
        value,
        ascii_read: Some(ascii_read),
        ascii_write: Some(ascii_write),
        binary_read: Some(binary_read),
        binary_write: Some(binary_write),
    }
}

impl OperandKind {
    /// Every operand kind, in declaration order.
    pub const ALL: [OperandKind; 23] = [
        OperandKind::MB,
        OperandKind::SB,
        OperandKind::MI,
        OperandKind::SI,
        OperandKind::ML,
        OperandKind::SL,
        OperandKind::MF,
        OperandKind::Input,
        OperandKind::Output,
        OperandKind::InputForce,
        OperandKind::OutputForce,
        OperandKind::TimerRunBit,
        OperandKind::CounterRunBit,
        OperandKind::DW,
        OperandKind::SDW,
        OperandKind::CounterCurrent,
        OperandKind::CounterPreset,
        OperandKind::TimerCurrent,
        OperandKind::TimerPreset,
        OperandKind::XB,
        OperandKind::XI,
        OperandKind::XDW,
        OperandKind::XL,
    ];

    fn entry(self) -> CatalogEntry {
        use ValueType::*;
        match self {
            // inputs are driven by field wiring; the controller rejects writes to them
            OperandKind::Input => bit(Some("RE"), None, Some(9), None),
            OperandKind::Output => bit(Some("RA"), Some("SA"), Some(10), Some(10)),
            OperandKind::InputForce => bit(None, Some("SD"), None, None),
            OperandKind::OutputForce => bit(None, Some("SE"), None, None),
            OperandKind::MB => bit(Some("RB"), Some("SB"), Some(1), Some(1)),
            OperandKind::SB => bit(Some("GS"), Some("SS"), Some(2), Some(2)),
            OperandKind::TimerRunBit => bit(Some("RT"), None, Some(11), None),
            OperandKind::CounterRunBit => bit(Some("RM"), None, Some(12), None),
            OperandKind::XB => bit(Some("RZB"), Some("SZB"), Some(26), Some(64)),
            OperandKind::MI => word(I16, "RW", "SW", 3, 3),
            OperandKind::SI => word(I16, "GF", "SF", 4, 4),
            OperandKind::XI => word(I16, "RZI", "SZI", 27, 65),
            OperandKind::CounterCurrent => word(I16, "GX", "SK", 18, 145),
            OperandKind::CounterPreset => word(I16, "GY", "SJ", 19, 144),
            OperandKind::ML => word(I32, "RNL", "SNL", 5, 5),
            OperandKind::SL => word(I32, "RNH", "SNH", 6, 6),
            OperandKind::XL => word(I32, "RZL", "SZL", 28, 66),
            OperandKind::DW => word(U32, "RND", "SND", 16, 16),
            OperandKind::SDW => word(U32, "RNJ", "SNJ", 17, 36),
            OperandKind::XDW => word(U32, "RZD", "SZD", 29, 67),
            OperandKind::MF => word(F32, "RNF", "SNF", 7, 7),
            OperandKind::TimerCurrent => word(DurationMs, "GT", "SNK", 20, 129),
            OperandKind::TimerPreset => word(DurationMs, "GP", "SNT", 21, 128),
        }
    }

    /// Width of one value in a Protocol B response.
    pub fn byte_width(self) -> usize {
        self.entry().byte_width
    }

    /// Number of hex characters per value in a Protocol A response.
    pub fn ascii_width(self) -> usize {
        match self.addressing_mode() {
            AddressingMode::BitAddressed => 1,
            AddressingMode::WordAddressed => self.byte_width() * 2,
        }
    }

    /// Whether addresses index bits or words.
    pub fn addressing_mode(self) -> AddressingMode {
        self.entry().mode
    }

    /// Returns whether this kind is bit-addressed.
    pub fn is_bit(self) -> bool {
        self.addressing_mode() == AddressingMode::BitAddressed
    }

    /// Type of the values stored under this kind.
    pub fn value_type(self) -> ValueType {
        self.entry().value
    }

    /// Protocol A read mnemonic.
    pub fn ascii_read_command(self) -> Option<&'static str> {
        self.entry().ascii_read
    }

    /// Protocol A write mnemonic.
    pub fn ascii_write_command(self) -> Option<&'static str> {
        self.entry().ascii_write
    }

    /// Protocol B type code for non-vectorial reads.
    pub fn binary_read_code(self) -> Option<u8> {
        self.entry().binary_read
    }

    /// Protocol B type code for vectorial reads.
    pub fn binary_vectorial_code(self) -> Option<u8> {
        self.binary_read_code().map(|code| code + 0x80)
    }

    /// Protocol B type code for writes.
    pub fn binary_write_code(self) -> Option<u8> {
        self.entry().binary_write
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One memory cell: an operand kind and an address.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandAddress {
    /// Operand kind.
    pub kind: OperandKind,
    /// Address within the kind.
    pub address: u16,
}

impl OperandAddress {
    /// Creates a new operand address.
    pub fn new(kind: OperandKind, address: u16) -> Self {
        Self { kind, address }
    }
}

impl fmt::Display for OperandAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.address)
    }
}

/// A set of operand addresses to read.
///
/// Duplicates collapse and iteration is ordered by kind, then address.
///
/// # Example
///
/// ```
/// use unitronics_pcom::{OperandKind, ReadOperandsRequest};
///
/// let mut request = ReadOperandsRequest::new();
/// request.add(OperandKind::MB, 5).add(OperandKind::MB, 5);
/// request.add_range(OperandKind::MI, 10, 4).unwrap();
/// assert_eq!(request.len(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOperandsRequest {
    operands: BTreeMap<OperandKind, BTreeSet<u16>>,
}

impl ReadOperandsRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single address.
    pub fn add(&mut self, kind: OperandKind, address: u16) -> &mut Self {
        self.operands.entry(kind).or_default().insert(address);
        self
    }

    /// Adds `count` consecutive addresses starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns `PcomError::InvalidParameter` if the range runs past address 65535.
    pub fn add_range(&mut self, kind: OperandKind, start: u16, count: u16) -> Result<&mut Self> {
        if count == 0 {
            return Ok(self);
        }
        let last = start.checked_add(count - 1).ok_or_else(|| {
            PcomError::invalid_parameter("count", format!("{start} + {count} exceeds address 65535"))
        })?;
        self.operands.entry(kind).or_default().extend(start..=last);
        Ok(self)
    }

    /// Returns whether `address` of `kind` is requested.
    pub fn contains(&self, kind: OperandKind, address: u16) -> bool {
        self.operands
            .get(&kind)
            .is_some_and(|addresses| addresses.contains(&address))
    }

    /// Number of distinct addresses.
    pub fn len(&self) -> usize {
        self.operands.values().map(BTreeSet::len).sum()
    }

    /// Returns whether no address was added.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requested addresses grouped by kind.
    pub fn operands(&self) -> &BTreeMap<OperandKind, BTreeSet<u16>> {
        &self.operands
    }

    /// Iterates over every requested address.
    pub fn iter(&self) -> impl Iterator<Item = OperandAddress> + '_ {
        self.operands.iter().flat_map(|(kind, addresses)| {
            addresses
                .iter()
                .map(move |address| OperandAddress::new(*kind, *address))
        })
    }
}

impl Extend<OperandAddress> for ReadOperandsRequest {
    fn extend<T: IntoIterator<Item = OperandAddress>>(&mut self, iter: T) {
        for operand in iter {
            self.add(operand.kind, operand.address);
        }
    }
}

impl FromIterator<OperandAddress> for ReadOperandsRequest {
    fn from_iter<T: IntoIterator<Item = OperandAddress>>(iter: T) -> Self {
        let mut request = Self::new();
        request.extend(iter);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(OperandKind::MB.byte_width(), 1);
        assert_eq!(OperandKind::MI.byte_width(), 2);
        assert_eq!(OperandKind::CounterPreset.byte_width(), 2);
        assert_eq!(OperandKind::ML.byte_width(), 4);
        assert_eq!(OperandKind::MF.byte_width(), 4);
        assert_eq!(OperandKind::TimerCurrent.byte_width(), 4);
        assert_eq!(OperandKind::MB.ascii_width(), 1);
        assert_eq!(OperandKind::SI.ascii_width(), 4);
        assert_eq!(OperandKind::XDW.ascii_width(), 8);
    }

    #[test]
    fn test_addressing_modes() {
        let bits: Vec<_> = OperandKind::ALL.iter().filter(|k| k.is_bit()).collect();
        assert_eq!(bits.len(), 9);
        assert!(OperandKind::XB.is_bit());
        assert!(!OperandKind::XI.is_bit());
        assert!(!OperandKind::MF.is_bit());
    }

    #[test]
    fn test_value_types() {
        assert_eq!(OperandKind::Output.value_type(), ValueType::Bool);
        assert_eq!(OperandKind::CounterCurrent.value_type(), ValueType::I16);
        assert_eq!(OperandKind::SL.value_type(), ValueType::I32);
        assert_eq!(OperandKind::SDW.value_type(), ValueType::U32);
        assert_eq!(OperandKind::MF.value_type(), ValueType::F32);
        assert_eq!(OperandKind::TimerPreset.value_type(), ValueType::DurationMs);
    }

    #[test]
    fn test_ascii_commands() {
        assert_eq!(OperandKind::Input.ascii_read_command(), Some("RE"));
        assert_eq!(OperandKind::Input.ascii_write_command(), None);
        assert_eq!(OperandKind::InputForce.ascii_read_command(), None);
        assert_eq!(OperandKind::InputForce.ascii_write_command(), Some("SD"));
        assert_eq!(OperandKind::TimerCurrent.ascii_write_command(), Some("SNK"));
        assert_eq!(OperandKind::XDW.ascii_read_command(), Some("RZD"));
    }

    #[test]
    fn test_binary_codes() {
        assert_eq!(OperandKind::SDW.binary_read_code(), Some(17));
        assert_eq!(OperandKind::SDW.binary_write_code(), Some(36));
        assert_eq!(OperandKind::XB.binary_vectorial_code(), Some(26 + 0x80));
        assert_eq!(OperandKind::Input.binary_write_code(), None);
        assert_eq!(OperandKind::OutputForce.binary_read_code(), None);
        assert_eq!(OperandKind::OutputForce.binary_vectorial_code(), None);
    }

    #[test]
    fn test_binary_read_codes_are_unique() {
        let mut codes: Vec<u8> = OperandKind::ALL
            .iter()
            .filter_map(|k| k.binary_read_code())
            .collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn test_display() {
        assert_eq!(OperandKind::MB.to_string(), "MB");
        assert_eq!(OperandAddress::new(OperandKind::MI, 12).to_string(), "MI12");
    }

    #[test]
    fn test_request_dedup_and_order() {
        let mut request = ReadOperandsRequest::new();
        request
            .add(OperandKind::MI, 7)
            .add(OperandKind::MB, 3)
            .add(OperandKind::MI, 2)
            .add(OperandKind::MI, 7);

        let operands: Vec<_> = request.iter().collect();
        assert_eq!(
            operands,
            vec![
                OperandAddress::new(OperandKind::MB, 3),
                OperandAddress::new(OperandKind::MI, 2),
                OperandAddress::new(OperandKind::MI, 7),
            ]
        );
        assert!(request.contains(OperandKind::MI, 2));
        assert!(!request.contains(OperandKind::ML, 2));
    }

    #[test]
    fn test_request_add_range() {
        let mut request = ReadOperandsRequest::new();
        request.add_range(OperandKind::DW, 65530, 6).unwrap();
        assert_eq!(request.len(), 6);
        assert!(request.add_range(OperandKind::DW, 65530, 7).is_err());
        request.add_range(OperandKind::DW, 0, 0).unwrap();
        assert_eq!(request.len(), 6);
    }

    #[test]
    fn test_request_from_iter() {
        let request: ReadOperandsRequest = [
            OperandAddress::new(OperandKind::SB, 1),
            OperandAddress::new(OperandKind::SB, 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(request.len(), 1);
        assert!(!request.is_empty());
    }
}
