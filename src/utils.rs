//! Utility functions for hex text, bit packing and float word order.
//!
//! PCOM carries 32-bit floats with their two 16-bit halves swapped relative to
//! little-endian IEEE-754, i.e. in byte order `[1, 0, 3, 2]`. Both protocols
//! share the helpers below.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::utils::{float_from_wire, float_to_wire, unpack_bits};
//!
//! let wire = float_to_wire(12.5);
//! assert_eq!(float_from_wire(wire), 12.5);
//!
//! let bits = unpack_bits(&[0b0000_0101], 3);
//! assert_eq!(bits, vec![true, false, true]);
//! ```

use crate::header::Protocol;

/// Swaps a 4-byte little-endian value into PCOM float order (`[1, 0, 3, 2]`).
///
/// The permutation is its own inverse.
#[inline]
pub fn swap_float_bytes(bytes: [u8; 4]) -> [u8; 4] {
    [bytes[1], bytes[0], bytes[3], bytes[2]]
}

/// Encodes a float into its 4 wire bytes.
#[inline]
pub fn float_to_wire(value: f32) -> [u8; 4] {
    swap_float_bytes(value.to_le_bytes())
}

/// Decodes a float from its 4 wire bytes.
#[inline]
pub fn float_from_wire(bytes: [u8; 4]) -> f32 {
    f32::from_le_bytes(swap_float_bytes(bytes))
}

/// Gets a single bit from a byte (bit 0 is the LSB).
///
/// # Example
///
/// ```
/// use unitronics_pcom::utils::get_bit;
///
/// assert!(get_bit(0b0000_0100, 2));
/// assert!(!get_bit(0b0000_0100, 1));
/// ```
#[inline]
pub fn get_bit(value: u8, bit: u8) -> bool {
    (value & (1 << bit)) != 0
}

/// Unpacks `count` bits, LSB first within each byte.
///
/// Bits beyond the end of `bytes` are not produced.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count.min(bytes.len() * 8))
        .map(|index| get_bit(bytes[index / 8], (index % 8) as u8))
        .collect()
}

/// Packs bits LSB first into bytes, padding the last byte with zeros.
///
/// # Example
///
/// ```
/// use unitronics_pcom::utils::pack_bits;
///
/// assert_eq!(pack_bits(&[true, false, true]), vec![0b0000_0101]);
/// ```
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (index, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[index / 8] |= 1 << (index % 8);
        }
    }
    bytes
}

/// Appends `value` as `width` uppercase hex digits.
pub(crate) fn push_hex(out: &mut String, value: u32, width: usize) {
    out.push_str(&format!("{:0width$X}", value, width = width));
}

/// Parses 1 to 8 hex digits.
///
/// Unlike `from_str_radix`, signs and whitespace are rejected.
pub fn parse_hex(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 8 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

/// Renders a frame for log output.
///
/// Protocol A frames are printable text and are shown as such; Protocol B
/// frames are shown as uppercase hex.
pub fn format_frame(protocol: Protocol, frame: &[u8]) -> String {
    match protocol {
        Protocol::PcomA => frame.escape_ascii().to_string(),
        Protocol::PcomB => hex::encode_upper(frame),
    }
}
