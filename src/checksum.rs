//! Frame checksums for both PCOM protocols.
//!
//! - Protocol A sums the ASCII codes of the message body (unit id, command and
//!   detail) modulo 256 and transmits the result as two uppercase hex digits.
//! - Protocol B sums raw bytes modulo 65536 and stores the two's complement of
//!   the sum little-endian. The header and the payload carry independent checksums.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::checksum::{ascii_checksum, binary_checksum};
//!
//! assert_eq!(ascii_checksum(b"01ID"), 0xEE);
//! assert_eq!(binary_checksum(&[0x01, 0x02]), 0xFFFD);
//! ```

/// Protocol A checksum: sum of the bytes modulo 256.
pub fn ascii_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Protocol B checksum: two's complement of the byte sum modulo 65536.
pub fn binary_checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
        .wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_checksum_identification() {
        // '0' + '1' + 'I' + 'D' = 48 + 49 + 73 + 68 = 238
        assert_eq!(ascii_checksum(b"01ID"), 238);
        assert_eq!(format!("{:02X}", ascii_checksum(b"01ID")), "EE");
    }

    #[test]
    fn test_ascii_checksum_wraps() {
        let body = [0xFFu8, 0x02];
        assert_eq!(ascii_checksum(&body), 0x01);
        assert_eq!(ascii_checksum(&[]), 0);
    }

    #[test]
    fn test_binary_checksum_is_negated_sum() {
        let data = [0x2F, 0x5F, 0x4F, 0x50, 0x4C, 0x43];
        let sum: u32 = data.iter().map(|b| u32::from(*b)).sum();
        assert_eq!(binary_checksum(&data), (0x1_0000 - sum) as u16);
    }

    #[test]
    fn test_binary_checksum_zero() {
        assert_eq!(binary_checksum(&[]), 0);
        assert_eq!(binary_checksum(&[0, 0, 0]), 0);
    }

    #[test]
    fn test_binary_checksum_balances_sum() {
        let data = [0x10u8, 0x20, 0xFF, 0x7F];
        let checksum = binary_checksum(&data);
        let total = data
            .iter()
            .fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)))
            .wrapping_add(checksum);
        assert_eq!(total, 0);
    }
}
