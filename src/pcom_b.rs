//! Protocol B (PCOM binary) codec.
//!
//! A Protocol B frame is a 24-byte [`BinaryHeader`], a payload, and a 3-byte
//! footer (payload checksum, little-endian, then `\`).
//!
//! Batched reads (command 77) carry one block per operand kind:
//!
//! | Block | Layout | Response |
//! |-------|--------|----------|
//! | Non-vectorial | count(2) + type(1) + `FF` + addresses(2 each) | `byte_width` bytes per address, aligned to an even offset |
//! | Vectorial | count(2) + type+0x80(1) + `FF` + start(2) | `ceil(count / 8)` bytes, LSB first |
//!
//! Writes (command 80) carry a single write block.

use tracing::trace;

use crate::checksum::binary_checksum;
use crate::error::{ChecksumScope, PcomError, Result};
use crate::header::{
    BinaryHeader, Protocol, BINARY_ETX, BINARY_FOOTER_SIZE, BINARY_HEADER_SIZE,
    BINARY_SOURCE_ID, BINARY_STX,
};
use crate::operand::{OperandAddress, OperandKind, ValueType};
use crate::utils::{float_from_wire, float_to_wire, unpack_bits};
use crate::value::{ticks_to_timer, timer_to_ticks, OperandValue};

/// Command code of a batched read.
pub const CMD_READ_OPERANDS: u8 = 77;

/// Command code of a combined read/write, used for writes.
pub const CMD_READ_WRITE_OPERANDS: u8 = 80;

/// Largest number of addresses in one block.
pub const MAX_BLOCK_ADDRESSES: usize = 255;

/// Largest vectorial count: the greatest multiple of 8 within a block.
pub const MAX_VECTORIAL_COUNT: u16 = 248;

/// Frame bytes outside the payload.
pub const FRAME_OVERHEAD: usize = BINARY_HEADER_SIZE + BINARY_FOOTER_SIZE;

/// Read and write block counts at the start of every operand payload.
pub(crate) const BLOCK_COUNTS_SIZE: usize = 4;

const BLOCK_PREFIX_SIZE: usize = 4;

/// One block of a batched read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadBlock {
    /// Word-addressed kind with an explicit address list.
    NonVectorial {
        /// Operand kind.
        kind: OperandKind,
        /// Ascending addresses.
        addresses: Vec<u16>,
    },
    /// Bit-addressed kind covering `count` consecutive addresses.
    Vectorial {
        /// Operand kind.
        kind: OperandKind,
        /// First address.
        start: u16,
        /// Number of bits, a multiple of 8.
        count: u16,
    },
}

impl ReadBlock {
    /// Operand kind of the block.
    pub fn kind(&self) -> OperandKind {
        match self {
            ReadBlock::NonVectorial { kind, .. } | ReadBlock::Vectorial { kind, .. } => *kind,
        }
    }

    /// Number of addresses the block claims.
    pub fn count(&self) -> usize {
        match self {
            ReadBlock::NonVectorial { addresses, .. } => addresses.len(),
            ReadBlock::Vectorial { count, .. } => usize::from(*count),
        }
    }

    fn type_code(&self) -> Result<u8> {
        let kind = self.kind();
        let code = match self {
            ReadBlock::NonVectorial { .. } => kind.binary_read_code(),
            ReadBlock::Vectorial { .. } => kind.binary_vectorial_code(),
        };
        code.ok_or(PcomError::UnsupportedOperand {
            kind,
            operation: "read",
            protocol: Protocol::PcomB,
        })
    }

    /// Bytes the block occupies in the request payload.
    pub fn request_len(&self) -> usize {
        match self {
            ReadBlock::NonVectorial { addresses, .. } => BLOCK_PREFIX_SIZE + 2 * addresses.len(),
            ReadBlock::Vectorial { .. } => BLOCK_PREFIX_SIZE + 2,
        }
    }

    /// Offset where this block's response data starts, given the previous end.
    fn response_start(&self, offset: usize) -> usize {
        match self {
            ReadBlock::NonVectorial { .. } => offset + offset % 2,
            ReadBlock::Vectorial { .. } => offset,
        }
    }

    /// Bytes of response data for this block.
    fn response_data_len(&self) -> usize {
        match self {
            ReadBlock::NonVectorial { kind, addresses } => kind.byte_width() * addresses.len(),
            ReadBlock::Vectorial { count, .. } => usize::from(*count).div_ceil(8),
        }
    }
}

/// Request payload bytes for a block list.
pub fn request_payload_len(blocks: &[ReadBlock]) -> usize {
    BLOCK_COUNTS_SIZE + blocks.iter().map(ReadBlock::request_len).sum::<usize>()
}

/// Response payload bytes for a block list, walked the way the decoder reads it.
pub fn response_payload_len(blocks: &[ReadBlock]) -> usize {
    blocks.iter().fold(0, |offset, block| {
        block.response_start(offset) + block.response_data_len()
    })
}

/// Response bytes a block list claims from the controller's buffer.
///
/// The controller pads its reply to an even length, so an odd vectorial tail
/// costs one more byte than [`response_payload_len`] reports.
pub fn response_budget_len(blocks: &[ReadBlock]) -> usize {
    let len = response_payload_len(blocks);
    len + len % 2
}

/// One batched read message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryReadRequest {
    blocks: Vec<ReadBlock>,
}

impl BinaryReadRequest {
    /// Creates a request, ordering blocks by type code.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty block, a block over 255 addresses, a
    /// kind without a binary read code, or a block in the wrong addressing mode.
    pub fn new(mut blocks: Vec<ReadBlock>) -> Result<Self> {
        for block in &blocks {
            block.type_code()?;
            if block.count() == 0 || block.count() > MAX_BLOCK_ADDRESSES {
                return Err(PcomError::invalid_parameter(
                    "blocks",
                    format!(
                        "{} block holds {} addresses, expected 1 to {}",
                        block.kind(),
                        block.count(),
                        MAX_BLOCK_ADDRESSES
                    ),
                ));
            }
            let vectorial = matches!(block, ReadBlock::Vectorial { .. });
            if vectorial != block.kind().is_bit() {
                return Err(PcomError::invalid_parameter(
                    "blocks",
                    format!("{} has the wrong addressing mode", block.kind()),
                ));
            }
        }
        blocks.sort_by_key(|block| block.kind().binary_read_code());
        Ok(Self { blocks })
    }

    /// Blocks in wire order.
    pub fn blocks(&self) -> &[ReadBlock] {
        &self.blocks
    }

    /// Builds the request frame.
    pub fn build(&self, unit_id: u8) -> Vec<u8> {
        let block_count = (self.blocks.len() as u16).to_le_bytes();

        let mut payload = Vec::with_capacity(request_payload_len(&self.blocks));
        payload.extend_from_slice(&block_count);
        payload.extend_from_slice(&[0, 0]);
        for block in &self.blocks {
            payload.extend_from_slice(&(block.count() as u16).to_le_bytes());
            // type codes were checked in new()
            payload.push(block.type_code().unwrap_or_default());
            payload.push(0xFF);
            match block {
                ReadBlock::NonVectorial { addresses, .. } => {
                    for address in addresses {
                        payload.extend_from_slice(&address.to_le_bytes());
                    }
                }
                ReadBlock::Vectorial { start, .. } => {
                    payload.extend_from_slice(&start.to_le_bytes());
                }
            }
        }

        let detail = [0, 0, 0, 0, block_count[0], block_count[1]];
        build_message(unit_id, CMD_READ_OPERANDS, detail, &payload)
    }

    /// Unpacks the response into values in block order.
    ///
    /// Vectorial blocks yield every address they cover, including padding
    /// addresses past the last requested one.
    pub fn unpack(&self, unit_id: u8, message: &[u8]) -> Result<Vec<(OperandAddress, OperandValue)>> {
        let payload = unpack_message(unit_id, CMD_READ_OPERANDS, message)?;

        let expected = response_payload_len(&self.blocks);
        if payload.len() < expected {
            return Err(PcomError::value_decode(format!(
                "read payload too short: expected {} bytes, got {}",
                expected,
                payload.len()
            )));
        }

        let mut values = Vec::new();
        let mut offset = 0;
        for block in &self.blocks {
            offset = block.response_start(offset);
            let data = &payload[offset..offset + block.response_data_len()];
            offset += data.len();

            match block {
                ReadBlock::NonVectorial { kind, addresses } => {
                    let width = kind.byte_width();
                    for (address, raw) in addresses.iter().zip(data.chunks_exact(width)) {
                        values.push((OperandAddress::new(*kind, *address), decode_value(*kind, raw)?));
                    }
                }
                ReadBlock::Vectorial { kind, start, count } => {
                    let bits = unpack_bits(data, usize::from(*count));
                    for (index, bit) in bits.into_iter().enumerate() {
                        let Some(address) = u16::try_from(index)
                            .ok()
                            .and_then(|index| start.checked_add(index))
                        else {
                            break;
                        };
                        values.push((OperandAddress::new(*kind, address), OperandValue::Bool(bit)));
                    }
                }
            }
        }

        trace!(values = values.len(), "unpacked binary read response");
        Ok(values)
    }
}

/// Decodes one little-endian value of `kind`.
pub fn decode_value(kind: OperandKind, raw: &[u8]) -> Result<OperandValue> {
    let quad = || -> Result<[u8; 4]> {
        raw.try_into()
            .map_err(|_| PcomError::value_decode(format!("{kind} value needs 4 bytes, got {}", raw.len())))
    };

    Ok(match kind.value_type() {
        ValueType::Bool => OperandValue::Bool(raw.first().is_some_and(|b| *b != 0)),
        ValueType::I16 => {
            let pair: [u8; 2] = raw.try_into().map_err(|_| {
                PcomError::value_decode(format!("{kind} value needs 2 bytes, got {}", raw.len()))
            })?;
            OperandValue::I16(i16::from_le_bytes(pair))
        }
        ValueType::I32 => OperandValue::I32(i32::from_le_bytes(quad()?)),
        ValueType::U32 => OperandValue::U32(u32::from_le_bytes(quad()?)),
        ValueType::F32 => OperandValue::F32(float_from_wire(quad()?)),
        ValueType::DurationMs => OperandValue::DurationMs(ticks_to_timer(u32::from_le_bytes(quad()?))),
    })
}

/// Encodes one value of `kind` for a write block, after coercion.
pub fn encode_value(kind: OperandKind, value: OperandValue) -> Result<Vec<u8>> {
    Ok(match value.coerce(kind)? {
        // padded so the block stays even-length
        OperandValue::Bool(value) => vec![u8::from(value), 0],
        OperandValue::I16(value) => value.to_le_bytes().to_vec(),
        OperandValue::I32(value) => value.to_le_bytes().to_vec(),
        OperandValue::U32(value) => value.to_le_bytes().to_vec(),
        OperandValue::F32(value) => float_to_wire(value).to_vec(),
        OperandValue::DurationMs(ms) => timer_to_ticks(ms).to_le_bytes().to_vec(),
    })
}

/// Builds a single-operand write.
pub fn build_write_operand_request(
    unit_id: u8,
    kind: OperandKind,
    address: u16,
    value: OperandValue,
) -> Result<Vec<u8>> {
    let type_code = kind.binary_write_code().ok_or(PcomError::UnsupportedOperand {
        kind,
        operation: "write",
        protocol: Protocol::PcomB,
    })?;
    let value = encode_value(kind, value)?;

    let mut payload = Vec::with_capacity(BLOCK_COUNTS_SIZE + 4 + value.len());
    payload.extend_from_slice(&[0, 0, 1, 0]);
    payload.push(type_code);
    payload.push(1);
    payload.extend_from_slice(&address.to_le_bytes());
    payload.extend_from_slice(&value);

    Ok(build_message(
        unit_id,
        CMD_READ_WRITE_OPERANDS,
        [0, 0, 1, 0, 0, 0],
        &payload,
    ))
}

/// Validates the acknowledgement of a single-operand write.
pub fn unpack_write_operand_response(unit_id: u8, message: &[u8]) -> Result<()> {
    let payload = unpack_message(unit_id, CMD_READ_WRITE_OPERANDS, message)?;
    if payload != [0, 0, 0, 0] {
        return Err(PcomError::value_decode(format!(
            "unexpected write acknowledgement {}",
            hex::encode_upper(payload)
        )));
    }
    Ok(())
}

/// Builds a request frame around `payload`.
pub fn build_message(unit_id: u8, command: u8, detail: [u8; 6], payload: &[u8]) -> Vec<u8> {
    let header = BinaryHeader::new_request(unit_id, command, detail, payload.len() as u16);

    let mut message = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    message.extend_from_slice(&header.to_bytes());
    message.extend_from_slice(payload);
    message.extend_from_slice(&binary_checksum(payload).to_le_bytes());
    message.push(BINARY_ETX);
    message
}

/// Validates a response frame and returns its payload.
///
/// Markers are checked before any checksum, so a damaged terminator is a
/// framing error even when both checksums are intact.
pub fn unpack_message(unit_id: u8, command: u8, message: &[u8]) -> Result<&[u8]> {
    let protocol = Protocol::PcomB;

    if !message.starts_with(BINARY_STX) {
        return Err(PcomError::InvalidStx { protocol });
    }

    if message.last() != Some(&BINARY_ETX) {
        return Err(PcomError::InvalidEtx { protocol });
    }

    if message.len() < FRAME_OVERHEAD {
        return Err(PcomError::framing(
            protocol,
            format!(
                "message too short: expected at least {} bytes, got {}",
                FRAME_OVERHEAD,
                message.len()
            ),
        ));
    }

    let header = BinaryHeader::from_bytes(message)?;

    if header.destination != BINARY_SOURCE_ID {
        return Err(PcomError::framing(
            protocol,
            format!("response addressed to {} instead of {}", header.destination, BINARY_SOURCE_ID),
        ));
    }

    if header.source != unit_id {
        return Err(PcomError::UnitIdMismatch {
            expected: unit_id,
            received: header.source,
        });
    }

    let echoed = if header.command > 0x80 {
        header.command - 0x80
    } else {
        header.command
    };
    if echoed != command {
        return Err(PcomError::command_mismatch(command.to_string(), echoed.to_string()));
    }

    let length = usize::from(header.length);
    if message.len() != FRAME_OVERHEAD + length {
        return Err(PcomError::framing(
            protocol,
            format!(
                "declared payload length {} does not match frame length {}",
                length,
                message.len()
            ),
        ));
    }

    let payload = &message[BINARY_HEADER_SIZE..BINARY_HEADER_SIZE + length];
    let at = BINARY_HEADER_SIZE + length;
    let received = u16::from_le_bytes([message[at], message[at + 1]]);
    let expected = binary_checksum(payload);
    if expected != received {
        return Err(PcomError::checksum(protocol, ChecksumScope::Payload, expected, received));
    }

    Ok(payload)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::utils::pack_bits;
    use proptest::prelude::*;

    /// Builds a controller response frame.
    pub(crate) fn response(unit_id: u8, command: u8, payload: &[u8]) -> Vec<u8> {
        let mut message = build_message(BINARY_SOURCE_ID, command, [0; 6], payload);
        message[7] = unit_id;
        let checksum = binary_checksum(&message[..22]);
        message[22..24].copy_from_slice(&checksum.to_le_bytes());
        message
    }

    #[test]
    fn test_write_float_value_bytes() {
        let message =
            build_write_operand_request(1, OperandKind::MF, 3, OperandValue::F32(12.5)).unwrap();
        let payload = &message[BINARY_HEADER_SIZE..message.len() - BINARY_FOOTER_SIZE];
        let le = 12.5f32.to_le_bytes();
        assert_eq!(&payload[8..12], &[le[1], le[0], le[3], le[2]]);
    }

    #[test]
    fn test_write_request_layout() {
        let message =
            build_write_operand_request(5, OperandKind::SDW, 0x0102, OperandValue::U32(7)).unwrap();
        assert_eq!(message[12], CMD_READ_WRITE_OPERANDS);
        assert_eq!(&message[14..20], &[0, 0, 1, 0, 0, 0]);
        assert_eq!(
            &message[24..36],
            &[0, 0, 1, 0, 36, 1, 0x02, 0x01, 7, 0, 0, 0]
        );
        assert_eq!(*message.last().unwrap(), b'\\');
    }

    #[test]
    fn test_write_bool_is_padded() {
        assert_eq!(encode_value(OperandKind::MB, true.into()).unwrap(), vec![1, 0]);
        assert_eq!(
            encode_value(OperandKind::TimerPreset, OperandValue::DurationMs(1230)).unwrap(),
            vec![123, 0, 0, 0]
        );
    }

    #[test]
    fn test_write_unsupported_kind() {
        assert!(matches!(
            build_write_operand_request(1, OperandKind::Input, 0, true.into()),
            Err(PcomError::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn test_write_acknowledgement() {
        let ok = response(1, CMD_READ_WRITE_OPERANDS, &[0, 0, 0, 0]);
        assert!(unpack_write_operand_response(1, &ok).is_ok());

        let bad = response(1, CMD_READ_WRITE_OPERANDS, &[0, 0, 1, 0]);
        assert_eq!(
            unpack_write_operand_response(1, &bad).unwrap_err().category(),
            ErrorCategory::ValueDecode
        );
    }

    #[test]
    fn test_read_request_layout() {
        let request = BinaryReadRequest::new(vec![
            ReadBlock::NonVectorial {
                kind: OperandKind::MI,
                addresses: vec![4, 9],
            },
            ReadBlock::Vectorial {
                kind: OperandKind::MB,
                start: 100,
                count: 16,
            },
        ])
        .unwrap();

        // MB (code 1) sorts before MI (code 3)
        assert_eq!(request.blocks()[0].kind(), OperandKind::MB);

        let message = request.build(2);
        assert_eq!(message[12], CMD_READ_OPERANDS);
        assert_eq!(&message[14..20], &[0, 0, 0, 0, 2, 0]);
        assert_eq!(
            &message[24..message.len() - 3],
            &[
                2, 0, 0, 0, // block counts
                16, 0, 0x81, 0xFF, 100, 0, // MB vectorial
                2, 0, 3, 0xFF, 4, 0, 9, 0, // MI list
            ]
        );
    }

    #[test]
    fn test_read_request_rejects_bad_blocks() {
        assert!(BinaryReadRequest::new(vec![ReadBlock::NonVectorial {
            kind: OperandKind::MB,
            addresses: vec![1],
        }])
        .is_err());
        assert!(BinaryReadRequest::new(vec![ReadBlock::NonVectorial {
            kind: OperandKind::MI,
            addresses: vec![],
        }])
        .is_err());
        assert!(BinaryReadRequest::new(vec![ReadBlock::Vectorial {
            kind: OperandKind::InputForce,
            start: 0,
            count: 8,
        }])
        .is_err());
    }

    #[test]
    fn test_response_layout_alignment() {
        let blocks = vec![
            ReadBlock::Vectorial {
                kind: OperandKind::MB,
                start: 0,
                count: 8,
            },
            ReadBlock::NonVectorial {
                kind: OperandKind::MI,
                addresses: vec![0, 1],
            },
        ];
        // 1 bit byte, 1 pad byte, 2 x 2 bytes
        assert_eq!(response_payload_len(&blocks), 6);
        assert_eq!(request_payload_len(&blocks), 4 + 6 + 8);
        assert_eq!(response_budget_len(&blocks), 6);
    }

    #[test]
    fn test_response_budget_rounds_odd_tail() {
        let blocks = vec![
            ReadBlock::NonVectorial {
                kind: OperandKind::MI,
                addresses: vec![0],
            },
            ReadBlock::Vectorial {
                kind: OperandKind::Input,
                start: 0,
                count: 24,
            },
        ];
        assert_eq!(response_payload_len(&blocks), 5);
        assert_eq!(response_budget_len(&blocks), 6);
    }

    #[test]
    fn test_read_unpack_mixed() {
        let request = BinaryReadRequest::new(vec![
            ReadBlock::Vectorial {
                kind: OperandKind::MB,
                start: 10,
                count: 8,
            },
            ReadBlock::NonVectorial {
                kind: OperandKind::MI,
                addresses: vec![3, 4],
            },
            ReadBlock::NonVectorial {
                kind: OperandKind::MF,
                addresses: vec![0],
            },
        ])
        .unwrap();

        let mut payload = vec![0b0000_0101, 0x00];
        payload.extend_from_slice(&(-7i16).to_le_bytes());
        payload.extend_from_slice(&300i16.to_le_bytes());
        payload.extend_from_slice(&float_to_wire(2.5));

        let values = request
            .unpack(1, &response(1, CMD_READ_OPERANDS, &payload))
            .unwrap();

        assert_eq!(values.len(), 11);
        assert_eq!(values[0], (OperandAddress::new(OperandKind::MB, 10), OperandValue::Bool(true)));
        assert_eq!(values[1].1, OperandValue::Bool(false));
        assert_eq!(values[2].1, OperandValue::Bool(true));
        assert_eq!(values[8], (OperandAddress::new(OperandKind::MI, 3), OperandValue::I16(-7)));
        assert_eq!(values[9].1, OperandValue::I16(300));
        assert_eq!(values[10], (OperandAddress::new(OperandKind::MF, 0), OperandValue::F32(2.5)));
    }

    #[test]
    fn test_read_unpack_timer_and_long() {
        let request = BinaryReadRequest::new(vec![
            ReadBlock::NonVectorial {
                kind: OperandKind::ML,
                addresses: vec![1],
            },
            ReadBlock::NonVectorial {
                kind: OperandKind::TimerCurrent,
                addresses: vec![2],
            },
        ])
        .unwrap();

        let mut payload = (-100_000i32).to_le_bytes().to_vec();
        payload.extend_from_slice(&250u32.to_le_bytes());
        let values = request
            .unpack(1, &response(1, CMD_READ_OPERANDS, &payload))
            .unwrap();
        assert_eq!(values[0].1, OperandValue::I32(-100_000));
        assert_eq!(values[1].1, OperandValue::DurationMs(2500));
    }

    #[test]
    fn test_read_unpack_short_payload() {
        let request = BinaryReadRequest::new(vec![ReadBlock::NonVectorial {
            kind: OperandKind::DW,
            addresses: vec![1, 2],
        }])
        .unwrap();
        let err = request
            .unpack(1, &response(1, CMD_READ_OPERANDS, &[0; 6]))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ValueDecode);
    }

    #[test]
    fn test_vectorial_decode_tail_of_address_space() {
        let request = BinaryReadRequest::new(vec![ReadBlock::Vectorial {
            kind: OperandKind::XB,
            start: 65530,
            count: 8,
        }])
        .unwrap();
        let values = request
            .unpack(1, &response(1, CMD_READ_OPERANDS, &[0xFF, 0]))
            .unwrap();
        assert_eq!(values.len(), 6);
        assert_eq!(values.last().unwrap().0.address, 65535);
    }

    #[test]
    fn test_unpack_message_validation() {
        let good = response(4, CMD_READ_OPERANDS, &[1, 2]);
        assert_eq!(unpack_message(4, CMD_READ_OPERANDS, &good).unwrap(), &[1, 2]);

        assert!(matches!(
            unpack_message(5, CMD_READ_OPERANDS, &good),
            Err(PcomError::UnitIdMismatch { expected: 5, received: 4 })
        ));
        assert!(matches!(
            unpack_message(4, CMD_READ_WRITE_OPERANDS, &good),
            Err(PcomError::CommandMismatch { .. })
        ));

        let mut bad_stx = good.clone();
        bad_stx[0] = b'?';
        assert!(matches!(
            unpack_message(4, CMD_READ_OPERANDS, &bad_stx),
            Err(PcomError::InvalidStx { .. })
        ));

        assert_eq!(
            unpack_message(4, CMD_READ_OPERANDS, b"/_OPLC\\").unwrap_err().category(),
            ErrorCategory::Framing
        );
    }

    #[test]
    fn test_masked_command_is_accepted() {
        let mut message = response(4, CMD_READ_OPERANDS + 0x80, &[]);
        assert!(unpack_message(4, CMD_READ_OPERANDS, &message).is_ok());
        message[12] = CMD_READ_OPERANDS + 1;
        let checksum = binary_checksum(&message[..22]);
        message[22..24].copy_from_slice(&checksum.to_le_bytes());
        assert!(unpack_message(4, CMD_READ_OPERANDS, &message).is_err());
    }

    #[test]
    fn test_corrupted_terminator_is_framing_error() {
        let mut message = response(1, CMD_READ_OPERANDS, &[9, 9, 9, 9]);
        *message.last_mut().unwrap() = b'/';
        let err = unpack_message(1, CMD_READ_OPERANDS, &message).unwrap_err();
        assert!(matches!(err, PcomError::InvalidEtx { .. }));
        assert_eq!(err.category(), ErrorCategory::Framing);
    }

    #[test]
    fn test_request_checksums_verify() {
        let message =
            build_write_operand_request(7, OperandKind::ML, 1, OperandValue::I32(5)).unwrap();
        let header = BinaryHeader::from_bytes(&message).unwrap();
        let length = usize::from(header.length);
        let payload = &message[24..24 + length];
        assert_eq!(
            u16::from_le_bytes([message[24 + length], message[25 + length]]),
            binary_checksum(payload)
        );
    }

    proptest! {
        #[test]
        fn prop_single_byte_tamper_is_checksum_error(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
        ) {
            let message = response(3, CMD_READ_OPERANDS, &payload);
            prop_assert!(unpack_message(3, CMD_READ_OPERANDS, &message).is_ok());

            // every byte between the start marker and the terminator
            let position = 6 + index.index(message.len() - 7);
            let mut tampered = message.clone();
            tampered[position] ^= 0xFF;
            let err = unpack_message(3, CMD_READ_OPERANDS, &tampered).unwrap_err();
            prop_assert_eq!(err.category(), ErrorCategory::Checksum);
        }

        #[test]
        fn prop_vectorial_decode_matches_bits(
            start in 0u16..60000,
            bits in proptest::collection::vec(any::<bool>(), 1..=248),
        ) {
            let count = (bits.len().div_ceil(8) * 8) as u16;
            let request = BinaryReadRequest::new(vec![ReadBlock::Vectorial {
                kind: OperandKind::MB,
                start,
                count,
            }])
            .unwrap();

            let mut padded = bits.clone();
            padded.resize(usize::from(count), false);
            let mut payload = pack_bits(&padded);
            if payload.len() % 2 == 1 {
                payload.push(0);
            }

            let values = request
                .unpack(1, &response(1, CMD_READ_OPERANDS, &payload))
                .unwrap();
            prop_assert_eq!(values.len(), usize::from(count));
            for (index, (operand, value)) in values.iter().enumerate() {
                prop_assert_eq!(operand.address, start + index as u16);
                prop_assert_eq!(*value, OperandValue::Bool(padded[index]));
            }
        }
    }
}
