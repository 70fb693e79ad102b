//! Protocol A (PCOM ASCII) codec.
//!
//! A Protocol A message is printable ASCII:
//!
//! ```text
//! request:  "/"  + hex2(unit) + command + detail + hex2(checksum) + "\r"
//! response: "/A" + hex2(unit) + command[..2] + payload + hex2(checksum) + "\r"
//! ```
//!
//! The checksum is the byte sum of everything between the start marker and
//! the checksum field, modulo 256. This module builds requests and unpacks
//! responses; it never touches a socket.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::pcom_a;
//!
//! let request = pcom_a::build_identification_request(1);
//! assert_eq!(request, b"/01IDEE\r");
//! ```

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::checksum::ascii_checksum;
use crate::error::{ChecksumScope, PcomError, Result};
use crate::header::Protocol;
use crate::model::{ControllerModel, ControllerProfile, Version};
use crate::operand::{OperandKind, ValueType};
use crate::utils::{float_from_wire, float_to_wire, parse_hex, push_hex};
use crate::value::{ticks_to_timer, timer_to_ticks, OperandValue};

/// Start marker of a request.
pub const REQUEST_STX: &str = "/";

/// Start marker of a response.
pub const RESPONSE_STX: &str = "/A";

/// Terminator of every message.
pub const ETX: u8 = b'\r';

/// Largest number of operands one read request may cover.
pub const MAX_READ_COUNT: usize = 255;

/// Response bytes that are not payload: `/A`, unit, command, checksum, terminator.
pub const RESPONSE_OVERHEAD: usize = 2 + 2 + 2 + 2 + 1;

pub(crate) const CMD_IDENTIFICATION: &str = "ID";
pub(crate) const CMD_READ_CLOCK: &str = "RC";
pub(crate) const CMD_WRITE_CLOCK: &str = "SC";

const CLOCK_DIGITS: usize = 14;

/// A decoded Protocol A frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    /// Unit id.
    pub unit_id: u8,
    /// Command mnemonic.
    pub command: String,
    /// Command detail or response payload.
    pub detail: String,
}

/// Encodes a frame with the given start marker.
pub fn encode_frame(stx: &str, unit_id: u8, command: &str, detail: &str) -> Vec<u8> {
    let mut body = String::with_capacity(4 + command.len() + detail.len());
    push_hex(&mut body, u32::from(unit_id), 2);
    body.push_str(command);
    body.push_str(detail);
    let checksum = ascii_checksum(body.as_bytes());

    let mut message = String::with_capacity(stx.len() + body.len() + 3);
    message.push_str(stx);
    message.push_str(&body);
    push_hex(&mut message, u32::from(checksum), 2);
    message.push(ETX as char);
    message.into_bytes()
}

/// Decodes a frame, validating markers and checksum.
///
/// `command_len` is the number of characters of the command field. Checks
/// run in wire order: start marker, terminator, length, then checksum, so a
/// damaged marker is always reported as a framing error.
pub fn decode_frame(stx: &str, message: &[u8], command_len: usize) -> Result<AsciiFrame> {
    let protocol = Protocol::PcomA;

    if !message.starts_with(stx.as_bytes()) {
        return Err(PcomError::InvalidStx { protocol });
    }

    if message.last() != Some(&ETX) {
        return Err(PcomError::InvalidEtx { protocol });
    }

    let minimum = stx.len() + 2 + command_len + 2 + 1;
    if message.len() < minimum {
        return Err(PcomError::framing(
            protocol,
            format!(
                "message too short: expected at least {} bytes, got {}",
                minimum,
                message.len()
            ),
        ));
    }

    let checksum_at = message.len() - 3;
    let body = &message[stx.len()..checksum_at];
    let received = std::str::from_utf8(&message[checksum_at..checksum_at + 2])
        .ok()
        .and_then(parse_hex)
        .ok_or_else(|| PcomError::framing(protocol, "checksum field is not hex"))?;
    let expected = ascii_checksum(body);
    if u32::from(expected) != received {
        return Err(PcomError::checksum(
            protocol,
            ChecksumScope::Message,
            u16::from(expected),
            received as u16,
        ));
    }

    let body = std::str::from_utf8(body)
        .ok()
        .filter(|text| text.is_ascii())
        .ok_or_else(|| PcomError::framing(protocol, "message body is not ASCII"))?;

    let unit_id = parse_hex(&body[..2])
        .ok_or_else(|| PcomError::framing(protocol, "unit ID field is not hex"))?;

    Ok(AsciiFrame {
        unit_id: unit_id as u8,
        command: body[2..2 + command_len].to_string(),
        detail: body[2 + command_len..].to_string(),
    })
}

/// Builds a request message.
pub fn build_message(unit_id: u8, command: &str, detail: &str) -> Vec<u8> {
    encode_frame(REQUEST_STX, unit_id, command, detail)
}

/// Unpacks a response to `command`, returning its payload.
///
/// The response must come from `unit_id` and echo the first two characters
/// of `command`.
pub fn unpack_response(unit_id: u8, command: &str, message: &[u8]) -> Result<String> {
    let frame = decode_frame(RESPONSE_STX, message, 2)?;

    if frame.unit_id != unit_id {
        return Err(PcomError::UnitIdMismatch {
            expected: unit_id,
            received: frame.unit_id,
        });
    }

    let expected = command.get(..2).unwrap_or(command);
    if frame.command != expected {
        return Err(PcomError::command_mismatch(expected, frame.command));
    }

    Ok(frame.detail)
}

/// A contiguous Protocol A read of one operand kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiReadRequest {
    /// Operand kind.
    pub kind: OperandKind,
    /// First address.
    pub start: u16,
    /// Number of consecutive addresses, 1 to 255.
    pub count: u16,
}

impl AsciiReadRequest {
    /// Creates a read request.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` has no read command or `count` is out of range.
    pub fn new(kind: OperandKind, start: u16, count: u16) -> Result<Self> {
        if kind.ascii_read_command().is_none() {
            return Err(PcomError::UnsupportedOperand {
                kind,
                operation: "read",
                protocol: Protocol::PcomA,
            });
        }

        if count == 0 || usize::from(count) > MAX_READ_COUNT {
            return Err(PcomError::invalid_parameter(
                "count",
                format!("must be between 1 and {MAX_READ_COUNT}"),
            ));
        }

        if u32::from(start) + u32::from(count) - 1 > u32::from(u16::MAX) {
            return Err(PcomError::invalid_parameter(
                "count",
                format!("{start} + {count} exceeds address 65535"),
            ));
        }

        Ok(Self { kind, start, count })
    }

    fn command(&self) -> &'static str {
        self.kind.ascii_read_command().unwrap_or_default()
    }

    /// Payload characters of the expected response.
    pub fn response_payload_len(&self) -> usize {
        usize::from(self.count) * self.kind.ascii_width()
    }

    /// Builds the request message.
    pub fn build(&self, unit_id: u8) -> Vec<u8> {
        let mut detail = String::with_capacity(6);
        push_hex(&mut detail, u32::from(self.start), 4);
        push_hex(&mut detail, u32::from(self.count), 2);
        build_message(unit_id, self.command(), &detail)
    }

    /// Unpacks the response into `(address, value)` pairs in address order.
    pub fn unpack(&self, unit_id: u8, message: &[u8]) -> Result<Vec<(u16, OperandValue)>> {
        let payload = unpack_response(unit_id, self.command(), message)?;

        let expected = self.response_payload_len();
        if payload.len() < expected {
            return Err(PcomError::value_decode(format!(
                "{} read payload too short: expected {} characters, got {}",
                self.kind,
                expected,
                payload.len()
            )));
        }

        let width = self.kind.ascii_width();
        (0..self.count)
            .map(|offset| {
                let at = usize::from(offset) * width;
                let value = decode_value(self.kind, &payload[at..at + width])?;
                Ok((self.start + offset, value))
            })
            .collect()
    }
}

/// Decodes one hex-encoded value of `kind`.
pub fn decode_value(kind: OperandKind, text: &str) -> Result<OperandValue> {
    if text.len() != kind.ascii_width() {
        return Err(PcomError::value_decode(format!(
            "{kind} value '{text}' should be {} characters",
            kind.ascii_width()
        )));
    }

    let raw = parse_hex(text)
        .ok_or_else(|| PcomError::value_decode(format!("{kind} value '{text}' is not hex")))?;

    Ok(match kind.value_type() {
        ValueType::Bool => OperandValue::Bool(raw != 0),
        ValueType::I16 => OperandValue::I16(raw as u16 as i16),
        ValueType::I32 => OperandValue::I32(raw as i32),
        ValueType::U32 => OperandValue::U32(raw),
        ValueType::F32 => OperandValue::F32(float_from_wire(raw.to_be_bytes())),
        ValueType::DurationMs => OperandValue::DurationMs(ticks_to_timer(raw)),
    })
}

/// Encodes one value of `kind` as hex, after coercion.
pub fn encode_value(kind: OperandKind, value: OperandValue) -> Result<String> {
    let mut out = String::with_capacity(8);
    match value.coerce(kind)? {
        OperandValue::Bool(value) => push_hex(&mut out, u32::from(value), 1),
        OperandValue::I16(value) => push_hex(&mut out, u32::from(value as u16), 4),
        OperandValue::I32(value) => push_hex(&mut out, value as u32, 8),
        OperandValue::U32(value) => push_hex(&mut out, value, 8),
        OperandValue::F32(value) => push_hex(&mut out, u32::from_be_bytes(float_to_wire(value)), 8),
        OperandValue::DurationMs(ms) => push_hex(&mut out, timer_to_ticks(ms), 8),
    }
    Ok(out)
}

/// Builds a single-operand write.
pub fn build_write_operand_request(
    unit_id: u8,
    kind: OperandKind,
    address: u16,
    value: OperandValue,
) -> Result<Vec<u8>> {
    let command = write_command(kind)?;
    let mut detail = String::with_capacity(14);
    push_hex(&mut detail, u32::from(address), 4);
    push_hex(&mut detail, 1, 2);
    detail.push_str(&encode_value(kind, value)?);
    Ok(build_message(unit_id, command, &detail))
}

/// Validates the acknowledgement of a single-operand write.
pub fn unpack_write_operand_response(unit_id: u8, kind: OperandKind, message: &[u8]) -> Result<()> {
    unpack_response(unit_id, write_command(kind)?, message).map(|_| ())
}

fn write_command(kind: OperandKind) -> Result<&'static str> {
    kind.ascii_write_command()
        .ok_or(PcomError::UnsupportedOperand {
            kind,
            operation: "write",
            protocol: Protocol::PcomA,
        })
}

/// Controller identity decoded from an identification reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Raw model code, padding included.
    pub model_code: String,
    /// Model looked up from the code.
    pub model: ControllerModel,
    /// Firmware version.
    pub version: Version,
}

impl Identification {
    /// Capability profile for this controller.
    pub fn profile(&self) -> ControllerProfile {
        ControllerProfile::new(self.model, self.version)
    }
}

/// Fixed-width layout of an identification string.
struct IdLayout {
    model_len: usize,
    lengths: &'static [usize],
    markers: &'static [(usize, u8)],
    version: [(usize, usize); 3],
}

const ID_LAYOUTS: [IdLayout; 3] = [
    IdLayout {
        model_len: 4,
        lengths: &[40, 52],
        markers: &[(13, b'B'), (22, b'P'), (31, b'F')],
        version: [(5, 3), (8, 3), (11, 2)],
    },
    IdLayout {
        model_len: 6,
        lengths: &[42, 54],
        markers: &[(15, b'B'), (24, b'P'), (33, b'F')],
        version: [(7, 3), (10, 3), (13, 2)],
    },
    IdLayout {
        model_len: 4,
        lengths: &[10],
        markers: &[],
        version: [(5, 1), (6, 2), (8, 2)],
    },
];

impl IdLayout {
    fn matches(&self, text: &[u8]) -> bool {
        let Some(position) = self.lengths.iter().position(|len| *len == text.len()) else {
            return false;
        };

        let extended = position == 1;
        let suffix_ok = !extended || &text[self.lengths[0]..self.lengths[0] + 2] == b"FT";

        suffix_ok
            && self
                .markers
                .iter()
                .all(|(index, marker)| text[*index] == *marker)
    }
}

/// Builds the identification request.
pub fn build_identification_request(unit_id: u8) -> Vec<u8> {
    build_message(unit_id, CMD_IDENTIFICATION, "")
}

/// Unpacks an identification reply.
pub fn unpack_identification_response(unit_id: u8, message: &[u8]) -> Result<Identification> {
    let payload = unpack_response(unit_id, CMD_IDENTIFICATION, message)?;
    decode_identification(&payload)
}

/// Decodes an identification string.
///
/// Tries the old (4-character model), new (6-character model) and short
/// layouts in that order.
pub fn decode_identification(text: &str) -> Result<Identification> {
    let layout = ID_LAYOUTS
        .iter()
        .find(|layout| text.is_ascii() && layout.matches(text.as_bytes()))
        .ok_or_else(|| {
            PcomError::value_decode(format!("identification string '{text}' is not recognized"))
        })?;

    let field = |(start, len): (usize, usize)| -> Result<u16> {
        let raw = &text[start..start + len];
        raw.trim().parse::<u16>().map_err(|_| {
            PcomError::value_decode(format!("identification version field '{raw}' is not numeric"))
        })
    };

    let model_code = text[..layout.model_len].to_string();
    let version = Version::new(
        field(layout.version[0])?,
        field(layout.version[1])?,
        field(layout.version[2])?,
    );

    Ok(Identification {
        model: ControllerModel::from_code(&model_code),
        model_code,
        version,
    })
}

/// Builds the read-clock request.
pub fn build_read_clock_request(unit_id: u8) -> Vec<u8> {
    build_message(unit_id, CMD_READ_CLOCK, "")
}

/// Unpacks a read-clock reply.
pub fn unpack_read_clock_response(unit_id: u8, message: &[u8]) -> Result<NaiveDateTime> {
    let payload = unpack_response(unit_id, CMD_READ_CLOCK, message)?;

    if payload.len() != CLOCK_DIGITS || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PcomError::value_decode(format!(
            "clock payload '{payload}' should be {CLOCK_DIGITS} digits"
        )));
    }

    let pair = |index: usize| -> u32 {
        let bytes = payload.as_bytes();
        u32::from(bytes[index * 2] - b'0') * 10 + u32::from(bytes[index * 2 + 1] - b'0')
    };

    // ss mm hh ww dd MM yy; the weekday is implied by the date
    let (second, minute, hour) = (pair(0), pair(1), pair(2));
    let (day, month, year) = (pair(4), pair(5), 2000 + pair(6) as i32);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| PcomError::value_decode(format!("clock payload '{payload}' is not a valid date")))
}

/// Builds the write-clock request.
///
/// # Errors
///
/// Returns `PcomError::InvalidParameter` outside 2000-01-01 ..= 2099-12-31 23:59:59.
pub fn build_write_clock_request(unit_id: u8, clock: NaiveDateTime) -> Result<Vec<u8>> {
    if !(2000..=2099).contains(&clock.year()) {
        return Err(PcomError::invalid_parameter(
            "clock",
            format!("{clock} is outside the years 2000 to 2099"),
        ));
    }

    let detail = format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}{:02}",
        clock.second(),
        clock.minute(),
        clock.hour(),
        clock.weekday().number_from_sunday(),
        clock.day(),
        clock.month(),
        clock.year() % 100
    );

    Ok(build_message(unit_id, CMD_WRITE_CLOCK, &detail))
}

/// Validates a write-clock acknowledgement.
pub fn unpack_write_clock_response(unit_id: u8, message: &[u8]) -> Result<()> {
    unpack_response(unit_id, CMD_WRITE_CLOCK, message).map(|_| ())
}
