//! Typed operand values.
//!
//! [`OperandValue`] is the single value type for reads and writes. Writes go
//! through [`OperandValue::coerce`], which converts into the value type of the
//! target [`OperandKind`] and reports any narrowing failure instead of
//! substituting a default.

use std::fmt;
use std::time::Duration;

use crate::error::{PcomError, Result};
use crate::operand::{OperandKind, ValueType};

/// Largest timer value a controller stores, in milliseconds.
pub const MAX_TIMER_MS: u32 = 359_999_990;

/// Clamps a timer value and converts it to the 10 ms ticks on the wire.
pub(crate) fn timer_to_ticks(ms: u32) -> u32 {
    ms.min(MAX_TIMER_MS) / 10
}

/// Converts wire ticks back to milliseconds.
pub(crate) fn ticks_to_timer(ticks: u32) -> u32 {
    ticks.saturating_mul(10)
}

/// Value of one operand.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandValue {
    /// Bit value.
    Bool(bool),
    /// Signed 16-bit value.
    I16(i16),
    /// Signed 32-bit value.
    I32(i32),
    /// Unsigned 32-bit value.
    U32(u32),
    /// Float value.
    F32(f32),
    /// Timer value in milliseconds.
    DurationMs(u32),
}

impl OperandValue {
    /// Value type of this variant.
    pub fn value_type(&self) -> ValueType {
        match self {
            OperandValue::Bool(_) => ValueType::Bool,
            OperandValue::I16(_) => ValueType::I16,
            OperandValue::I32(_) => ValueType::I32,
            OperandValue::U32(_) => ValueType::U32,
            OperandValue::F32(_) => ValueType::F32,
            OperandValue::DurationMs(_) => ValueType::DurationMs,
        }
    }

    /// Converts this value into the value type of `kind`.
    ///
    /// Integers convert between widths only when the value fits. Floats
    /// convert to integers only when they are finite and integral. Booleans
    /// accept exactly 0 and 1.
    ///
    /// # Errors
    ///
    /// Returns `PcomError::InvalidParameter` when the value cannot be
    /// represented.
    ///
    /// # Example
    ///
    /// ```
    /// use unitronics_pcom::{OperandKind, OperandValue};
    ///
    /// let value = OperandValue::I32(1200).coerce(OperandKind::MI).unwrap();
    /// assert_eq!(value, OperandValue::I16(1200));
    /// assert!(OperandValue::I32(70000).coerce(OperandKind::MI).is_err());
    /// ```
    pub fn coerce(self, kind: OperandKind) -> Result<OperandValue> {
        let target = kind.value_type();
        let converted = match target {
            ValueType::Bool => match self {
                OperandValue::Bool(value) => Some(value),
                other => match other.as_integer() {
                    Some(0) => Some(false),
                    Some(1) => Some(true),
                    _ => None,
                },
            }
            .map(OperandValue::Bool),
            ValueType::I16 => self
                .as_integer()
                .and_then(|v| i16::try_from(v).ok())
                .map(OperandValue::I16),
            ValueType::I32 => self
                .as_integer()
                .and_then(|v| i32::try_from(v).ok())
                .map(OperandValue::I32),
            ValueType::U32 => self
                .as_integer()
                .and_then(|v| u32::try_from(v).ok())
                .map(OperandValue::U32),
            ValueType::DurationMs => self
                .as_integer()
                .and_then(|v| u32::try_from(v).ok())
                .map(OperandValue::DurationMs),
            ValueType::F32 => match self {
                OperandValue::F32(value) => Some(value),
                OperandValue::Bool(_) => None,
                other => other.as_integer().and_then(|v| {
                    let value = v as f32;
                    (value as i64 == v).then_some(value)
                }),
            }
            .map(OperandValue::F32),
        };

        converted.ok_or_else(|| {
            PcomError::invalid_parameter(
                "value",
                format!("{self} cannot be represented as a {kind} value"),
            )
        })
    }

    /// Integral view of the value, if it has one.
    fn as_integer(&self) -> Option<i64> {
        match *self {
            OperandValue::Bool(value) => Some(i64::from(value)),
            OperandValue::I16(value) => Some(i64::from(value)),
            OperandValue::I32(value) => Some(i64::from(value)),
            OperandValue::U32(value) | OperandValue::DurationMs(value) => Some(i64::from(value)),
            OperandValue::F32(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
                    Some(value as i64)
                } else {
                    None
                }
            }
        }
    }

    /// Returns the boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OperandValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float, if this is an `F32`.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OperandValue::F32(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the timer value, if this is a `DurationMs`.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            OperandValue::DurationMs(ms) => Some(Duration::from_millis(u64::from(*ms))),
            _ => None,
        }
    }
}

impl fmt::Display for OperandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandValue::Bool(value) => write!(f, "{value}"),
            OperandValue::I16(value) => write!(f, "{value}"),
            OperandValue::I32(value) => write!(f, "{value}"),
            OperandValue::U32(value) => write!(f, "{value}"),
            OperandValue::F32(value) => write!(f, "{value}"),
            OperandValue::DurationMs(value) => write!(f, "{value}ms"),
        }
    }
}

impl From<bool> for OperandValue {
    fn from(value: bool) -> Self {
        OperandValue::Bool(value)
    }
}

impl From<i16> for OperandValue {
    fn from(value: i16) -> Self {
        OperandValue::I16(value)
    }
}

impl From<i32> for OperandValue {
    fn from(value: i32) -> Self {
        OperandValue::I32(value)
    }
}

impl From<u32> for OperandValue {
    fn from(value: u32) -> Self {
        OperandValue::U32(value)
    }
}

impl From<f32> for OperandValue {
    fn from(value: f32) -> Self {
        OperandValue::F32(value)
    }
}

impl From<Duration> for OperandValue {
    /// Durations beyond `u32::MAX` milliseconds saturate; writes clamp further.
    fn from(value: Duration) -> Self {
        OperandValue::DurationMs(u32::try_from(value.as_millis()).unwrap_or(u32::MAX))
    }
}

macro_rules! impl_try_from_value {
    ($target:ty, $variant:ident) => {
        impl TryFrom<OperandValue> for $target {
            type Error = PcomError;

            fn try_from(value: OperandValue) -> Result<Self> {
                match value {
                    OperandValue::$variant(inner) => Ok(inner),
                    other => Err(PcomError::value_decode(format!(
                        "expected {} value, found {:?}",
                        stringify!($variant),
                        other
                    ))),
                }
            }
        }
    };
}

impl_try_from_value!(bool, Bool);
impl_try_from_value!(i16, I16);
impl_try_from_value!(i32, I32);
impl_try_from_value!(f32, F32);

impl TryFrom<OperandValue> for u32 {
    type Error = PcomError;

    fn try_from(value: OperandValue) -> Result<Self> {
        match value {
            OperandValue::U32(inner) | OperandValue::DurationMs(inner) => Ok(inner),
            other => Err(PcomError::value_decode(format!(
                "expected U32 value, found {other:?}"
            ))),
        }
    }
}

impl TryFrom<OperandValue> for Duration {
    type Error = PcomError;

    fn try_from(value: OperandValue) -> Result<Self> {
        value.as_duration().ok_or_else(|| {
            PcomError::value_decode(format!("expected DurationMs value, found {value:?}"))
        })
    }
}
