//! Decoded cell values.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Int(i16),
    Long(i32),
    BigInt(i64),
    /// Currency in ten-thousandths of a unit.
    Currency(i64),
    Float(f32),
    Double(f64),
    DateTime(NaiveDateTime),
    Text(String),
    Binary(Vec<u8>),
    /// Braced upper-case GUID.
    Guid(String),
    /// Exact decimal rendered with its declared scale.
    Numeric(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the integral variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Currency(v) => f.write_str(&format_currency(*v)),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.3f")),
            Value::Text(v) | Value::Guid(v) | Value::Numeric(v) => f.write_str(v),
            Value::Binary(bytes) => bytes.iter().try_for_each(|b| write!(f, "{b:02x}")),
        }
    }
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Converts an OLE automation date (days since 1899-12-30).
///
/// The fractional part is the time of day even for negative values.
pub(crate) fn datetime_from_days(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let whole = days.trunc();
    let millis = ((days - whole).abs() * MILLIS_PER_DAY).round() as i64;
    epoch()?
        .checked_add_signed(TimeDelta::try_days(whole as i64)?)?
        .checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

#[cfg(any(test, feature = "test-util"))]
pub(crate) fn days_from_datetime(value: NaiveDateTime) -> f64 {
    let base = epoch().unwrap_or_default();
    (value - base).num_milliseconds() as f64 / MILLIS_PER_DAY
}

pub(crate) fn format_currency(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{sign}{}.{:04}", abs / 10_000, abs % 10_000)
}

/// Formats a 16-byte GUID; the first three groups are stored little-endian.
pub(crate) fn format_guid(b: &[u8; 16]) -> String {
    format!(
        "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        u16::from_le_bytes([b[4], b[5]]),
        u16::from_le_bytes([b[6], b[7]]),
        b[8],
        b[9],
        b[10],
        b[11],
        b[12],
        b[13],
        b[14],
        b[15]
    )
}

/// Formats a 17-byte exact numeric: sign byte, then four 32-bit words, most significant first.
pub(crate) fn format_numeric(bytes: &[u8; 17], scale: u8) -> String {
    let negative = bytes[0] & 0x80 != 0;
    let magnitude = bytes[1..]
        .chunks_exact(4)
        .fold(0u128, |acc, w| (acc << 32) | u128::from(u32::from_le_bytes([w[0], w[1], w[2], w[3]])));

    let digits = magnitude.to_string();
    let scale = usize::from(scale);
    let mut text = if scale == 0 {
        digits
    } else {
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        format!("{int}.{frac}")
    };
    if negative && magnitude != 0 {
        text.insert(0, '-');
    }
    text
}
