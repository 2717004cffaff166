//! Literal values used for column defaults and seed rows.

use super::types::SqlType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// An engine-neutral literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Exact decimal, kept as its textual form.
    Decimal(String),
    /// Character data.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time.
    DateTime(NaiveDateTime),
    /// Binary data.
    Bytes(Vec<u8>),
    /// The engine's current system date/time, evaluated at insert time.
    CurrentTimestamp,
}

impl Value {
    /// Deterministic textual form used for hashing and tracking records.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("bool:{}", b),
            Value::Int(i) => format!("int:{}", i),
            Value::Float(f) => format!("float:{:016x}", f.to_bits()),
            Value::Decimal(d) => format!("decimal:{}", d),
            Value::Text(s) => format!("text:{}", s),
            Value::Date(d) => format!("date:{}", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("time:{}", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => format!("datetime:{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bytes(b) => format!("bytes:{}", hex::encode(b)),
            Value::CurrentTimestamp => "current_timestamp".to_string(),
        }
    }

    /// Parse the form produced by [`Value::canonical`].
    pub fn from_canonical(s: &str) -> Option<Value> {
        match s {
            "null" => return Some(Value::Null),
            "current_timestamp" => return Some(Value::CurrentTimestamp),
            _ => {}
        }
        let (kind, body) = s.split_once(':')?;
        let value = match kind {
            "bool" => Value::Bool(body.parse().ok()?),
            "int" => Value::Int(body.parse().ok()?),
            "float" => Value::Float(f64::from_bits(u64::from_str_radix(body, 16).ok()?)),
            "decimal" => Value::Decimal(body.to_string()),
            "text" => Value::Text(body.to_string()),
            "date" => Value::Date(NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()?),
            "time" => Value::Time(NaiveTime::parse_from_str(body, "%H:%M:%S%.f").ok()?),
            "datetime" => {
                Value::DateTime(NaiveDateTime::parse_from_str(body, "%Y-%m-%d %H:%M:%S%.f").ok()?)
            }
            "bytes" => Value::Bytes(hex::decode(body).ok()?),
            _ => return None,
        };
        Some(value)
    }

    /// Whether the value can be written into a table definition as a constant.
    pub fn is_constant(&self) -> bool {
        !matches!(self, Value::CurrentTimestamp)
    }

    /// Check if this is the NULL literal.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The zero value for a type, used to backfill NOT NULL columns added to
    /// tables that already hold rows.
    pub fn zero_for(ty: SqlType) -> Value {
        match ty {
            SqlType::Char | SqlType::String => Value::Text(String::new()),
            SqlType::Int16 | SqlType::Int32 | SqlType::Int64 => Value::Int(0),
            SqlType::Decimal => Value::Decimal("0".to_string()),
            SqlType::Double => Value::Float(0.0),
            SqlType::Date | SqlType::DateTime | SqlType::Time => Value::CurrentTimestamp,
            SqlType::Binary => Value::Bytes(Vec::new()),
            SqlType::Guid => Value::Text("00000000-0000-0000-0000-000000000000".to_string()),
            SqlType::Boolean => Value::Bool(false),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
