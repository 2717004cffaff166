//! Engine-neutral SQL types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Logical column types understood by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Fixed-length character string.
    Char,
    /// Variable-length character string. Size 0 means unbounded.
    String,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Exact decimal; size is the precision.
    Decimal,
    /// Double-precision floating point.
    Double,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without zone.
    DateTime,
    /// Binary data. Size 0 means unbounded.
    Binary,
    /// 128-bit identifier.
    Guid,
    /// Boolean flag.
    Boolean,
}

impl SqlType {
    /// All logical types, in declaration order.
    pub const ALL: [SqlType; 13] = [
        SqlType::Char,
        SqlType::String,
        SqlType::Int16,
        SqlType::Int32,
        SqlType::Int64,
        SqlType::Decimal,
        SqlType::Double,
        SqlType::Date,
        SqlType::Time,
        SqlType::DateTime,
        SqlType::Binary,
        SqlType::Guid,
        SqlType::Boolean,
    ];

    /// Canonical name, as stored in the tracking catalog.
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Char => "char",
            SqlType::String => "string",
            SqlType::Int16 => "int16",
            SqlType::Int32 => "int32",
            SqlType::Int64 => "int64",
            SqlType::Decimal => "decimal",
            SqlType::Double => "double",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::DateTime => "datetime",
            SqlType::Binary => "binary",
            SqlType::Guid => "guid",
            SqlType::Boolean => "boolean",
        }
    }

    /// Check if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, SqlType::Int16 | SqlType::Int32 | SqlType::Int64)
    }

    /// Check if this type is a character type.
    pub fn is_character(&self) -> bool {
        matches!(self, SqlType::Char | SqlType::String)
    }

    /// Check if this type is a date or time type.
    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::DateTime)
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlType {
    type Err = Error;

    /// Parse a logical type name. Common SQL spellings are accepted as aliases.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let ty = match normalized.as_str() {
            "char" | "fixedstring" | "nchar" => SqlType::Char,
            "string" | "varchar" | "nvarchar" | "text" => SqlType::String,
            "int16" | "smallint" | "short" => SqlType::Int16,
            "int32" | "int" | "integer" => SqlType::Int32,
            "int64" | "bigint" | "long" => SqlType::Int64,
            "decimal" | "numeric" => SqlType::Decimal,
            "double" | "float" => SqlType::Double,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::DateTime,
            "binary" | "blob" | "bytes" => SqlType::Binary,
            "guid" | "uuid" => SqlType::Guid,
            "boolean" | "bool" | "bit" => SqlType::Boolean,
            _ => return Err(Error::unsupported_type(s)),
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_names() {
        for ty in SqlType::ALL {
            assert_eq!(ty.name().parse::<SqlType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("VARCHAR".parse::<SqlType>().unwrap(), SqlType::String);
        assert_eq!(" bigint ".parse::<SqlType>().unwrap(), SqlType::Int64);
        assert_eq!("uuid".parse::<SqlType>().unwrap(), SqlType::Guid);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "NotARealType".parse::<SqlType>().unwrap_err();
        match err {
            Error::UnsupportedType { type_name } => assert_eq!(type_name, "NotARealType"),
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn test_type_groups() {
        assert!(SqlType::Int16.is_integer());
        assert!(!SqlType::Decimal.is_integer());
        assert!(SqlType::Char.is_character());
        assert!(SqlType::DateTime.is_temporal());
        assert!(!SqlType::Guid.is_temporal());
    }
}
