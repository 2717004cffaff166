//! Column definitions.

use super::hash::{SchemaHash, StructuralHasher};
use super::types::SqlType;
use super::value::Value;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A by-name link to another table's column, written `table:column`.
///
/// The referenced table is not required to exist when the reference is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

impl ColumnRef {
    /// Create a reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse the `table:column` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (table, column) = s.split_once(':')?;
        let (table, column) = (table.trim(), column.trim());
        if table.is_empty() || column.is_empty() || column.contains(':') {
            return None;
        }
        Some(Self::new(table, column))
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table, self.column)
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        ColumnRef::parse(&value).ok_or_else(|| format!("invalid reference '{}'", value))
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

fn default_nullable() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// A column definition within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Logical type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Length for character/binary types, precision for decimals.
    #[serde(default)]
    pub size: u32,
    /// Scale for decimals.
    #[serde(default)]
    pub scale: u32,
    /// Whether NULL is allowed.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<Value>,
    /// Whether a unique index covers this column.
    #[serde(default)]
    pub unique: bool,
    /// Whether a plain index covers this column.
    #[serde(default)]
    pub indexed: bool,
    /// Whether this is the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether key values are generated by the engine.
    #[serde(default)]
    pub auto_increment: bool,
    /// Foreign-key reference.
    #[serde(default)]
    pub reference: Option<ColumnRef>,
    /// Declared version. Bumping it forces the column to be re-applied.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Names this column had before, oldest first.
    #[serde(default)]
    pub previous_names: Vec<String>,
}

impl Column {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size: 0,
            scale: 0,
            nullable: true,
            default: None,
            unique: false,
            indexed: false,
            primary_key: false,
            auto_increment: false,
            reference: None,
            version: 1,
            previous_names: Vec::new(),
        }
    }

    /// Create a column from a logical type name.
    pub fn from_type_name(
        name: impl Into<String>,
        type_name: &str,
        size: u32,
        scale: u32,
    ) -> Result<Self> {
        let sql_type = type_name.parse()?;
        Ok(Self::new(name, sql_type).sized(size).with_scale(scale))
    }

    /// Set the size (length or precision).
    pub fn sized(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the decimal scale.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Default to the engine's current timestamp.
    pub fn default_now(mut self) -> Self {
        self.default = Some(Value::CurrentTimestamp);
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as indexed.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Mark as engine-generated.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Reference another table's column.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.reference = Some(ColumnRef::new(table, column));
        self
    }

    /// Set the declared version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Record a former name of this column.
    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.previous_names.push(previous.into());
        self
    }

    /// Structural hash over type, size, scale, nullability, default,
    /// uniqueness, index, key, auto-increment and reference.
    ///
    /// The name and version are not part of the hash.
    pub fn hash(&self) -> SchemaHash {
        let default = self.default.as_ref().map(Value::canonical);
        let reference = self.reference.as_ref().map(ColumnRef::to_string);

        StructuralHasher::new("column")
            .str(self.sql_type.name())
            .u64(self.size as u64)
            .u64(self.scale as u64)
            .bool(self.nullable)
            .opt_str(default.as_deref())
            .bool(self.unique)
            .bool(self.indexed)
            .bool(self.primary_key)
            .bool(self.auto_increment)
            .opt_str(reference.as_deref())
            .finish()
    }

    /// Whether rows can be inserted without supplying this column.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The default applied when this column is added to a populated table.
    ///
    /// NOT NULL columns without a declared default get the type's zero value.
    pub fn fill_value(&self) -> Option<Value> {
        match &self.default {
            Some(value) => Some(value.clone()),
            None if !self.nullable => Some(Value::zero_for(self.sql_type)),
            None => None,
        }
    }

    /// Check if this column is known under `name`, currently or historically.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.previous_names.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Column {
        Column::new("v2_string", SqlType::String)
            .sized(150)
            .unique()
            .indexed()
    }

    #[test]
    fn test_column_builder() {
        let column = Column::new("id", SqlType::Int64).not_null().auto_increment();
        assert_eq!(column.name, "id");
        assert!(!column.nullable);
        assert!(column.auto_increment);
        assert_eq!(column.version, 1);
    }

    #[test]
    fn test_from_type_name() {
        let column = Column::from_type_name("amount", "decimal", 18, 4).unwrap();
        assert_eq!(column.sql_type, SqlType::Decimal);
        assert_eq!((column.size, column.scale), (18, 4));

        let err = Column::from_type_name("x", "NotARealType", 0, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
    }

    #[test]
    fn test_hash_ignores_name_and_version() {
        let a = base();
        let b = Column {
            name: "renamed".into(),
            version: 9,
            previous_names: vec!["v2_string".into()],
            ..base()
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_changes_with_each_attribute() {
        let original = base().hash();
        let variants = vec![
            Column {
                sql_type: SqlType::Char,
                ..base()
            },
            base().sized(200),
            base().with_scale(2),
            base().not_null(),
            base().with_default("x"),
            Column {
                unique: false,
                ..base()
            },
            Column {
                indexed: false,
                ..base()
            },
            Column {
                primary_key: true,
                ..base()
            },
            base().auto_increment(),
            base().references("sample_t2", "id"),
        ];

        for variant in variants {
            assert_ne!(variant.hash(), original, "{variant:?}");
        }
    }

    #[test]
    fn test_column_ref_parse() {
        assert_eq!(
            ColumnRef::parse("sample_t2:id"),
            Some(ColumnRef::new("sample_t2", "id"))
        );
        assert!(ColumnRef::parse("sample_t2").is_none());
        assert!(ColumnRef::parse(":id").is_none());
        assert!(ColumnRef::parse("a:b:c").is_none());
    }

    #[test]
    fn test_fill_value() {
        assert_eq!(Column::new("a", SqlType::Int32).fill_value(), None);
        assert_eq!(
            Column::new("a", SqlType::Int32).not_null().fill_value(),
            Some(Value::Int(0))
        );
        assert_eq!(
            Column::new("a", SqlType::Int32).not_null().with_default(5).fill_value(),
            Some(Value::Int(5))
        );
    }

    #[test]
    fn test_answers_to() {
        let column = Column::new("v3", SqlType::Int32).renamed_from("v1").renamed_from("v2");
        assert!(column.answers_to("v3"));
        assert!(column.answers_to("v1"));
        assert!(!column.answers_to("v4"));
    }
}
