//! SQLite dialect.

use super::{common, Dialect, DialectKind};
use crate::error::Result;
use crate::schema::{Column, SqlType, Value};
use crate::tracking::TrackingColumn;

/// SQLite.
///
/// SQLite cannot alter, rename or drop columns, so any such change is applied
/// by rebuilding the table. Databases are files created on first connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn native_type(&self, sql_type: SqlType, _size: u32, _scale: u32) -> String {
        match sql_type {
            SqlType::Char
            | SqlType::String
            | SqlType::Date
            | SqlType::Time
            | SqlType::DateTime
            | SqlType::Guid => "TEXT",
            SqlType::Int16 | SqlType::Int32 | SqlType::Int64 | SqlType::Boolean => "INTEGER",
            SqlType::Decimal => "NUMERIC",
            SqlType::Double => "REAL",
            SqlType::Binary => "BLOB",
        }
        .to_string()
    }

    fn native_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => common::float_literal(*f),
            Value::Decimal(d) => d.clone(),
            Value::Text(s) => common::quote_string(s),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bytes(b) => format!("X'{}'", hex::encode_upper(b)),
            Value::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    fn primary_key_clause(&self, column: &Column) -> &'static str {
        if column.auto_increment {
            "PRIMARY KEY AUTOINCREMENT"
        } else {
            "PRIMARY KEY"
        }
    }

    fn can_add_column(&self, column: &Column) -> bool {
        // ADD COLUMN takes no key, no REFERENCES with a non-NULL default
        // and only constant defaults.
        !column.primary_key
            && column.reference.is_none()
            && column.fill_value().map_or(true, |v| v.is_constant())
    }

    fn add_column_clause(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        if !self.can_add_column(column) {
            return Err(self.unsupported("ADD COLUMN"));
        }
        let fill = column.fill_value();
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            common::column_definition(self, table, column, fill.as_ref(), false)
        )])
    }

    fn modify_column_clause(
        &self,
        _table: &str,
        _column: &Column,
        _previous: &TrackingColumn,
    ) -> Result<Vec<String>> {
        Err(self.unsupported("ALTER COLUMN"))
    }

    fn disable_foreign_keys(&self) -> Vec<String> {
        // legacy_alter_table keeps other tables' references pointing at the
        // original name while the live table is renamed aside.
        vec![
            "PRAGMA foreign_keys = OFF".to_string(),
            "PRAGMA legacy_alter_table = ON".to_string(),
        ]
    }

    fn enable_foreign_keys(&self) -> Vec<String> {
        vec![
            "PRAGMA legacy_alter_table = OFF".to_string(),
            "PRAGMA foreign_keys = ON".to_string(),
        ]
    }

    fn begin_transaction(&self) -> Option<&'static str> {
        Some("BEGIN TRANSACTION")
    }

    fn table_exists_query(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
            common::quote_string(table)
        )
    }

    fn create_database_clause(&self, _database: &str) -> Option<String> {
        None
    }
}
