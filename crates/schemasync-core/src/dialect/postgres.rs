//! PostgreSQL dialect.

use super::{common, Dialect, DialectKind};
use crate::error::Result;
use crate::schema::{Column, SqlType, Table, Value};
use crate::tracking::TrackingColumn;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn native_type(&self, sql_type: SqlType, size: u32, scale: u32) -> String {
        match sql_type {
            SqlType::Char if size == 0 => "CHAR".to_string(),
            SqlType::Char => format!("CHAR({})", size),
            SqlType::String if size == 0 || size > 10_485_760 => "TEXT".to_string(),
            SqlType::String => format!("VARCHAR({})", size),
            SqlType::Int16 => "SMALLINT".to_string(),
            SqlType::Int32 => "INTEGER".to_string(),
            SqlType::Int64 => "BIGINT".to_string(),
            SqlType::Decimal if size == 0 => "NUMERIC".to_string(),
            SqlType::Decimal => format!("NUMERIC({},{})", size, scale),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::DateTime => "TIMESTAMP".to_string(),
            SqlType::Binary => "BYTEA".to_string(),
            SqlType::Guid => "UUID".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
        }
    }

    fn column_type(&self, column: &Column) -> String {
        if column.auto_increment {
            match column.sql_type {
                SqlType::Int16 => return "SMALLSERIAL".to_string(),
                SqlType::Int32 => return "SERIAL".to_string(),
                SqlType::Int64 => return "BIGSERIAL".to_string(),
                _ => {}
            }
        }
        self.native_type(column.sql_type, column.size, column.scale)
    }

    fn native_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => common::float_literal(*f),
            Value::Decimal(d) => d.clone(),
            Value::Text(s) => common::quote_string(s),
            Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("TIME '{}'", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => format!("TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            Value::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    fn column_literal(&self, column: &Column, value: &Value) -> String {
        let literal = self.native_literal(value);
        match (value, column.sql_type) {
            (Value::Text(_), SqlType::Char | SqlType::String) => literal,
            (Value::Null | Value::Text(_), _) => format!(
                "CAST({} AS {})",
                literal,
                self.native_type(column.sql_type, column.size, column.scale)
            ),
            _ => literal,
        }
    }

    fn table_storage_clause(&self, table: &Table) -> Option<String> {
        table
            .tablespace
            .as_ref()
            .map(|ts| format!("TABLESPACE {}", self.quote_ident(ts)))
    }

    fn index_storage_clause(&self, table: &Table) -> Option<String> {
        table
            .index_space
            .as_ref()
            .map(|ts| format!("TABLESPACE {}", self.quote_ident(ts)))
    }

    fn comment_clauses(&self, table: &Table) -> Vec<String> {
        common::comment_on_table(self, table)
    }

    fn add_column_clause(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let fill = column.fill_value();
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            common::column_definition(self, table, column, fill.as_ref(), false)
        )];
        if column.default.is_none() && fill.is_some() {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                self.quote_ident(table),
                self.quote_ident(&column.name)
            ));
        }
        Ok(statements)
    }

    fn modify_column_clause(
        &self,
        table: &str,
        column: &Column,
        previous: &TrackingColumn,
    ) -> Result<Vec<String>> {
        let delta = previous.delta(column);
        let table_ident = self.quote_ident(table);
        let column_ident = self.quote_ident(&column.name);
        let mut statements = Vec::new();

        if delta.type_changed {
            let native = self.column_type(column);
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                table_ident, column_ident, native, column_ident, native
            ));
        }

        if delta.default_changed {
            statements.push(match &column.default {
                Some(value) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table_ident,
                    column_ident,
                    self.native_literal(value)
                ),
                None => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    table_ident, column_ident
                ),
            });
        }

        if delta.nullability_changed {
            if column.nullable {
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                    table_ident, column_ident
                ));
            } else {
                if let Some(fill) = column.fill_value() {
                    statements.push(common::fill_nulls(self, table, &column.name, &fill));
                }
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                    table_ident, column_ident
                ));
            }
        }
        Ok(statements)
    }

    fn restore_auto_increment_clauses(&self, table: &str, column: &Column) -> Vec<String> {
        let table_ident = self.quote_ident(table);
        let column_ident = self.quote_ident(&column.name);
        vec![format!(
            "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({}), 0) + 1, false) FROM {}",
            common::quote_string(&table_ident),
            common::quote_string(&column.name),
            column_ident,
            table_ident
        )]
    }

    fn table_exists_query(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = {}",
            common::quote_string(table)
        )
    }

    fn database_exists_query(&self, database: &str) -> Option<String> {
        Some(format!(
            "SELECT COUNT(*) FROM pg_database WHERE datname = {}",
            common::quote_string(database)
        ))
    }
}
