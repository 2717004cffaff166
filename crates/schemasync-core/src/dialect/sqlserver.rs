//! SQL Server dialect.

use super::{common, Dialect, DialectKind};
use crate::error::Result;
use crate::schema::{Column, SqlType, Table, Value};
use crate::tracking::TrackingColumn;

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

fn quote_unicode(s: &str) -> String {
    format!("N{}", common::quote_string(s))
}

impl Dialect for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn native_type(&self, sql_type: SqlType, size: u32, scale: u32) -> String {
        match sql_type {
            SqlType::Char if size > 4000 => "NVARCHAR(MAX)".to_string(),
            SqlType::Char => format!("NCHAR({})", size.max(1)),
            SqlType::String if size == 0 || size > 4000 => "NVARCHAR(MAX)".to_string(),
            SqlType::String => format!("NVARCHAR({})", size),
            SqlType::Int16 => "SMALLINT".to_string(),
            SqlType::Int32 => "INT".to_string(),
            SqlType::Int64 => "BIGINT".to_string(),
            SqlType::Decimal if size == 0 => "DECIMAL(18,0)".to_string(),
            SqlType::Decimal => format!("DECIMAL({},{})", size, scale),
            SqlType::Double => "FLOAT".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::DateTime => "DATETIME2".to_string(),
            SqlType::Binary if size == 0 || size > 8000 => "VARBINARY(MAX)".to_string(),
            SqlType::Binary => format!("VARBINARY({})", size),
            SqlType::Guid => "UNIQUEIDENTIFIER".to_string(),
            SqlType::Boolean => "BIT".to_string(),
        }
    }

    fn native_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => common::float_literal(*f),
            Value::Decimal(d) => d.clone(),
            Value::Text(s) => quote_unicode(s),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Bytes(b) => format!("0x{}", hex::encode_upper(b)),
            Value::CurrentTimestamp => "GETDATE()".to_string(),
        }
    }

    fn identity_keyword(&self) -> Option<&'static str> {
        Some("IDENTITY(1,1)")
    }

    fn table_storage_clause(&self, table: &Table) -> Option<String> {
        table
            .tablespace
            .as_ref()
            .map(|fg| format!("ON {}", self.quote_ident(fg)))
    }

    fn index_storage_clause(&self, table: &Table) -> Option<String> {
        table
            .index_space
            .as_ref()
            .map(|fg| format!("ON {}", self.quote_ident(fg)))
    }

    fn comment_clauses(&self, table: &Table) -> Vec<String> {
        table
            .comment
            .iter()
            .map(|comment| {
                format!(
                    "EXEC sp_addextendedproperty N'MS_Description', {}, N'SCHEMA', N'dbo', N'TABLE', {}",
                    quote_unicode(comment),
                    quote_unicode(&table.name)
                )
            })
            .collect()
    }

    fn rename_table_clause(&self, from: &str, to: &str) -> String {
        format!("EXEC sp_rename {}, {}", quote_unicode(from), quote_unicode(to))
    }

    fn rename_column_clause(&self, table: &str, from: &str, to: &str) -> Result<String> {
        Ok(format!(
            "EXEC sp_rename {}, {}, N'COLUMN'",
            quote_unicode(&format!("{}.{}", table, from)),
            quote_unicode(to)
        ))
    }

    fn add_column_clause(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let fill = column.fill_value();
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD {}",
            self.quote_ident(table),
            common::column_definition(self, table, column, fill.as_ref(), false)
        )];
        if column.default.is_none() && fill.is_some() {
            let name = self.object_name(&format!("DF_{}_{}", table, column.name));
            statements.push(self.remove_default_constraint_clause(table, &name)?);
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
        let mut statements = Vec::new();

        // A bound default blocks type changes, so it is dropped and re-added.
        let rebind_default = delta.default_changed || delta.type_changed;
        if rebind_default {
            if let Some(name) = &previous.default_constraint_name {
                statements.push(self.remove_default_constraint_clause(table, name)?);
            }
        }

        if delta.nullability_changed && !column.nullable {
            if let Some(fill) = column.fill_value() {
                statements.push(common::fill_nulls(self, table, &column.name, &fill));
            }
        }

        if delta.alters_definition() {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {} {}",
                self.quote_ident(table),
                self.quote_ident(&column.name),
                self.column_type(column),
                if column.nullable { "NULL" } else { "NOT NULL" }
            ));
        }

        if rebind_default && column.default.is_some() {
            statements.push(self.add_default_constraint_clause(table, column)?);
        }
        Ok(statements)
    }

    fn add_default_constraint_clause(&self, table: &str, column: &Column) -> Result<String> {
        let name = self.object_name(&format!("DF_{}_{}", table, column.name));
        let value = column.default.as_ref().unwrap_or(&Value::Null);
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
            self.quote_ident(table),
            self.quote_ident(&name),
            self.native_literal(value),
            self.quote_ident(&column.name)
        ))
    }

    fn remove_default_constraint_clause(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_ident(table),
            self.quote_ident(name)
        ))
    }

    fn drop_index_clause(&self, table: &str, index: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(index),
            self.quote_ident(table)
        )
    }

    fn identity_insert_clause(&self, table: &str, enabled: bool) -> Option<String> {
        Some(format!(
            "SET IDENTITY_INSERT {} {}",
            self.quote_ident(table),
            if enabled { "ON" } else { "OFF" }
        ))
    }

    fn begin_transaction(&self) -> Option<&'static str> {
        Some("BEGIN TRANSACTION")
    }

    fn commit_transaction(&self) -> Option<&'static str> {
        Some("COMMIT TRANSACTION")
    }

    fn rollback_transaction(&self) -> Option<&'static str> {
        Some("ROLLBACK TRANSACTION")
    }

    fn table_exists_query(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = {}",
            quote_unicode(table)
        )
    }

    fn database_exists_query(&self, database: &str) -> Option<String> {
        Some(format!(
            "SELECT COUNT(*) FROM sys.databases WHERE name = {}",
            quote_unicode(database)
        ))
    }
}
