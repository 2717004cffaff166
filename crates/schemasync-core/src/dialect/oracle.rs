//! Oracle dialect.

use super::{common, Dialect, DialectKind};
use crate::error::Result;
use crate::schema::{Column, SqlType, Table, Value};
use crate::tracking::TrackingColumn;

/// Oracle Database.
///
/// DDL commits implicitly, so scripts carry no transaction statements and a
/// failed rebuild can leave the temporary table behind. Auto-increment is a
/// sequence plus a before-insert trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl OracleDialect {
    fn sequence_name(&self, table: &str) -> String {
        self.object_name(&format!("SEQ_{}", table))
    }

    fn trigger_name(&self, table: &str) -> String {
        self.object_name(&format!("TRG_{}_AI", table))
    }

    /// Advance the sequence past the largest key already in the table.
    /// Works without `ALTER SEQUENCE ... RESTART`, which needs 18c.
    fn resync_sequence_clause(&self, table: &str, column: &Column) -> String {
        let sequence = self.quote_ident(&self.sequence_name(table));
        let alter = common::quote_string(&format!("ALTER SEQUENCE {} INCREMENT BY ", sequence));
        format!(
            "DECLARE max_key NUMBER; next_key NUMBER; \
             BEGIN \
             SELECT NVL(MAX({column}), 0) INTO max_key FROM {table}; \
             SELECT {sequence}.NEXTVAL INTO next_key FROM DUAL; \
             IF max_key > next_key THEN \
             EXECUTE IMMEDIATE {alter} || (max_key - next_key); \
             SELECT {sequence}.NEXTVAL INTO next_key FROM DUAL; \
             EXECUTE IMMEDIATE {alter} || 1; \
             END IF; \
             END;",
            column = self.quote_ident(&column.name),
            table = self.quote_ident(table),
            sequence = sequence,
            alter = alter,
        )
    }

    fn trigger_clause(&self, table: &str, column: &Column) -> String {
        let trigger = self.trigger_name(table);
        let column = self.quote_ident(&column.name);
        format!(
            "CREATE OR REPLACE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW WHEN (NEW.{} IS NULL) \
             BEGIN SELECT {}.NEXTVAL INTO :NEW.{} FROM DUAL; END;",
            self.quote_ident(&trigger),
            self.quote_ident(table),
            column,
            self.quote_ident(&self.sequence_name(table)),
            column
        )
    }
}

impl Dialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn native_type(&self, sql_type: SqlType, size: u32, scale: u32) -> String {
        match sql_type {
            SqlType::Char => format!("CHAR({})", size.clamp(1, 2000)),
            SqlType::String if size == 0 || size > 4000 => "CLOB".to_string(),
            SqlType::String => format!("VARCHAR2({} CHAR)", size),
            SqlType::Int16 => "NUMBER(5)".to_string(),
            SqlType::Int32 => "NUMBER(10)".to_string(),
            SqlType::Int64 => "NUMBER(19)".to_string(),
            SqlType::Decimal if size == 0 => "NUMBER".to_string(),
            SqlType::Decimal => format!("NUMBER({},{})", size, scale),
            SqlType::Double => "BINARY_DOUBLE".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "VARCHAR2(16)".to_string(),
            SqlType::DateTime => "TIMESTAMP".to_string(),
            SqlType::Binary if size == 0 || size > 2000 => "BLOB".to_string(),
            SqlType::Binary => format!("RAW({})", size),
            SqlType::Guid => "VARCHAR2(36)".to_string(),
            SqlType::Boolean => "NUMBER(1)".to_string(),
        }
    }

    fn native_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => common::float_literal(*f),
            Value::Decimal(d) => d.clone(),
            // '' is NULL in Oracle
            Value::Text(s) if s.is_empty() => "' '".to_string(),
            Value::Text(s) => common::quote_string(s),
            Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => common::quote_string(&t.format("%H:%M:%S").to_string()),
            Value::DateTime(dt) => format!("TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bytes(b) => format!("HEXTORAW('{}')", hex::encode_upper(b)),
            Value::CurrentTimestamp => "SYSDATE".to_string(),
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
            "ALTER TABLE {} ADD ({})",
            self.quote_ident(table),
            common::column_definition(self, table, column, fill.as_ref(), false)
        )];
        if column.default.is_none() && fill.is_some() {
            statements.push(format!(
                "ALTER TABLE {} MODIFY ({} DEFAULT NULL)",
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
        let mut statements = Vec::new();

        if delta.nullability_changed && !column.nullable {
            if let Some(fill) = column.fill_value() {
                statements.push(common::fill_nulls(self, table, &column.name, &fill));
            }
        }

        // Oracle rejects NULL/NOT NULL that restates the current nullability.
        let mut definition = String::new();
        if delta.type_changed {
            definition.push(' ');
            definition.push_str(&self.column_type(column));
        }
        if delta.default_changed {
            let literal = column
                .default
                .as_ref()
                .map(|v| self.native_literal(v))
                .unwrap_or_else(|| "NULL".to_string());
            definition.push_str(&format!(" DEFAULT {}", literal));
        }
        if delta.nullability_changed {
            definition.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        }

        if !definition.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} MODIFY ({}{})",
                self.quote_ident(table),
                self.quote_ident(&column.name),
                definition
            ));
        }
        Ok(statements)
    }

    fn auto_increment_clauses(&self, table: &str, column: &Column) -> Vec<String> {
        vec![
            format!(
                "CREATE SEQUENCE {} START WITH 1 INCREMENT BY 1",
                self.quote_ident(&self.sequence_name(table))
            ),
            self.trigger_clause(table, column),
        ]
    }

    fn restore_auto_increment_clauses(&self, table: &str, column: &Column) -> Vec<String> {
        // The sequence outlives the rebuilt table; it is caught up with the
        // copied keys and the trigger is attached to the new table.
        vec![
            self.resync_sequence_clause(table, column),
            self.trigger_clause(table, column),
        ]
    }

    fn rename_auto_increment_clauses(
        &self,
        previous: &str,
        table: &str,
        column: &Column,
    ) -> Vec<String> {
        vec![
            format!(
                "RENAME {} TO {}",
                self.quote_ident(&self.sequence_name(previous)),
                self.quote_ident(&self.sequence_name(table))
            ),
            format!("DROP TRIGGER {}", self.quote_ident(&self.trigger_name(previous))),
            self.trigger_clause(table, column),
        ]
    }

    fn dual_table(&self) -> Option<&'static str> {
        Some("DUAL")
    }

    fn table_exists_query(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM USER_TABLES WHERE TABLE_NAME = {}",
            common::quote_string(table)
        )
    }

    fn database_exists_query(&self, database: &str) -> Option<String> {
        Some(format!(
            "SELECT COUNT(*) FROM ALL_USERS WHERE USERNAME = {}",
            common::quote_string(&database.to_ascii_uppercase())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn orders() -> Table {
        Table::new("orders", 1)
            .with_pk_column(Column::new("id", SqlType::Int64).auto_increment())
            .with_column(Column::new("note", SqlType::String).sized(5000))
            .with_column(Column::new("paid", SqlType::Boolean).not_null().with_default(false))
    }

    #[test]
    fn test_native_types() {
        let d = OracleDialect;
        assert_eq!(d.native_type(SqlType::String, 100, 0), "VARCHAR2(100 CHAR)");
        assert_eq!(d.native_type(SqlType::String, 4001, 0), "CLOB");
        assert_eq!(d.native_type(SqlType::Boolean, 0, 0), "NUMBER(1)");
        assert_eq!(d.native_type(SqlType::Decimal, 18, 4), "NUMBER(18,4)");
        assert_eq!(d.native_type(SqlType::Guid, 0, 0), "VARCHAR2(36)");
    }

    #[test]
    fn test_literals() {
        let d = OracleDialect;
        assert_eq!(d.native_literal(&Value::Bool(true)), "1");
        assert_eq!(d.native_literal(&Value::CurrentTimestamp), "SYSDATE");
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(d.native_literal(&Value::Date(date)), "DATE '2024-02-29'");
        assert_eq!(d.native_literal(&Value::Text("O'Neil".into())), "'O''Neil'");
    }

    #[test]
    fn test_create_table_and_sequence() {
        let d = OracleDialect;
        let table = orders().with_comment("customer orders");
        let statements = d.create_table_clause(&table);

        assert!(statements[0].contains("\"note\" CLOB NULL"));
        assert!(statements[0].contains("\"paid\" NUMBER(1) DEFAULT 0 NOT NULL"));
        assert!(statements[1].starts_with("COMMENT ON TABLE \"orders\""));

        let id = table.primary_key().unwrap();
        let auto = d.auto_increment_clauses("orders", id);
        assert_eq!(auto.len(), 2);
        assert!(auto[0].starts_with("CREATE SEQUENCE \"SEQ_orders\""));
        assert!(auto[1].contains("BEFORE INSERT ON \"orders\""));
        let restore = d.restore_auto_increment_clauses("orders", id);
        assert_eq!(restore.len(), 2);
        assert!(restore[0].contains("SELECT NVL(MAX(\"id\"), 0) INTO max_key FROM \"orders\""));
        assert!(restore[0].contains("'ALTER SEQUENCE \"SEQ_orders\" INCREMENT BY ' || (max_key - next_key)"));
        assert!(restore[1].starts_with("CREATE OR REPLACE TRIGGER \"TRG_orders_AI\""));
    }

    #[test]
    fn test_rename_moves_sequence_and_trigger() {
        let d = OracleDialect;
        let id = Column::new("id", SqlType::Int64).auto_increment();
        let statements = d.rename_auto_increment_clauses("orders", "purchases", &id);
        assert_eq!(
            statements[..2],
            [
                "RENAME \"SEQ_orders\" TO \"SEQ_purchases\"".to_string(),
                "DROP TRIGGER \"TRG_orders_AI\"".to_string(),
            ]
        );
        assert!(statements[2].contains("ON \"purchases\""));
        assert!(statements[2].contains("\"SEQ_purchases\".NEXTVAL"));
    }

    #[test]
    fn test_modify_only_changed_attributes() {
        let d = OracleDialect;
        let before = Column::new("note", SqlType::String).sized(100);
        let previous = TrackingColumn::from_column(&before, 1, 0);

        let widened = before.clone().sized(200);
        assert_eq!(
            d.modify_column_clause("orders", &widened, &previous).unwrap(),
            vec!["ALTER TABLE \"orders\" MODIFY (\"note\" VARCHAR2(200 CHAR))".to_string()]
        );

        let required = before.clone().not_null();
        let statements = d.modify_column_clause("orders", &required, &previous).unwrap();
        assert!(statements[0].starts_with("UPDATE \"orders\" SET \"note\" = ' '"));
        assert!(statements[1].ends_with("MODIFY (\"note\" NOT NULL)"));
    }

    #[test]
    fn test_no_transactions_or_database_creation() {
        let d = OracleDialect;
        assert_eq!(d.begin_transaction(), None);
        assert_eq!(d.create_database_clause("app"), None);
        assert_eq!(d.dual_table(), Some("DUAL"));
    }

    #[test]
    fn test_identifier_limit() {
        let d = OracleDialect;
        let name = d.foreign_key_name("customer_order_lines", "product_reference");
        assert!(name.len() <= 30);
    }
}
