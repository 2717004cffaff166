//! Rebuild-copy-swap for changes an engine cannot apply in place.
//!
//! The live table is renamed to a temporary name derived from the desired
//! table's hash, the new definition is created under the original name, rows
//! are copied across with a column projection, and the temporary table is
//! dropped. Foreign-key enforcement is switched off around the transaction.

use super::diff::{ColumnChange, ColumnChangeKind};
use super::plan::Statement;
use crate::config::MigrationConfig;
use crate::dialect::{common, Dialect};
use crate::error::{Phase, Result};
use crate::schema::{Column, Table, Value};
use crate::tracking::{TrackingColumn, TrackingTable};

/// Statements of a rebuild, split around the transaction.
#[derive(Debug, Clone)]
pub struct RebuildScript {
    /// Session statements before the transaction.
    pub prologue: Vec<String>,
    /// Transaction body.
    pub body: Vec<Statement>,
    /// Session statements after the transaction.
    pub epilogue: Vec<String>,
    /// The table as created: declared columns followed by retained ones.
    pub effective: Table,
}

/// Name the live table is moved to during a rebuild.
pub fn temp_table_name(dialect: &dyn Dialect, table: &Table) -> String {
    dialect.object_name(&format!("tmp_{}", table.hash().short()))
}

/// Definition of a column that is no longer declared but kept in place.
/// Index and key attributes are dropped.
pub fn retained_column(previous: &TrackingColumn) -> Result<Column> {
    let mut column = previous.to_column()?;
    column.unique = false;
    column.indexed = false;
    Ok(column)
}

/// Build the rebuild script for `table`, currently tracked as `tracked`.
pub fn rebuild_script(
    dialect: &dyn Dialect,
    table: &Table,
    tracked: &TrackingTable,
    changes: &[ColumnChange],
    config: &MigrationConfig,
    seeds: Vec<String>,
) -> Result<RebuildScript> {
    let caps = dialect.capabilities();
    let temp = temp_table_name(dialect, table);
    let ddl = |sql: String| Statement::new(Phase::Ddl, sql);

    let mut effective = table.clone();
    if !config.drop_removed_columns {
        for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Removed) {
            if let Some(previous) = &change.previous {
                effective.columns.push(retained_column(previous)?);
            }
        }
    }

    let mut body = vec![ddl(dialect.rename_table_clause(&tracked.name, &temp))];

    // Names that live in a schema-wide namespace still belong to the old table.
    if caps.global_index_names {
        for index in &tracked.indexes {
            body.push(ddl(dialect.drop_index_clause(&temp, &index.name)));
        }
    }
    if caps.global_constraint_names {
        for fk in tracked.columns.iter().filter_map(|c| c.foreign_key_name.as_ref()) {
            body.push(ddl(dialect.drop_foreign_key_clause(&temp, fk)?));
        }
    }
    if caps.named_default_constraints {
        for df in tracked
            .columns
            .iter()
            .filter_map(|c| c.default_constraint_name.as_ref())
        {
            body.push(ddl(dialect.remove_default_constraint_clause(&temp, df)?));
        }
    }

    body.extend(dialect.create_table_clause(&effective).into_iter().map(ddl));
    for index in effective.effective_indexes() {
        body.push(ddl(dialect.create_index_clause(&effective, &index)));
    }

    let (targets, projection) = projection(dialect, &effective, changes);
    if !targets.is_empty() {
        let identity = effective
            .auto_increment_column()
            .filter(|c| targets.contains(&c.name));
        let copy = |sql: String| Statement::new(Phase::Copy, sql);

        if identity.is_some() {
            body.extend(dialect.identity_insert_clause(&table.name, true).map(copy));
        }
        body.push(copy(common::insert_select(
            dialect,
            &table.name,
            &targets,
            &temp,
            &projection,
        )));
        if identity.is_some() {
            body.extend(dialect.identity_insert_clause(&table.name, false).map(copy));
        }
    }

    if let Some(column) = effective.auto_increment_column() {
        let was_auto = changes
            .iter()
            .find(|c| c.kind != ColumnChangeKind::Removed && c.name == column.name)
            .and_then(|c| c.previous.as_ref())
            .map_or(false, |p| p.auto_increment);

        let mut statements = if !was_auto {
            dialect.auto_increment_clauses(&table.name, column)
        } else if tracked.name != table.name {
            dialect.rename_auto_increment_clauses(&tracked.name, &table.name, column)
        } else {
            Vec::new()
        };
        for sql in dialect.restore_auto_increment_clauses(&table.name, column) {
            if !statements.contains(&sql) {
                statements.push(sql);
            }
        }
        body.extend(statements.into_iter().map(ddl));
    }

    body.push(ddl(dialect.drop_table_clause(&temp)));
    body.extend(seeds.into_iter().map(|sql| Statement::new(Phase::Seed, sql)));

    Ok(RebuildScript {
        prologue: dialect.disable_foreign_keys(),
        body,
        epilogue: dialect.enable_foreign_keys(),
        effective,
    })
}

/// Target columns and source expressions for the row copy.
///
/// Columns with a tracked predecessor copy from its old name, with NULLs
/// replaced by the fill value when the column became NOT NULL. New NOT NULL
/// columns without a default receive the type's zero value; other new columns
/// are left to their default.
fn projection(
    dialect: &dyn Dialect,
    effective: &Table,
    changes: &[ColumnChange],
) -> (Vec<String>, Vec<String>) {
    let mut targets = Vec::new();
    let mut sources = Vec::new();

    for column in &effective.columns {
        let previous = changes
            .iter()
            .find(|c| c.name == column.name)
            .and_then(|c| c.previous.as_ref());

        match previous {
            Some(previous) => {
                let source = dialect.quote_ident(&previous.name);
                let expr = match column.fill_value() {
                    Some(fill) if !column.nullable && previous.nullable => format!(
                        "COALESCE({}, {})",
                        source,
                        dialect.column_literal(column, &fill)
                    ),
                    _ => source,
                };
                targets.push(column.name.clone());
                sources.push(expr);
            }
            None if !column.nullable && column.default.is_none() && !column.auto_increment => {
                targets.push(column.name.clone());
                sources.push(dialect.column_literal(column, &Value::zero_for(column.sql_type)));
            }
            None => {}
        }
    }

    (targets, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
    use crate::migration::diff::classify_columns;
    use crate::schema::SqlType;
    use pretty_assertions::assert_eq;

    fn before() -> Table {
        Table::new("sample_t1", 1)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("v1_int", SqlType::Int32))
            .with_column(Column::new("v2_string", SqlType::String).sized(150).unique())
    }

    fn track(table: &Table, dialect: &dyn Dialect) -> TrackingTable {
        let mut columns: Vec<TrackingColumn> = table
            .columns
            .iter()
            .enumerate()
            .map(|(pos, c)| TrackingColumn::from_column(c, 2 + pos as u64, pos as u32))
            .collect();
        for (record, column) in columns.iter_mut().zip(&table.columns) {
            record.default_constraint_name = dialect.default_constraint_name(&table.name, column);
            record.foreign_key_name = column
                .reference
                .as_ref()
                .map(|_| dialect.foreign_key_name(&table.name, &column.name));
        }
        TrackingTable {
            internal_id: 1,
            name: table.name.clone(),
            version: table.version,
            hash: table.hash().0,
            data_version: 0,
            columns,
            indexes: vec![crate::tracking::TrackingIndex {
                internal_id: 9,
                name: "UX_sample_t1_v2_string".into(),
                columns: vec!["v2_string".into()],
                unique: true,
            }],
        }
    }

    fn script(dialect: &dyn Dialect, after: &Table, config: &MigrationConfig) -> RebuildScript {
        let tracked = track(&before(), dialect);
        let changes = classify_columns(after, &tracked).unwrap();
        rebuild_script(dialect, after, &tracked, &changes, config, Vec::new()).unwrap()
    }

    fn sqls(script: &RebuildScript) -> Vec<&str> {
        script.body.iter().map(|s| s.sql.as_str()).collect()
    }

    #[test]
    fn test_sqlite_rebuild_sequence() {
        let mut after = before();
        after.columns[2] = after.columns[2].clone().sized(200).indexed();
        let script = script(&SqliteDialect, &after, &MigrationConfig::default());
        let temp = temp_table_name(&SqliteDialect, &after);

        assert_eq!(script.prologue, SqliteDialect.disable_foreign_keys());
        assert_eq!(script.epilogue, SqliteDialect.enable_foreign_keys());
        assert_eq!(
            sqls(&script),
            vec![
                format!("ALTER TABLE \"sample_t1\" RENAME TO \"{}\"", temp).as_str(),
                "DROP INDEX \"UX_sample_t1_v2_string\"",
                "CREATE TABLE \"sample_t1\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
                 \"v1_int\" INTEGER NULL, \"v2_string\" TEXT NULL)",
                "CREATE UNIQUE INDEX \"UX_sample_t1_v2_string\" ON \"sample_t1\" (\"v2_string\")",
                format!(
                    "INSERT INTO \"sample_t1\" (\"id\", \"v1_int\", \"v2_string\") \
                     SELECT \"id\", \"v1_int\", \"v2_string\" FROM \"{}\"",
                    temp
                )
                .as_str(),
                format!("DROP TABLE \"{}\"", temp).as_str(),
            ]
        );
        assert_eq!(script.body[4].phase, Phase::Copy);
    }

    #[test]
    fn test_projection_follows_renames_and_fills() {
        let after = Table::new("sample_t1", 2)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("v1_renamed", SqlType::Int32).not_null().renamed_from("v1_int"))
            .with_column(Column::new("v2_string", SqlType::String).sized(150).unique())
            .with_column(Column::new("v3", SqlType::Int64).not_null())
            .with_column(Column::new("v4", SqlType::String).sized(10));
        let tracked = track(&before(), &SqliteDialect);
        let changes = classify_columns(&after, &tracked).unwrap();

        let (targets, sources) = projection(&SqliteDialect, &after, &changes);
        assert_eq!(targets, vec!["id", "v1_renamed", "v2_string", "v3"]);
        assert_eq!(
            sources,
            vec!["\"id\"", "COALESCE(\"v1_int\", 0)", "\"v2_string\"", "0"]
        );
    }

    #[test]
    fn test_removed_columns_are_carried_over() {
        let mut after = before();
        after.columns.remove(2);

        let kept = script(&SqliteDialect, &after, &MigrationConfig::default());
        assert_eq!(kept.effective.columns.len(), 3);
        assert!(!kept.effective.columns[2].unique);
        assert!(sqls(&kept).iter().all(|s| !s.starts_with("CREATE UNIQUE INDEX")));

        let config = MigrationConfig::default().with_drop_removed_columns(true);
        let dropped = script(&SqliteDialect, &after, &config);
        assert_eq!(dropped.effective.columns.len(), 2);
    }

    #[test]
    fn test_sqlserver_rebuild_frees_constraint_names() {
        let with_default = Table::new("sample_t1", 1)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("v1_int", SqlType::Int32).with_default(7))
            .with_column(Column::new("v2_string", SqlType::String).sized(150).unique());
        let tracked = track(&with_default, &SqlServerDialect);
        let mut after = with_default.clone();
        after.columns[0].version = 2;
        let changes = classify_columns(&after, &tracked).unwrap();
        let script =
            rebuild_script(&SqlServerDialect, &after, &tracked, &changes, &MigrationConfig::default(), Vec::new())
                .unwrap();
        let body = sqls(&script);

        assert!(body[0].starts_with("EXEC sp_rename"));
        assert!(body.iter().any(|s| s.ends_with("DROP CONSTRAINT [DF_sample_t1_v1_int]")));
        assert!(body.iter().all(|s| !s.starts_with("DROP INDEX")));
        let on = body.iter().position(|s| *s == "SET IDENTITY_INSERT [sample_t1] ON").unwrap();
        let off = body.iter().position(|s| *s == "SET IDENTITY_INSERT [sample_t1] OFF").unwrap();
        assert_eq!(off, on + 2);
    }

    #[test]
    fn test_postgres_rebuild_resets_sequence() {
        let mut after = before();
        after.columns[1].version = 2;
        let script = script(&PostgresDialect, &after, &MigrationConfig::default());
        let body = sqls(&script);
        let drop = body.iter().position(|s| s.starts_with("DROP TABLE")).unwrap();
        assert!(body[drop - 1].starts_with("SELECT setval("));
    }

    #[test]
    fn test_oracle_rebuild_moves_trigger_only() {
        let mut after = before();
        after.columns[1].version = 2;
        let script = script(&OracleDialect, &after, &MigrationConfig::default());
        let body = sqls(&script);
        assert!(body.iter().all(|s| !s.starts_with("CREATE SEQUENCE")));
        assert_eq!(body.iter().filter(|s| s.contains("TRIGGER")).count(), 1);
    }

    #[test]
    fn test_oracle_rebuild_catches_sequence_up() {
        let mut after = before();
        after.columns[1].version = 2;
        let script = script(&OracleDialect, &after, &MigrationConfig::default());
        let body = sqls(&script);

        let copy = body.iter().position(|s| s.starts_with("INSERT INTO")).unwrap();
        let resync = body.iter().position(|s| s.contains("\"SEQ_sample_t1\".NEXTVAL INTO next_key")).unwrap();
        let trigger = body.iter().position(|s| s.starts_with("CREATE OR REPLACE TRIGGER")).unwrap();
        let drop = body.iter().position(|s| s.starts_with("DROP TABLE")).unwrap();
        assert!(copy < resync && resync < trigger && trigger < drop);
    }

    #[test]
    fn test_oracle_rebuild_of_renamed_table_moves_sequence() {
        let mut after = before().renamed_from(1, "sample_t1", 1);
        after.name = "sample_t11".into();
        after.columns[1].version = 2;
        let script = script(&OracleDialect, &after, &MigrationConfig::default());
        let body = sqls(&script);

        let rename = body
            .iter()
            .position(|s| *s == "RENAME \"SEQ_sample_t1\" TO \"SEQ_sample_t11\"")
            .unwrap();
        let resync = body.iter().position(|s| s.contains("\"SEQ_sample_t11\".NEXTVAL INTO next_key")).unwrap();
        assert!(rename < resync);
        assert!(body.contains(&"DROP TRIGGER \"TRG_sample_t1_AI\""));
        assert_eq!(body.iter().filter(|s| s.starts_with("CREATE OR REPLACE TRIGGER")).count(), 1);
        assert!(body.iter().all(|s| !s.starts_with("CREATE SEQUENCE")));
    }

    #[test]
    fn test_temp_name_is_deterministic() {
        let a = temp_table_name(&OracleDialect, &before());
        assert_eq!(a, temp_table_name(&OracleDialect, &before()));
        assert!(a.len() <= 30);
        assert!(a.starts_with("tmp_"));
    }
}
