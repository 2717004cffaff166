//! Seed data inserts.

use crate::config::MigrationConfig;
use crate::dialect::{common, Dialect};
use crate::schema::{Column, Table, Value};

/// Whether the table's seed rows are newer than the applied data version.
pub fn seed_due(table: &Table, applied_version: u32, config: &MigrationConfig) -> bool {
    config.apply_seed_data && table.data.is_some() && table.data_version() > applied_version
}

/// Columns in seed row order: the primary key first, then the remaining
/// columns in declaration order.
pub fn seed_columns(table: &Table) -> Vec<&Column> {
    table
        .primary_key()
        .into_iter()
        .chain(table.columns.iter().filter(|c| !c.primary_key))
        .collect()
}

/// Insert statements for every seed row.
///
/// With `guarded` set each row is skipped when its primary key already
/// exists, so rows survive a data version bump without duplicates. Explicit
/// key values on identity columns are wrapped in the engine's identity
/// insert switch and followed by a sequence reset.
pub fn seed_statements(dialect: &dyn Dialect, table: &Table, guarded: bool) -> Vec<String> {
    let Some(data) = &table.data else {
        return Vec::new();
    };
    let columns = seed_columns(table);
    let pk = table.primary_key();

    let mut inserts = Vec::with_capacity(data.rows.len());
    for row in &data.rows {
        let pairs: Vec<(&Column, &Value)> = columns.iter().copied().zip(row.iter()).collect();
        if pairs.is_empty() {
            continue;
        }
        let names: Vec<String> = pairs.iter().map(|(c, _)| c.name.clone()).collect();
        let key = pk.and_then(|pk| {
            pairs
                .iter()
                .find(|(c, v)| c.name == pk.name && !v.is_null())
                .map(|(c, v)| (*c, *v))
        });

        let sql = match key {
            Some((key_column, key_value)) if guarded => {
                let values: Vec<String> = pairs
                    .iter()
                    .map(|(c, v)| dialect.column_literal(c, v))
                    .collect();
                let from = dialect
                    .dual_table()
                    .map(|dual| format!(" FROM {}", dual))
                    .unwrap_or_default();
                format!(
                    "INSERT INTO {} ({}) SELECT {}{} WHERE NOT EXISTS (SELECT 1 FROM {} WHERE {} = {})",
                    dialect.quote_ident(&table.name),
                    common::quoted_list(dialect, &names),
                    values.join(", "),
                    from,
                    dialect.quote_ident(&table.name),
                    dialect.quote_ident(&key_column.name),
                    dialect.native_literal(key_value)
                )
            }
            _ => {
                let values: Vec<String> = pairs
                    .iter()
                    .map(|(_, v)| dialect.native_literal(v))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    dialect.quote_ident(&table.name),
                    common::quoted_list(dialect, &names),
                    values.join(", ")
                )
            }
        };
        inserts.push((sql, key.is_some()));
    }

    if inserts.is_empty() {
        return Vec::new();
    }

    let identity = table
        .auto_increment_column()
        .filter(|_| inserts.iter().any(|(_, keyed)| *keyed));

    let mut statements = Vec::with_capacity(inserts.len() + 2);
    if identity.is_some() {
        statements.extend(dialect.identity_insert_clause(&table.name, true));
    }
    statements.extend(inserts.into_iter().map(|(sql, _)| sql));
    if let Some(column) = identity {
        statements.extend(dialect.identity_insert_clause(&table.name, false));
        statements.extend(dialect.restore_auto_increment_clauses(&table.name, column));
    }
    statements
}
