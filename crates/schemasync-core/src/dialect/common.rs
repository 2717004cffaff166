//! Clause shapes shared by several dialects.

use super::Dialect;
use crate::schema::{Column, Table, Value};

/// Quote with double quotes, doubling embedded quotes.
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Truncate `name` to `max` bytes, replacing the tail with a hash of the full
/// name so distinct long names stay distinct.
pub fn fit_identifier(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }

    let digest = blake3::hash(name.as_bytes());
    let suffix = hex::encode(&digest.as_bytes()[..4]);
    let keep = max.saturating_sub(suffix.len() + 1);

    let mut prefix = String::new();
    for ch in name.chars() {
        if prefix.len() + ch.len_utf8() > keep {
            break;
        }
        prefix.push(ch);
    }
    format!("{}_{}", prefix, suffix)
}

/// Comma-separated quoted identifiers.
pub fn quoted_list<D: Dialect + ?Sized>(d: &D, names: &[String]) -> String {
    names
        .iter()
        .map(|n| d.quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column definition: name, type, identity, default, nullability, key.
///
/// `default` is the physical default, which may differ from the declared one
/// when a column is added to a populated table. Key attributes are only
/// rendered when `include_key` is set.
pub fn column_definition<D: Dialect + ?Sized>(
    d: &D,
    table: &str,
    column: &Column,
    default: Option<&Value>,
    include_key: bool,
) -> String {
    let mut sql = format!("{} {}", d.quote_ident(&column.name), d.column_type(column));

    if include_key && column.auto_increment {
        if let Some(keyword) = d.identity_keyword() {
            sql.push(' ');
            sql.push_str(keyword);
        }
    }

    if let Some(value) = default {
        if d.capabilities().named_default_constraints {
            let name = d.object_name(&format!("DF_{}_{}", table, column.name));
            sql.push_str(&format!(" CONSTRAINT {}", d.quote_ident(&name)));
        }
        sql.push_str(&format!(" DEFAULT {}", d.native_literal(value)));
    }

    sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });

    if include_key && column.primary_key {
        sql.push(' ');
        sql.push_str(d.primary_key_clause(column));
    }

    sql
}

/// Inline foreign-key constraint for CREATE TABLE.
pub fn foreign_key_constraint<D: Dialect + ?Sized>(d: &D, table: &str, column: &Column) -> Option<String> {
    column.reference.as_ref().map(|reference| {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            d.quote_ident(&d.foreign_key_name(table, &column.name)),
            d.quote_ident(&column.name),
            d.quote_ident(&reference.table),
            d.quote_ident(&reference.column)
        )
    })
}

/// `CREATE TABLE` with inline key and foreign-key constraints.
pub fn create_table<D: Dialect + ?Sized>(d: &D, table: &Table) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| d.column_definition(table, c))
        .collect();
    parts.extend(
        table
            .columns
            .iter()
            .filter_map(|c| foreign_key_constraint(d, &table.name, c)),
    );

    let mut sql = format!(
        "CREATE TABLE {} ({})",
        d.quote_ident(&table.name),
        parts.join(", ")
    );
    if let Some(storage) = d.table_storage_clause(table) {
        sql.push(' ');
        sql.push_str(&storage);
    }
    sql
}

/// `COMMENT ON TABLE` for engines that support it.
pub fn comment_on_table<D: Dialect + ?Sized>(d: &D, table: &Table) -> Vec<String> {
    table
        .comment
        .iter()
        .map(|comment| {
            format!(
                "COMMENT ON TABLE {} IS {}",
                d.quote_ident(&table.name),
                quote_string(comment)
            )
        })
        .collect()
}

/// Backfill NULLs before a column becomes NOT NULL.
pub fn fill_nulls<D: Dialect + ?Sized>(d: &D, table: &str, column: &str, value: &Value) -> String {
    format!(
        "UPDATE {} SET {} = {} WHERE {} IS NULL",
        d.quote_ident(table),
        d.quote_ident(column),
        d.native_literal(value),
        d.quote_ident(column)
    )
}

/// `INSERT INTO target (columns) SELECT projection FROM source`.
pub fn insert_select<D: Dialect + ?Sized>(
    d: &D,
    target: &str,
    columns: &[String],
    source: &str,
    projection: &[String],
) -> String {
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        d.quote_ident(target),
        quoted_list(d, columns),
        projection.join(", "),
        d.quote_ident(source)
    )
}

/// Format a floating-point literal so it always reads back as a float.
pub fn float_literal(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectKind, SqliteDialect};
    use crate::schema::SqlType;

    #[test]
    fn test_quote_double() {
        assert_eq!(quote_double("name"), "\"name\"");
        assert_eq!(quote_double("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("it's"), "'it''s'");
    }

    #[test]
    fn test_fit_identifier() {
        assert_eq!(fit_identifier("FK_short", 30), "FK_short");

        let long = "FK_sample_table_with_long_name_reference_column";
        let fitted = fit_identifier(long, 30);
        assert_eq!(fitted.len(), 30);
        assert!(fitted.starts_with("FK_sample_table_with"));

        let other = fit_identifier("FK_sample_table_with_long_name_reference_other", 30);
        assert_ne!(fitted, other);
        assert_eq!(fit_identifier(long, 30), fitted);
    }

    #[test]
    fn test_column_definition_shape() {
        let d = SqliteDialect;
        let column = Column::new("flag", SqlType::Boolean).not_null().with_default(true);
        assert_eq!(
            column_definition(&d, "t", &column, column.default.as_ref(), true),
            "\"flag\" INTEGER DEFAULT 1 NOT NULL"
        );
    }

    #[test]
    fn test_create_table_with_foreign_key() {
        let table = Table::new("child", 1)
            .with_pk_column(Column::new("id", SqlType::Int32))
            .with_column(Column::new("parent_id", SqlType::Int32).references("parent", "id"));

        for kind in DialectKind::ALL {
            let dialect = kind.dialect();
            let sql = create_table(dialect.as_ref(), &table);
            assert!(sql.starts_with("CREATE TABLE"), "{kind}: {sql}");
            assert!(sql.contains("FOREIGN KEY"), "{kind}: {sql}");
            assert!(sql.contains("FK_child_parent_id"), "{kind}: {sql}");
        }
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(1.0), "1.0");
        assert_eq!(float_literal(2.5), "2.5");
    }
}
