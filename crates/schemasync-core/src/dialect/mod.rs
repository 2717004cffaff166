//! SQL dialects.
//!
//! A [`Dialect`] turns the logical schema model into engine-specific SQL:
//! native type names, literals, identifier quoting and the DDL clauses the
//! reconciliation engine composes into migration scripts. Engine differences
//! are described by a [`Capabilities`] table instead of an inheritance chain;
//! shared clause shapes live in [`common`] and are reused by composition.
//!
//! A clause the engine cannot express returns [`Error::UnsupportedOperation`],
//! which the planner treats as a signal to rebuild the table.

pub mod common;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::error::{Error, Result};
use crate::schema::{Column, IndexDef, SqlType, Table, Value};
use crate::tracking::TrackingColumn;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    /// Oracle Database.
    Oracle,
    /// Microsoft SQL Server.
    SqlServer,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl DialectKind {
    /// All engines.
    pub const ALL: [DialectKind; 4] = [
        DialectKind::Oracle,
        DialectKind::SqlServer,
        DialectKind::Postgres,
        DialectKind::Sqlite,
    ];

    /// Select an engine from a provider identifier by case-insensitive
    /// substring, e.g. `System.Data.SqlClient` or `Npgsql`.
    pub fn from_provider(provider: &str) -> Option<Self> {
        let provider = provider.to_ascii_lowercase();
        if provider.contains("oracle") {
            Some(DialectKind::Oracle)
        } else if provider.contains("sqlclient") || provider.contains("sqlserver") {
            Some(DialectKind::SqlServer)
        } else if provider.contains("npgsql") || provider.contains("postgres") {
            Some(DialectKind::Postgres)
        } else if provider.contains("sqlite") {
            Some(DialectKind::Sqlite)
        } else {
            None
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Oracle => "oracle",
            DialectKind::SqlServer => "sqlserver",
            DialectKind::Postgres => "postgres",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// Capability table.
    pub const fn capabilities(self) -> Capabilities {
        match self {
            DialectKind::Oracle => Capabilities {
                can_create_database: false,
                supports_alter_column: true,
                supports_rename_column: true,
                supports_drop_column: true,
                transactional_ddl: false,
                named_default_constraints: false,
                global_index_names: true,
                global_constraint_names: true,
                max_identifier_len: 30,
            },
            DialectKind::SqlServer => Capabilities {
                can_create_database: true,
                supports_alter_column: true,
                supports_rename_column: true,
                supports_drop_column: true,
                transactional_ddl: true,
                named_default_constraints: true,
                global_index_names: false,
                global_constraint_names: true,
                max_identifier_len: 128,
            },
            DialectKind::Postgres => Capabilities {
                can_create_database: true,
                supports_alter_column: true,
                supports_rename_column: true,
                supports_drop_column: true,
                transactional_ddl: true,
                named_default_constraints: false,
                global_index_names: true,
                global_constraint_names: false,
                max_identifier_len: 63,
            },
            DialectKind::Sqlite => Capabilities {
                can_create_database: true,
                supports_alter_column: false,
                supports_rename_column: false,
                supports_drop_column: false,
                transactional_ddl: true,
                named_default_constraints: false,
                global_index_names: true,
                global_constraint_names: false,
                max_identifier_len: 128,
            },
        }
    }

    /// Instantiate the dialect.
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Oracle => Box::new(OracleDialect),
            DialectKind::SqlServer => Box::new(SqlServerDialect),
            DialectKind::Postgres => Box::new(PostgresDialect),
            DialectKind::Sqlite => Box::new(SqliteDialect),
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DialectKind::from_provider(s)
            .ok_or_else(|| Error::Config(format!("unknown provider '{}'", s)))
    }
}

/// What an engine can do natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `CREATE DATABASE` is available to the migrating account.
    pub can_create_database: bool,
    /// Column type/nullability can be altered in place.
    pub supports_alter_column: bool,
    /// Columns can be renamed in place.
    pub supports_rename_column: bool,
    /// Columns can be dropped in place.
    pub supports_drop_column: bool,
    /// DDL participates in transactions.
    pub transactional_ddl: bool,
    /// Column defaults are separate named constraints.
    pub named_default_constraints: bool,
    /// Index names share one namespace across tables.
    pub global_index_names: bool,
    /// Constraint names share one namespace across tables.
    pub global_constraint_names: bool,
    /// Longest identifier the engine accepts.
    pub max_identifier_len: usize,
}

/// The engine-specific half of the migration engine.
///
/// Every method is pure: it produces SQL text and never touches a connection.
pub trait Dialect: Send + Sync {
    /// Which engine this is.
    fn kind(&self) -> DialectKind;

    /// Engine capabilities.
    fn capabilities(&self) -> Capabilities {
        self.kind().capabilities()
    }

    /// Display name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String {
        common::quote_double(name)
    }

    /// Fit a generated object name within the identifier limit.
    fn object_name(&self, name: &str) -> String {
        common::fit_identifier(name, self.capabilities().max_identifier_len)
    }

    /// Native type for a logical type.
    fn native_type(&self, sql_type: SqlType, size: u32, scale: u32) -> String;

    /// Native type for a logical type name.
    fn native_type_name(&self, type_name: &str, size: u32, scale: u32) -> Result<String> {
        let sql_type: SqlType = type_name.parse()?;
        Ok(self.native_type(sql_type, size, scale))
    }

    /// Native type used in a column definition.
    fn column_type(&self, column: &Column) -> String {
        self.native_type(column.sql_type, column.size, column.scale)
    }

    /// Render a value as an SQL literal.
    fn native_literal(&self, value: &Value) -> String;

    /// Render a value for `column` where the engine cannot infer its type
    /// from context, as in the select list of `INSERT ... SELECT`.
    fn column_literal(&self, _column: &Column, value: &Value) -> String {
        self.native_literal(value)
    }

    /// Keyword placed right after the type of an auto-increment column.
    fn identity_keyword(&self) -> Option<&'static str> {
        None
    }

    /// Inline primary-key clause for a column definition.
    fn primary_key_clause(&self, _column: &Column) -> &'static str {
        "PRIMARY KEY"
    }

    /// Trailing storage clause for CREATE TABLE.
    fn table_storage_clause(&self, _table: &Table) -> Option<String> {
        None
    }

    /// Trailing storage clause for CREATE INDEX.
    fn index_storage_clause(&self, _table: &Table) -> Option<String> {
        None
    }

    /// Statements attaching the table comment.
    fn comment_clauses(&self, _table: &Table) -> Vec<String> {
        Vec::new()
    }

    /// Name of a column's foreign-key constraint.
    fn foreign_key_name(&self, table: &str, column: &str) -> String {
        self.object_name(&format!("FK_{}_{}", table, column))
    }

    /// Name of a column's default constraint, on engines that name them.
    fn default_constraint_name(&self, table: &str, column: &Column) -> Option<String> {
        if self.capabilities().named_default_constraints && column.default.is_some() {
            Some(self.object_name(&format!("DF_{}_{}", table, column.name)))
        } else {
            None
        }
    }

    /// Full definition of a column for CREATE TABLE.
    fn column_definition(&self, table: &Table, column: &Column) -> String {
        common::column_definition(self, &table.name, column, column.default.as_ref(), true)
    }

    /// Statements creating the table, its comment and constraints.
    /// Indexes are created separately with [`Dialect::create_index_clause`].
    fn create_table_clause(&self, table: &Table) -> Vec<String> {
        let mut statements = vec![common::create_table(self, table)];
        statements.extend(self.comment_clauses(table));
        statements
    }

    /// Drop a table.
    fn drop_table_clause(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    /// Rename a table.
    fn rename_table_clause(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_ident(from),
            self.quote_ident(to)
        )
    }

    /// Whether `column` can be added to an existing table in place.
    fn can_add_column(&self, _column: &Column) -> bool {
        true
    }

    /// Add a column to an existing table. The physical default is the
    /// column's fill value so existing rows receive a value.
    fn add_column_clause(&self, table: &str, column: &Column) -> Result<Vec<String>>;

    /// Alter type, nullability and default of an existing column.
    fn modify_column_clause(
        &self,
        table: &str,
        column: &Column,
        previous: &TrackingColumn,
    ) -> Result<Vec<String>>;

    /// Rename a column.
    fn rename_column_clause(&self, table: &str, from: &str, to: &str) -> Result<String> {
        if !self.capabilities().supports_rename_column {
            return Err(self.unsupported("RENAME COLUMN"));
        }
        Ok(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_ident(table),
            self.quote_ident(from),
            self.quote_ident(to)
        ))
    }

    /// Drop a column.
    fn drop_column_clause(&self, table: &str, column: &str) -> Result<String> {
        if !self.capabilities().supports_drop_column {
            return Err(self.unsupported("DROP COLUMN"));
        }
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(column)
        ))
    }

    /// Attach a named default constraint.
    fn add_default_constraint_clause(&self, _table: &str, _column: &Column) -> Result<String> {
        Err(self.unsupported("named default constraints"))
    }

    /// Remove a named default constraint.
    fn remove_default_constraint_clause(&self, _table: &str, _name: &str) -> Result<String> {
        Err(self.unsupported("named default constraints"))
    }

    /// Add a foreign key for `column` to an existing table.
    fn add_foreign_key_clause(&self, table: &str, column: &Column) -> Result<Option<String>> {
        if !self.capabilities().supports_alter_column {
            return Err(self.unsupported("ADD CONSTRAINT"));
        }
        Ok(column.reference.as_ref().map(|reference| {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote_ident(table),
                self.quote_ident(&self.foreign_key_name(table, &column.name)),
                self.quote_ident(&column.name),
                self.quote_ident(&reference.table),
                self.quote_ident(&reference.column)
            )
        }))
    }

    /// Drop a named foreign key.
    fn drop_foreign_key_clause(&self, table: &str, name: &str) -> Result<String> {
        if !self.capabilities().supports_alter_column {
            return Err(self.unsupported("DROP CONSTRAINT"));
        }
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_ident(table),
            self.quote_ident(name)
        ))
    }

    /// Create an index.
    fn create_index_clause(&self, table: &Table, index: &IndexDef) -> String {
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&self.object_name(&index.name)),
            self.quote_ident(&table.name),
            common::quoted_list(self, &index.columns)
        );
        if let Some(storage) = self.index_storage_clause(table) {
            sql.push(' ');
            sql.push_str(&storage);
        }
        sql
    }

    /// Drop an index.
    fn drop_index_clause(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX {}", self.quote_ident(index))
    }

    /// Extra objects emulating auto-increment after CREATE TABLE.
    fn auto_increment_clauses(&self, _table: &str, _column: &Column) -> Vec<String> {
        Vec::new()
    }

    /// Statements restoring auto-increment behavior after a rebuild copy.
    fn restore_auto_increment_clauses(&self, _table: &str, _column: &Column) -> Vec<String> {
        Vec::new()
    }

    /// Statements moving auto-increment objects named after the table when
    /// the table is renamed from `previous` to `table`.
    fn rename_auto_increment_clauses(
        &self,
        _previous: &str,
        _table: &str,
        _column: &Column,
    ) -> Vec<String> {
        Vec::new()
    }

    /// Allow or forbid explicit values for an identity column.
    fn identity_insert_clause(&self, _table: &str, _enabled: bool) -> Option<String> {
        None
    }

    /// Session statements disabling foreign-key enforcement.
    fn disable_foreign_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Session statements re-enabling foreign-key enforcement.
    fn enable_foreign_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Open a transaction; `None` when DDL is not transactional.
    fn begin_transaction(&self) -> Option<&'static str> {
        self.capabilities().transactional_ddl.then_some("BEGIN")
    }

    /// Commit the transaction.
    fn commit_transaction(&self) -> Option<&'static str> {
        self.capabilities().transactional_ddl.then_some("COMMIT")
    }

    /// Roll the transaction back.
    fn rollback_transaction(&self) -> Option<&'static str> {
        self.capabilities().transactional_ddl.then_some("ROLLBACK")
    }

    /// Trailing `FROM` clause for a `SELECT` with no table.
    fn dual_table(&self) -> Option<&'static str> {
        None
    }

    /// Query returning a positive count when `table` exists.
    fn table_exists_query(&self, table: &str) -> String;

    /// Query returning a positive count when `database` exists, if the
    /// engine can answer it over a connection.
    fn database_exists_query(&self, _database: &str) -> Option<String> {
        None
    }

    /// Create a database.
    fn create_database_clause(&self, database: &str) -> Option<String> {
        self.capabilities()
            .can_create_database
            .then(|| format!("CREATE DATABASE {}", self.quote_ident(database)))
    }

    /// Build an `UnsupportedOperation` error for this dialect.
    fn unsupported(&self, operation: &'static str) -> Error {
        Error::UnsupportedOperation {
            dialect: self.name(),
            operation,
        }
    }
}
