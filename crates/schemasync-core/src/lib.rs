//! schemasync core: schema model, SQL dialects and the reconciliation engine.
//!
//! Application code declares the tables it needs; the engine compares them
//! with the live database's tracking catalog and emits the DDL/DML that
//! brings each table up to date, on Oracle, SQL Server, PostgreSQL and
//! SQLite. Engines that cannot alter a column in place get a
//! rebuild-copy-swap instead.

pub mod builder;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod migration;
pub mod provision;
pub mod schema;
pub mod tracking;

pub use builder::SchemaBuilder;
pub use config::{ConnectionInfo, MigrationConfig};
pub use connection::{Connection, EngineError, RecordingConnection, Row, SqlValue};
pub use dialect::{
    Capabilities, Dialect, DialectKind, OracleDialect, PostgresDialect, SqlServerDialect,
    SqliteDialect,
};
pub use error::{Error, Phase, Result};
pub use migration::{
    ColumnChange, ColumnChangeKind, MigrationPlan, MigrationReport, MigrationStrategy, Migrator,
    TableAction, TableOutcome, TablePlan, TableStatus,
};
pub use schema::{Column, ColumnRef, IndexDef, SchemaHash, SeedData, SqlType, Table, TableRename, Value};
pub use tracking::{
    CatalogTrackingStore, SledTrackingStore, TrackingColumn, TrackingSnapshot, TrackingStore,
    TrackingTable,
};
