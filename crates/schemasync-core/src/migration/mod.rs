//! Reconciliation engine.
//!
//! Each desired table is compared with its tracking record and brought up to
//! date in its own transaction:
//!
//! 1. [`diff`] resolves the table's identity (declared renames included) and
//!    classifies every column as unchanged, added, modified, renamed or
//!    removed.
//! 2. [`plan`] turns the classification into a statement script, choosing
//!    between in-place DDL and a [`rebuild`] of the table.
//! 3. [`executor`] runs the scripts, records the new tracking state and
//!    collects a [`MigrationReport`].
//!
//! A table whose tracked hash, version, column versions and seed data
//! version all match is skipped without generating any SQL.
//!
//! # Example
//!
//! ```ignore
//! use schemasync_core::migration::Migrator;
//! use schemasync_core::{DialectKind, MigrationConfig};
//!
//! let mut migrator = Migrator::new(DialectKind::Sqlite.dialect(), MigrationConfig::default());
//! let report = migrator.run(&mut conn, &tables)?;
//! for outcome in &report.outcomes {
//!     println!("{}: {}", outcome.table, outcome.status);
//! }
//! ```

pub mod diff;
pub mod executor;
pub mod plan;
pub mod rebuild;
pub mod report;
pub mod seed;

pub use diff::{ColumnChange, ColumnChangeKind, TableIdentity};
pub use executor::Migrator;
pub use plan::{
    MigrationPlan, MigrationStrategy, PlannedTable, Planner, Statement, TableAction, TablePlan,
};
pub use report::{MigrationReport, TableOutcome, TableStatus};
