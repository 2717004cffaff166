//! Tracking store: the last-applied schema state.
//!
//! The reconciliation engine reads a [`TrackingSnapshot`] once at the start of
//! a run and diffs every desired table against it. After a table migrates, the
//! store records the new state. [`CatalogTrackingStore`] keeps the records in
//! a catalog table inside the target database, written in the same transaction
//! as the table's DDL; [`SledTrackingStore`] keeps them in a local sled tree.

mod catalog;
mod record;
mod sled_store;

pub use catalog::{catalog_table, CatalogTrackingStore};
pub use record::{
    ColumnDelta, TrackingColumn, TrackingIndex, TrackingSnapshot, TrackingTable,
};
pub use sled_store::SledTrackingStore;

use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::Result;

/// Persistence for tracking records.
pub trait TrackingStore {
    /// Make sure the store exists. Returns the statements that created it
    /// (or would have, when `dry_run` is set).
    fn prepare(
        &mut self,
        conn: &mut dyn Connection,
        dialect: &dyn Dialect,
        dry_run: bool,
    ) -> Result<Vec<String>>;

    /// Read every tracked table.
    fn load(&mut self, conn: &mut dyn Connection, dialect: &dyn Dialect) -> Result<TrackingSnapshot>;

    /// Statements persisting `record`, appended to the table's own
    /// transaction. `previous` is the record being replaced, if any.
    fn record_statements(
        &self,
        dialect: &dyn Dialect,
        record: &TrackingTable,
        previous: Option<&TrackingTable>,
    ) -> Vec<String>;

    /// Called once the table's transaction has committed.
    fn committed(&mut self, record: &TrackingTable) -> Result<()>;
}

impl<T: TrackingStore + ?Sized> TrackingStore for Box<T> {
    fn prepare(
        &mut self,
        conn: &mut dyn Connection,
        dialect: &dyn Dialect,
        dry_run: bool,
    ) -> Result<Vec<String>> {
        (**self).prepare(conn, dialect, dry_run)
    }

    fn load(&mut self, conn: &mut dyn Connection, dialect: &dyn Dialect) -> Result<TrackingSnapshot> {
        (**self).load(conn, dialect)
    }

    fn record_statements(
        &self,
        dialect: &dyn Dialect,
        record: &TrackingTable,
        previous: Option<&TrackingTable>,
    ) -> Vec<String> {
        (**self).record_statements(dialect, record, previous)
    }

    fn committed(&mut self, record: &TrackingTable) -> Result<()> {
        (**self).committed(record)
    }
}
