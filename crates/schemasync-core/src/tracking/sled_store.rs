//! Tracking records in a local sled tree.

use super::{TrackingSnapshot, TrackingStore, TrackingTable};
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Tracking store kept outside the target database.
///
/// Useful for planning against engines with no driver in this build, and for
/// deployments where the migrating account cannot own a catalog table.
pub struct SledTrackingStore {
    tree: sled::Tree,
}

impl SledTrackingStore {
    /// Tree name for tracking records.
    pub const TREE_NAME: &'static str = "schemasync:tracking";

    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    /// Open the tracking tree of an existing database.
    pub fn from_db(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Open a throwaway in-memory store.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    /// Read one record.
    pub fn get(&self, internal_id: u64) -> Result<Option<TrackingTable>> {
        match self.tree.get(Self::key(internal_id))? {
            Some(bytes) => Ok(Some(TrackingTable::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record, ordered by internal id.
    pub fn list(&self) -> Result<Vec<TrackingTable>> {
        let mut tables = Vec::new();
        for result in self.tree.iter() {
            let (_, value) = result?;
            tables.push(TrackingTable::from_bytes(&value)?);
        }
        Ok(tables)
    }

    fn key(internal_id: u64) -> [u8; 8] {
        internal_id.to_be_bytes()
    }
}

impl TrackingStore for SledTrackingStore {
    fn prepare(
        &mut self,
        _conn: &mut dyn Connection,
        _dialect: &dyn Dialect,
        _dry_run: bool,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn load(&mut self, _conn: &mut dyn Connection, _dialect: &dyn Dialect) -> Result<TrackingSnapshot> {
        Ok(TrackingSnapshot::from_tables(self.list()?))
    }

    fn record_statements(
        &self,
        _dialect: &dyn Dialect,
        _record: &TrackingTable,
        _previous: Option<&TrackingTable>,
    ) -> Vec<String> {
        Vec::new()
    }

    fn committed(&mut self, record: &TrackingTable) -> Result<()> {
        self.tree
            .insert(Self::key(record.internal_id), record.to_bytes()?)?;
        self.tree.flush()?;
        debug!(table = %record.name, internal_id = record.internal_id, "tracking record stored");
        Ok(())
    }
}
