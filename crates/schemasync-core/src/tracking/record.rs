//! Tracking records: the last-applied state of each table.

use crate::error::{Error, Result};
use crate::schema::{Column, ColumnRef, SchemaHash, Value};
use rkyv::{Archive, Deserialize, Serialize};

/// Last-applied state of a column.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct TrackingColumn {
    /// Persistent object id.
    pub internal_id: u64,
    /// Column name as it exists in the database.
    pub name: String,
    /// Ordinal position within the table.
    pub position: u32,
    /// Applied column version.
    pub version: u32,
    /// Applied structural hash.
    pub hash: u64,
    /// Canonical logical type name.
    pub sql_type: String,
    /// Size (length or precision).
    pub size: u32,
    /// Decimal scale.
    pub scale: u32,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Canonical form of the default value.
    pub default_value: Option<String>,
    /// Unique flag.
    pub unique: bool,
    /// Index flag.
    pub indexed: bool,
    /// Primary-key flag.
    pub primary_key: bool,
    /// Auto-increment flag.
    pub auto_increment: bool,
    /// Foreign-key reference, `table:column`.
    pub reference: Option<String>,
    /// Name of the foreign-key constraint, when one was created.
    pub foreign_key_name: Option<String>,
    /// Name of the default constraint, on engines that name them.
    pub default_constraint_name: Option<String>,
}

/// Last-applied state of an index.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct TrackingIndex {
    /// Persistent object id.
    pub internal_id: u64,
    /// Index name as it exists in the database.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

/// Last-applied state of a table.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct TrackingTable {
    /// Persistent object id; survives renames.
    pub internal_id: u64,
    /// Table name as it exists in the database.
    pub name: String,
    /// Applied table version.
    pub version: u32,
    /// Applied aggregate hash.
    pub hash: u64,
    /// Applied seed data version.
    pub data_version: u32,
    /// Columns in position order.
    pub columns: Vec<TrackingColumn>,
    /// Indexes.
    pub indexes: Vec<TrackingIndex>,
}

/// What differs between a tracked column and its desired definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnDelta {
    /// Type, size or scale changed.
    pub type_changed: bool,
    /// NULL/NOT NULL changed.
    pub nullability_changed: bool,
    /// Default value changed.
    pub default_changed: bool,
    /// Foreign-key reference changed.
    pub reference_changed: bool,
    /// Unique or index flag changed.
    pub index_changed: bool,
    /// Primary-key or auto-increment flag changed.
    pub key_changed: bool,
}

impl ColumnDelta {
    /// Check if nothing differs.
    pub fn is_empty(&self) -> bool {
        *self == ColumnDelta::default()
    }

    /// Whether the column definition itself (type, nullability) must be altered.
    pub fn alters_definition(&self) -> bool {
        self.type_changed || self.nullability_changed
    }
}

impl TrackingColumn {
    /// Build a record for `column` as it will exist after the migration.
    pub fn from_column(column: &Column, internal_id: u64, position: u32) -> Self {
        Self {
            internal_id,
            name: column.name.clone(),
            position,
            version: column.version,
            hash: column.hash().0,
            sql_type: column.sql_type.name().to_string(),
            size: column.size,
            scale: column.scale,
            nullable: column.nullable,
            default_value: column.default.as_ref().map(|v| v.canonical()),
            unique: column.unique,
            indexed: column.indexed,
            primary_key: column.primary_key,
            auto_increment: column.auto_increment,
            reference: column.reference.as_ref().map(|r| r.to_string()),
            foreign_key_name: None,
            default_constraint_name: None,
        }
    }

    /// Applied hash.
    pub fn schema_hash(&self) -> SchemaHash {
        SchemaHash(self.hash)
    }

    /// Rebuild a column definition from the record, for columns that are kept
    /// in place after being removed from the desired schema. Key attributes
    /// are not carried over.
    pub fn to_column(&self) -> Result<Column> {
        let mut column = Column::from_type_name(&self.name, &self.sql_type, self.size, self.scale)?;
        column.nullable = self.nullable;
        column.unique = self.unique;
        column.indexed = self.indexed;
        column.version = self.version;
        column.default = match &self.default_value {
            Some(canonical) => Some(Value::from_canonical(canonical).ok_or_else(|| {
                Error::Tracking(format!(
                    "column '{}' has unreadable default '{}'",
                    self.name, canonical
                ))
            })?),
            None => None,
        };
        column.reference = self.reference.as_deref().and_then(ColumnRef::parse);
        Ok(column)
    }

    /// Field-by-field comparison against a desired column.
    pub fn delta(&self, column: &Column) -> ColumnDelta {
        ColumnDelta {
            type_changed: self.sql_type != column.sql_type.name()
                || self.size != column.size
                || self.scale != column.scale,
            nullability_changed: self.nullable != column.nullable,
            default_changed: self.default_value != column.default.as_ref().map(|v| v.canonical()),
            reference_changed: self.reference != column.reference.as_ref().map(|r| r.to_string()),
            index_changed: self.unique != column.unique || self.indexed != column.indexed,
            key_changed: self.primary_key != column.primary_key
                || self.auto_increment != column.auto_increment,
        }
    }
}

impl TrackingTable {
    /// Applied hash.
    pub fn schema_hash(&self) -> SchemaHash {
        SchemaHash(self.hash)
    }

    /// Get a tracked column by name.
    pub fn column(&self, name: &str) -> Option<&TrackingColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get the tracked primary-key column.
    pub fn primary_key(&self) -> Option<&TrackingColumn> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Every tracked table, read once at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSnapshot {
    tables: Vec<TrackingTable>,
    next_id: u64,
    /// Ids below this were read from the store; ids at or above it were
    /// allocated during the current run.
    loaded_below: u64,
}

impl Default for TrackingSnapshot {
    fn default() -> Self {
        Self::from_tables(Vec::new())
    }
}

impl TrackingSnapshot {
    /// Build a snapshot; the id allocator starts above every id in use.
    pub fn from_tables(tables: Vec<TrackingTable>) -> Self {
        let max_id = tables
            .iter()
            .flat_map(|t| {
                std::iter::once(t.internal_id)
                    .chain(t.columns.iter().map(|c| c.internal_id))
                    .chain(t.indexes.iter().map(|i| i.internal_id))
            })
            .max()
            .unwrap_or(0);

        Self {
            tables,
            next_id: max_id + 1,
            loaded_below: max_id + 1,
        }
    }

    /// Tracked tables.
    pub fn tables(&self) -> &[TrackingTable] {
        &self.tables
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Check if `table` was read from the store rather than recorded during
    /// the current run.
    pub fn is_loaded(&self, table: &TrackingTable) -> bool {
        table.internal_id < self.loaded_below
    }

    /// Tables read from the store, excluding records of the current run.
    pub fn loaded_tables(&self) -> impl Iterator<Item = &TrackingTable> {
        self.tables.iter().filter(|t| self.is_loaded(t))
    }

    /// Find a tracked table by its current database name.
    pub fn find_by_name(&self, name: &str) -> Option<&TrackingTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a tracked table by internal id.
    pub fn find_by_id(&self, internal_id: u64) -> Option<&TrackingTable> {
        self.tables.iter().find(|t| t.internal_id == internal_id)
    }

    /// The persisted id of a table, as needed to declare a rename.
    pub fn internal_id_of(&self, name: &str) -> Option<u64> {
        self.find_by_name(name).map(|t| t.internal_id)
    }

    /// Reserve a fresh object id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert or replace the record with the same internal id.
    pub fn upsert(&mut self, table: TrackingTable) {
        self.next_id = self.next_id.max(table.internal_id + 1);
        match self
            .tables
            .iter_mut()
            .find(|t| t.internal_id == table.internal_id)
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;

    fn tracked(id: u64, name: &str) -> TrackingTable {
        let column = Column::new("id", SqlType::Int32).not_null();
        TrackingTable {
            internal_id: id,
            name: name.into(),
            version: 1,
            hash: 7,
            data_version: 0,
            columns: vec![TrackingColumn::from_column(&column, id + 1, 0)],
            indexes: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = TrackingSnapshot::from_tables(vec![tracked(1, "a"), tracked(10, "b")]);

        assert_eq!(snapshot.internal_id_of("b"), Some(10));
        assert!(snapshot.find_by_id(1).is_some());
        assert!(snapshot.find_by_name("c").is_none());
    }

    #[test]
    fn test_allocate_above_existing_ids() {
        let mut snapshot = TrackingSnapshot::from_tables(vec![tracked(1, "a"), tracked(10, "b")]);
        assert_eq!(snapshot.allocate_id(), 12);
        assert_eq!(snapshot.allocate_id(), 13);

        let mut empty = TrackingSnapshot::default();
        assert_eq!(TrackingSnapshot::from_tables(Vec::new()).next_id, 1);
        empty.upsert(tracked(5, "x"));
        assert_eq!(empty.allocate_id(), 6);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut snapshot = TrackingSnapshot::from_tables(vec![tracked(1, "a")]);
        snapshot.upsert(tracked(1, "renamed"));

        assert_eq!(snapshot.tables().len(), 1);
        assert_eq!(snapshot.tables()[0].name, "renamed");
    }

    #[test]
    fn test_column_delta() {
        let column = Column::new("v2_string", SqlType::String).sized(150).unique();
        let record = TrackingColumn::from_column(&column, 1, 0);
        assert!(record.delta(&column).is_empty());
        assert_eq!(record.schema_hash(), column.hash());

        let widened = column.clone().sized(200).indexed();
        let delta = record.delta(&widened);
        assert!(delta.type_changed);
        assert!(delta.index_changed);
        assert!(!delta.nullability_changed);
        assert!(delta.alters_definition());

        let keyed = Column {
            primary_key: true,
            ..column.clone()
        };
        assert!(record.delta(&keyed).key_changed);
    }

    #[test]
    fn test_to_column() {
        let column = Column::new("note", SqlType::String)
            .sized(40)
            .not_null()
            .with_default("n/a")
            .references("other", "code");
        let record = TrackingColumn::from_column(&column, 9, 3);
        let rebuilt = record.to_column().unwrap();

        assert_eq!(rebuilt.hash(), column.hash());
        assert_eq!(rebuilt.name, "note");

        let mut broken = record.clone();
        broken.default_value = Some("garbage".into());
        assert!(matches!(broken.to_column(), Err(Error::Tracking(_))));
    }

    #[test]
    fn test_record_serialization() {
        let table = tracked(3, "sample_t1");
        let bytes = table.to_bytes().unwrap();
        assert_eq!(TrackingTable::from_bytes(&bytes).unwrap(), table);
    }
}
