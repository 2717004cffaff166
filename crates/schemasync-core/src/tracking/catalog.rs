//! In-database tracking catalog.
//!
//! One row per tracked object. Tables have `parent_id = 0`; columns and
//! indexes point at their table. The catalog is described with the same
//! schema model as user tables and created through the active dialect.

use super::{TrackingColumn, TrackingIndex, TrackingSnapshot, TrackingStore, TrackingTable};
use crate::connection::{Connection, Row, SqlValue};
use crate::dialect::Dialect;
use crate::error::{Error, Phase, Result};
use crate::schema::{Column, SchemaHash, SqlType, Table};
use tracing::{debug, info};

const OBJECT_TABLE: &str = "TABLE";
const OBJECT_COLUMN: &str = "COLUMN";
const OBJECT_INDEX: &str = "INDEX";

const FLAG_UNIQUE: i64 = 1;
const FLAG_INDEXED: i64 = 2;
const FLAG_PRIMARY_KEY: i64 = 4;
const FLAG_AUTO_INCREMENT: i64 = 8;

const CATALOG_COLUMNS: [&str; 17] = [
    "internal_id",
    "parent_id",
    "object_type",
    "object_name",
    "position",
    "version",
    "hash",
    "sql_type",
    "size",
    "scale",
    "nullable",
    "default_value",
    "flags",
    "reference",
    "foreign_key",
    "default_constraint",
    "data_version",
];

/// Definition of the catalog table.
pub fn catalog_table(name: &str) -> Table {
    Table::new(name, 1)
        .with_comment("schemasync tracking catalog")
        .with_pk_column(Column::new("internal_id", SqlType::Int64))
        .with_column(Column::new("parent_id", SqlType::Int64).not_null().with_default(0))
        .with_column(Column::new("object_type", SqlType::String).sized(10).not_null())
        .with_column(Column::new("object_name", SqlType::String).sized(128).not_null())
        .with_column(Column::new("position", SqlType::Int32).not_null().with_default(0))
        .with_column(Column::new("version", SqlType::Int32).not_null().with_default(1))
        .with_column(Column::new("hash", SqlType::String).sized(16))
        .with_column(Column::new("sql_type", SqlType::String).sized(20))
        .with_column(Column::new("size", SqlType::Int32).not_null().with_default(0))
        .with_column(Column::new("scale", SqlType::Int32).not_null().with_default(0))
        .with_column(Column::new("nullable", SqlType::Boolean).not_null().with_default(true))
        .with_column(Column::new("default_value", SqlType::String).sized(2000))
        .with_column(Column::new("flags", SqlType::Int32).not_null().with_default(0))
        .with_column(Column::new("reference", SqlType::String).sized(1000))
        .with_column(Column::new("foreign_key", SqlType::String).sized(128))
        .with_column(Column::new("default_constraint", SqlType::String).sized(128))
        .with_column(Column::new("data_version", SqlType::Int32).not_null().with_default(0))
        .with_index(format!("IX_{}_parent", name), &["parent_id"])
}

/// Tracking records stored in a catalog table of the target database.
#[derive(Debug, Clone)]
pub struct CatalogTrackingStore {
    table: Table,
    create_if_missing: bool,
    present: bool,
}

impl CatalogTrackingStore {
    /// Default catalog table name.
    pub const DEFAULT_TABLE: &'static str = "ddl_objects";

    /// Create a store over the catalog table `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: catalog_table(&name.into()),
            create_if_missing: true,
            present: false,
        }
    }

    /// Control whether a missing catalog is created.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Catalog table name.
    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    fn select_sql(&self, d: &dyn Dialect) -> String {
        let columns: Vec<String> = CATALOG_COLUMNS.iter().map(|c| d.quote_ident(c)).collect();
        format!(
            "SELECT {} FROM {} ORDER BY {}, {}, {}",
            columns.join(", "),
            d.quote_ident(&self.table.name),
            d.quote_ident("parent_id"),
            d.quote_ident("position"),
            d.quote_ident("internal_id")
        )
    }

    fn insert_sql(&self, d: &dyn Dialect, values: Vec<String>) -> String {
        let columns: Vec<String> = CATALOG_COLUMNS.iter().map(|c| d.quote_ident(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            d.quote_ident(&self.table.name),
            columns.join(", "),
            values.join(", ")
        )
    }

    fn table_row(&self, d: &dyn Dialect, t: &TrackingTable) -> String {
        self.insert_sql(
            d,
            vec![
                t.internal_id.to_string(),
                "0".to_string(),
                text(d, OBJECT_TABLE),
                text(d, &t.name),
                "0".to_string(),
                t.version.to_string(),
                text(d, &t.schema_hash().to_string()),
                "NULL".to_string(),
                "0".to_string(),
                "0".to_string(),
                boolean(d, false),
                "NULL".to_string(),
                "0".to_string(),
                "NULL".to_string(),
                "NULL".to_string(),
                "NULL".to_string(),
                t.data_version.to_string(),
            ],
        )
    }

    fn column_row(&self, d: &dyn Dialect, parent: u64, c: &TrackingColumn) -> String {
        let mut flags = 0;
        if c.unique {
            flags |= FLAG_UNIQUE;
        }
        if c.indexed {
            flags |= FLAG_INDEXED;
        }
        if c.primary_key {
            flags |= FLAG_PRIMARY_KEY;
        }
        if c.auto_increment {
            flags |= FLAG_AUTO_INCREMENT;
        }

        self.insert_sql(
            d,
            vec![
                c.internal_id.to_string(),
                parent.to_string(),
                text(d, OBJECT_COLUMN),
                text(d, &c.name),
                c.position.to_string(),
                c.version.to_string(),
                text(d, &c.schema_hash().to_string()),
                text(d, &c.sql_type),
                c.size.to_string(),
                c.scale.to_string(),
                boolean(d, c.nullable),
                opt_text(d, c.default_value.as_deref()),
                flags.to_string(),
                opt_text(d, c.reference.as_deref()),
                opt_text(d, c.foreign_key_name.as_deref()),
                opt_text(d, c.default_constraint_name.as_deref()),
                "0".to_string(),
            ],
        )
    }

    fn index_row(&self, d: &dyn Dialect, parent: u64, position: usize, i: &TrackingIndex) -> String {
        self.insert_sql(
            d,
            vec![
                i.internal_id.to_string(),
                parent.to_string(),
                text(d, OBJECT_INDEX),
                text(d, &i.name),
                position.to_string(),
                "1".to_string(),
                "NULL".to_string(),
                "NULL".to_string(),
                "0".to_string(),
                "0".to_string(),
                boolean(d, false),
                "NULL".to_string(),
                (if i.unique { FLAG_UNIQUE } else { 0 }).to_string(),
                text(d, &serde_json::Value::from(i.columns.clone()).to_string()),
                "NULL".to_string(),
                "NULL".to_string(),
                "0".to_string(),
            ],
        )
    }
}

impl Default for CatalogTrackingStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TABLE)
    }
}

fn text(d: &dyn Dialect, s: &str) -> String {
    d.native_literal(&s.into())
}

fn opt_text(d: &dyn Dialect, s: Option<&str>) -> String {
    s.map(|s| text(d, s)).unwrap_or_else(|| "NULL".to_string())
}

fn boolean(d: &dyn Dialect, b: bool) -> String {
    d.native_literal(&b.into())
}

fn catalog_error(message: impl Into<String>) -> Error {
    Error::Tracking(message.into())
}

/// Index columns are kept as a JSON list so names may contain commas.
fn index_columns(encoded: &str) -> Result<Vec<String>> {
    serde_json::from_str(encoded)
        .map_err(|e| catalog_error(format!("invalid index column list '{}': {}", encoded, e)))
}

fn int(row: &Row, idx: usize) -> Result<i64> {
    row.get(idx)
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| catalog_error(format!("catalog field '{}' is not an integer", CATALOG_COLUMNS[idx])))
}

fn uint<T: TryFrom<i64>>(row: &Row, idx: usize) -> Result<T> {
    T::try_from(int(row, idx)?)
        .map_err(|_| catalog_error(format!("catalog field '{}' is out of range", CATALOG_COLUMNS[idx])))
}

fn opt_string(row: &Row, idx: usize) -> Option<String> {
    row.get(idx).and_then(SqlValue::as_text)
}

fn string(row: &Row, idx: usize) -> Result<String> {
    opt_string(row, idx)
        .ok_or_else(|| catalog_error(format!("catalog field '{}' is empty", CATALOG_COLUMNS[idx])))
}

fn flag(row: &Row, idx: usize) -> bool {
    match row.get(idx) {
        Some(SqlValue::Text(s)) => matches!(s.as_str(), "1" | "t" | "true" | "TRUE"),
        Some(value) => value.as_i64().unwrap_or(0) != 0,
        None => false,
    }
}

fn hash(row: &Row, idx: usize) -> Result<u64> {
    let hex = string(row, idx)?;
    SchemaHash::from_hex(&hex)
        .map(|h| h.0)
        .ok_or_else(|| catalog_error(format!("invalid hash '{}'", hex)))
}

/// Assemble tracking records from catalog rows.
fn assemble(rows: Vec<Row>) -> Result<Vec<TrackingTable>> {
    let mut tables = Vec::new();
    let mut children = Vec::new();

    for row in rows {
        if row.len() < CATALOG_COLUMNS.len() {
            return Err(catalog_error(format!(
                "catalog row has {} fields, expected {}",
                row.len(),
                CATALOG_COLUMNS.len()
            )));
        }
        let object_type = string(&row, 2)?;
        if object_type == OBJECT_TABLE {
            tables.push(TrackingTable {
                internal_id: uint(&row, 0)?,
                name: string(&row, 3)?,
                version: uint(&row, 5)?,
                hash: hash(&row, 6)?,
                data_version: uint(&row, 16)?,
                columns: Vec::new(),
                indexes: Vec::new(),
            });
        } else {
            children.push((object_type, row));
        }
    }

    for (object_type, row) in children {
        let parent: u64 = uint(&row, 1)?;
        let table = tables
            .iter_mut()
            .find(|t| t.internal_id == parent)
            .ok_or_else(|| catalog_error(format!("catalog row refers to unknown table {}", parent)))?;

        match object_type.as_str() {
            OBJECT_COLUMN => {
                let flags = int(&row, 12)?;
                table.columns.push(TrackingColumn {
                    internal_id: uint(&row, 0)?,
                    name: string(&row, 3)?,
                    position: uint(&row, 4)?,
                    version: uint(&row, 5)?,
                    hash: hash(&row, 6)?,
                    sql_type: string(&row, 7)?,
                    size: uint(&row, 8)?,
                    scale: uint(&row, 9)?,
                    nullable: flag(&row, 10),
                    default_value: opt_string(&row, 11),
                    unique: flags & FLAG_UNIQUE != 0,
                    indexed: flags & FLAG_INDEXED != 0,
                    primary_key: flags & FLAG_PRIMARY_KEY != 0,
                    auto_increment: flags & FLAG_AUTO_INCREMENT != 0,
                    reference: opt_string(&row, 13),
                    foreign_key_name: opt_string(&row, 14),
                    default_constraint_name: opt_string(&row, 15),
                });
            }
            OBJECT_INDEX => {
                table.indexes.push(TrackingIndex {
                    internal_id: uint(&row, 0)?,
                    name: string(&row, 3)?,
                    columns: index_columns(&string(&row, 13)?)?,
                    unique: int(&row, 12)? & FLAG_UNIQUE != 0,
                });
            }
            other => {
                return Err(catalog_error(format!("unknown catalog object type '{}'", other)));
            }
        }
    }

    for table in &mut tables {
        table.columns.sort_by_key(|c| c.position);
    }
    Ok(tables)
}

impl TrackingStore for CatalogTrackingStore {
    fn prepare(
        &mut self,
        conn: &mut dyn Connection,
        dialect: &dyn Dialect,
        dry_run: bool,
    ) -> Result<Vec<String>> {
        let exists = conn
            .query_i64(&dialect.table_exists_query(&self.table.name))?
            .unwrap_or(0)
            > 0;
        if exists {
            self.present = true;
            return Ok(Vec::new());
        }
        if !self.create_if_missing {
            return Err(catalog_error(format!(
                "tracking catalog '{}' does not exist",
                self.table.name
            )));
        }

        let mut statements = dialect.create_table_clause(&self.table);
        for index in self.table.effective_indexes() {
            statements.push(dialect.create_index_clause(&self.table, &index));
        }

        if dry_run {
            debug!(catalog = %self.table.name, "tracking catalog missing, dry run");
            return Ok(statements);
        }

        for sql in &statements {
            conn.execute_sql(sql).map_err(|e| Error::MigrationExecution {
                table: self.table.name.clone(),
                phase: Phase::Tracking,
                message: e.message,
                statement: sql.clone(),
                script: statements.clone(),
            })?;
        }
        self.present = true;
        info!(catalog = %self.table.name, "created tracking catalog");
        Ok(statements)
    }

    fn load(&mut self, conn: &mut dyn Connection, dialect: &dyn Dialect) -> Result<TrackingSnapshot> {
        if !self.present {
            return Ok(TrackingSnapshot::default());
        }
        let rows = conn.query_rows(&self.select_sql(dialect))?;
        let tables = assemble(rows)?;
        debug!(catalog = %self.table.name, tables = tables.len(), "loaded tracking catalog");
        Ok(TrackingSnapshot::from_tables(tables))
    }

    fn record_statements(
        &self,
        dialect: &dyn Dialect,
        record: &TrackingTable,
        previous: Option<&TrackingTable>,
    ) -> Vec<String> {
        let d = dialect;
        let catalog = d.quote_ident(&self.table.name);
        let mut statements = Vec::new();

        match previous {
            Some(previous) => {
                statements.push(format!(
                    "UPDATE {} SET {} = {}, {} = {}, {} = {}, {} = {} WHERE {} = {}",
                    catalog,
                    d.quote_ident("object_name"),
                    text(d, &record.name),
                    d.quote_ident("version"),
                    record.version,
                    d.quote_ident("hash"),
                    text(d, &record.schema_hash().to_string()),
                    d.quote_ident("data_version"),
                    record.data_version,
                    d.quote_ident("internal_id"),
                    previous.internal_id
                ));
                statements.push(format!(
                    "DELETE FROM {} WHERE {} = {}",
                    catalog,
                    d.quote_ident("parent_id"),
                    previous.internal_id
                ));
            }
            None => statements.push(self.table_row(d, record)),
        }

        for column in &record.columns {
            statements.push(self.column_row(d, record.internal_id, column));
        }
        for (position, index) in record.indexes.iter().enumerate() {
            statements.push(self.index_row(d, record.internal_id, position, index));
        }
        statements
    }

    fn committed(&mut self, _record: &TrackingTable) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RecordingConnection;
    use crate::dialect::{DialectKind, SqliteDialect};

    fn sample_record() -> TrackingTable {
        let id = Column::new("id", SqlType::Int32).not_null().auto_increment();
        let id = Column {
            primary_key: true,
            ..id
        };
        let name = Column::new("name", SqlType::String).sized(150).unique().with_default("x");
        let mut name_record = TrackingColumn::from_column(&name, 3, 1);
        name_record.default_constraint_name = Some("DF_sample_t1_name".into());

        TrackingTable {
            internal_id: 1,
            name: "sample_t1".into(),
            version: 2,
            hash: 0xdead_beef,
            data_version: 1,
            columns: vec![TrackingColumn::from_column(&id, 2, 0), name_record],
            indexes: vec![TrackingIndex {
                internal_id: 4,
                name: "UX_sample_t1_name".into(),
                columns: vec!["name".into()],
                unique: true,
            }],
        }
    }

    #[test]
    fn test_catalog_table_is_valid_in_every_dialect() {
        let table = catalog_table(CatalogTrackingStore::DEFAULT_TABLE);
        assert!(table.validate().is_ok());
        for kind in DialectKind::ALL {
            let statements = kind.dialect().create_table_clause(&table);
            assert!(statements[0].contains("ddl_objects"), "{kind}");
        }
    }

    #[test]
    fn test_missing_catalog_in_dry_run() {
        let mut store = CatalogTrackingStore::default();
        let mut conn = RecordingConnection::new();
        let statements = store.prepare(&mut conn, &SqliteDialect, true).unwrap();

        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE \"ddl_objects\""));
        assert!(conn.executed().is_empty());
        assert!(store.load(&mut conn, &SqliteDialect).unwrap().is_empty());
    }

    #[test]
    fn test_missing_catalog_not_created_when_disabled() {
        let mut store = CatalogTrackingStore::default().with_create_if_missing(false);
        let mut conn = RecordingConnection::new();
        assert!(matches!(
            store.prepare(&mut conn, &SqliteDialect, false),
            Err(Error::Tracking(_))
        ));
    }

    #[test]
    fn test_update_keeps_table_row() {
        let store = CatalogTrackingStore::default();
        let record = sample_record();
        let statements = store.record_statements(&SqliteDialect, &record, Some(&record));

        assert!(statements[0].starts_with("UPDATE \"ddl_objects\" SET \"object_name\" = 'sample_t1'"));
        assert_eq!(statements[1], "DELETE FROM \"ddl_objects\" WHERE \"parent_id\" = 1");
        assert_eq!(statements.len(), 5);

        let fresh = store.record_statements(&SqliteDialect, &record, None);
        assert!(fresh[0].starts_with("INSERT INTO \"ddl_objects\""));
        assert_eq!(fresh.len(), 4);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_catalog_round_trip_on_sqlite() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let mut store = CatalogTrackingStore::default();
        let created = store.prepare(&mut conn, &SqliteDialect, false).unwrap();
        assert_eq!(created.len(), 2);

        let record = sample_record();
        for sql in store.record_statements(&SqliteDialect, &record, None) {
            conn.execute_sql(&sql).unwrap();
        }

        let snapshot = store.load(&mut conn, &SqliteDialect).unwrap();
        assert_eq!(snapshot.tables(), &[record.clone()]);

        let mut renamed = record.clone();
        renamed.name = "sample_t11".into();
        renamed.version = 3;
        for sql in store.record_statements(&SqliteDialect, &renamed, Some(&record)) {
            conn.execute_sql(&sql).unwrap();
        }

        let mut reopened = CatalogTrackingStore::default();
        assert!(reopened.prepare(&mut conn, &SqliteDialect, false).unwrap().is_empty());
        let snapshot = reopened.load(&mut conn, &SqliteDialect).unwrap();
        assert_eq!(snapshot.tables(), &[renamed]);
        assert_eq!(snapshot.internal_id_of("sample_t11"), Some(1));
    }

    #[test]
    fn test_index_columns_are_stored_as_json_list() {
        let mut record = sample_record();
        record.indexes[0].columns = vec!["name".into(), "a,b".into()];
        let store = CatalogTrackingStore::default();
        let statements = store.record_statements(&SqliteDialect, &record, None);
        assert!(statements[3].contains("'[\"name\",\"a,b\"]'"));

        assert_eq!(index_columns("[\"name\",\"a,b\"]").unwrap(), vec!["name", "a,b"]);
        assert!(matches!(index_columns("name,a"), Err(Error::Tracking(_))));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_index_with_comma_in_column_name_round_trips() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let mut store = CatalogTrackingStore::default();
        store.prepare(&mut conn, &SqliteDialect, false).unwrap();

        let mut record = sample_record();
        record.indexes[0].columns = vec!["name".into(), "a,b".into()];
        for sql in store.record_statements(&SqliteDialect, &record, None) {
            conn.execute_sql(&sql).unwrap();
        }

        let snapshot = store.load(&mut conn, &SqliteDialect).unwrap();
        assert_eq!(snapshot.tables()[0].indexes[0].columns, vec!["name", "a,b"]);
    }
}
