//! Entry point binding a set of tables to a target database.

use crate::config::{ConnectionInfo, MigrationConfig};
use crate::connection::Connection;
use crate::dialect::DialectKind;
use crate::error::Result;
use crate::migration::{MigrationPlan, MigrationReport, Migrator};
use crate::schema::Table;
use crate::tracking::TrackingStore;

/// Collects desired tables and migrates them against one database.
///
/// The dialect is selected from the connection string's provider. Tables
/// migrate in registration order, so referenced tables should be registered
/// before the tables that reference them.
///
/// ```ignore
/// let report = SchemaBuilder::new("Provider=sqlite;Data Source=app.db")?
///     .table(countries())
///     .table(customers())
///     .run(&mut conn)?;
/// ```
pub struct SchemaBuilder {
    kind: DialectKind,
    info: Option<ConnectionInfo>,
    config: MigrationConfig,
    store: Option<Box<dyn TrackingStore>>,
    tables: Vec<Table>,
}

impl SchemaBuilder {
    /// Create a builder from a connection string.
    pub fn new(connection_string: &str) -> Result<Self> {
        let info = ConnectionInfo::parse(connection_string)?;
        let mut builder = Self::for_dialect(info.dialect_kind()?);
        builder.info = Some(info);
        Ok(builder)
    }

    /// Create a builder for an engine without a connection string.
    pub fn for_dialect(kind: DialectKind) -> Self {
        Self {
            kind,
            info: None,
            config: MigrationConfig::default(),
            store: None,
            tables: Vec::new(),
        }
    }

    /// Set the run configuration.
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Track state somewhere other than the in-database catalog.
    pub fn with_tracking_store(mut self, store: impl TrackingStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Register a table.
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Register several tables.
    pub fn tables(mut self, tables: impl IntoIterator<Item = Table>) -> Self {
        self.tables.extend(tables);
        self
    }

    /// The selected engine.
    pub fn dialect_kind(&self) -> DialectKind {
        self.kind
    }

    /// The parsed connection string, if the builder was created from one.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// Registered tables.
    pub fn registered(&self) -> &[Table] {
        &self.tables
    }

    fn into_parts(self) -> (Migrator, Vec<Table>) {
        let migrator = Migrator::new(self.kind.dialect(), self.config);
        let migrator = match self.store {
            Some(store) => migrator.with_store(store),
            None => migrator,
        };
        (migrator, self.tables)
    }

    /// Plan the migration without executing it.
    pub fn plan(self, conn: &mut dyn Connection) -> Result<MigrationPlan> {
        let (mut migrator, tables) = self.into_parts();
        migrator.plan(conn, &tables)
    }

    /// Run the migration.
    pub fn run(self, conn: &mut dyn Connection) -> Result<MigrationReport> {
        let (mut migrator, tables) = self.into_parts();
        migrator.run(conn, &tables)
    }

    /// Open the SQLite database named by the connection string.
    #[cfg(feature = "sqlite")]
    pub fn open_sqlite(&self) -> Result<rusqlite::Connection> {
        let info = self.info.as_ref().ok_or_else(|| {
            crate::error::Error::Config("builder has no connection string".to_string())
        })?;
        crate::connection::open_sqlite(info)
    }
}
