//! Run configuration and connection strings.

use crate::dialect::DialectKind;
use crate::error::{Error, Result};
use crate::tracking::CatalogTrackingStore;

/// Options for a migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Plan only; nothing is executed.
    pub dry_run: bool,

    /// Drop tracked columns that are no longer declared. When unset they are
    /// left in place and logged.
    pub drop_removed_columns: bool,

    /// Insert seed rows whose data version is newer than the tracked one.
    pub apply_seed_data: bool,

    /// Create the tracking catalog when it does not exist.
    pub create_tracking_catalog: bool,

    /// Name of the tracking catalog table.
    pub tracking_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            drop_removed_columns: false,
            apply_seed_data: true,
            create_tracking_catalog: true,
            tracking_table: CatalogTrackingStore::DEFAULT_TABLE.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Plan without executing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Drop removed columns instead of keeping them.
    pub fn with_drop_removed_columns(mut self, drop: bool) -> Self {
        self.drop_removed_columns = drop;
        self
    }

    /// Enable or disable seed data.
    pub fn with_seed_data(mut self, apply: bool) -> Self {
        self.apply_seed_data = apply;
        self
    }

    /// Enable or disable catalog creation.
    pub fn with_create_tracking_catalog(mut self, create: bool) -> Self {
        self.create_tracking_catalog = create;
        self
    }

    /// Use a different catalog table.
    pub fn with_tracking_table(mut self, table: impl Into<String>) -> Self {
        self.tracking_table = table.into();
        self
    }
}

/// A parsed `key=value;` connection string.
///
/// Keys are case-insensitive. Recognised keys: `Provider`,
/// `Data Source`/`Server`/`Host`, `Database`/`Initial Catalog`,
/// `User Id`/`Uid`/`User`, `Password`/`Pwd`. Other keys are kept in
/// [`ConnectionInfo::options`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Provider identifier used for dialect dispatch.
    pub provider: Option<String>,
    /// Server, host or database file.
    pub data_source: Option<String>,
    /// Database (catalog) name.
    pub database: Option<String>,
    /// Login.
    pub user: Option<String>,
    /// Password. Never shown by `Debug`.
    pub password: Option<String>,
    /// Remaining entries, in order.
    pub options: Vec<(String, String)>,
}

impl ConnectionInfo {
    /// Parse a connection string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut info = ConnectionInfo::default();

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("malformed connection string entry '{}'", part)))?;
            let value = value.trim().trim_matches('"').to_string();
            let key = key.trim();

            match key.to_ascii_lowercase().as_str() {
                "provider" | "providername" => info.provider = Some(value),
                "data source" | "datasource" | "server" | "host" => info.data_source = Some(value),
                "database" | "initial catalog" => info.database = Some(value),
                "user id" | "userid" | "uid" | "user" | "username" => info.user = Some(value),
                "password" | "pwd" => info.password = Some(value),
                _ => info.options.push((key.to_string(), value)),
            }
        }

        if info.provider.is_none() {
            return Err(Error::Config("connection string has no Provider".to_string()));
        }
        Ok(info)
    }

    /// Select the dialect from the provider name.
    pub fn dialect_kind(&self) -> Result<DialectKind> {
        let provider = self
            .provider
            .as_deref()
            .ok_or_else(|| Error::Config("connection string has no Provider".to_string()))?;
        provider.parse()
    }

    /// The database name, falling back to the data source.
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().or(self.data_source.as_deref())
    }

    /// Look up an unrecognised option, case-insensitively.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("provider", &self.provider)
            .field("data_source", &self.data_source)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MigrationConfig::default();
        assert!(!config.dry_run);
        assert!(!config.drop_removed_columns);
        assert!(config.apply_seed_data);
        assert_eq!(config.tracking_table, "ddl_objects");

        let config = config.with_dry_run(true).with_tracking_table("meta");
        assert!(config.dry_run);
        assert_eq!(config.tracking_table, "meta");
    }

    #[test]
    fn test_parse_connection_string() {
        let info = ConnectionInfo::parse(
            "Provider=System.Data.SqlClient; Server=db01;Initial Catalog=sales;User Id=app;Password=s3cret;Encrypt=true",
        )
        .unwrap();

        assert_eq!(info.dialect_kind().unwrap(), DialectKind::SqlServer);
        assert_eq!(info.data_source.as_deref(), Some("db01"));
        assert_eq!(info.database_name(), Some("sales"));
        assert_eq!(info.user.as_deref(), Some("app"));
        assert_eq!(info.option("encrypt"), Some("true"));
        assert!(!format!("{:?}", info).contains("s3cret"));
    }

    #[test]
    fn test_parse_sqlite_path() {
        let info = ConnectionInfo::parse("provider=sqlite;data source=\"/tmp/app.db\"").unwrap();
        assert_eq!(info.dialect_kind().unwrap(), DialectKind::Sqlite);
        assert_eq!(info.database_name(), Some("/tmp/app.db"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ConnectionInfo::parse("Server=db01"),
            Err(Error::Config(_))
        ));
        assert!(ConnectionInfo::parse("Provider=oracle;garbage").is_err());

        let info = ConnectionInfo::parse("Provider=MySql.Data").unwrap();
        assert!(info.dialect_kind().is_err());
    }
}
