//! Database provisioning.
//!
//! Creates the target database before the first migration. SQLite databases
//! are files; the other engines are asked over a connection to the server.
//! Oracle schemas are users and must be provisioned out of band.

use crate::config::ConnectionInfo;
use crate::connection::Connection;
use crate::dialect::{Dialect, DialectKind};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::info;

const SQLITE_MEMORY: &str = ":memory:";

fn database_name(dialect: &dyn Dialect, info: &ConnectionInfo) -> Result<String> {
    info.database_name()
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config(format!(
                "{} connection string names no database",
                dialect.name()
            ))
        })
}

/// Check whether the database named by `info` exists.
pub fn database_exists(
    conn: &mut dyn Connection,
    dialect: &dyn Dialect,
    info: &ConnectionInfo,
) -> Result<bool> {
    let database = database_name(dialect, info)?;
    if dialect.kind() == DialectKind::Sqlite {
        return Ok(database == SQLITE_MEMORY || Path::new(&database).exists());
    }
    match dialect.database_exists_query(&database) {
        Some(query) => Ok(conn.query_i64(&query)?.unwrap_or(0) > 0),
        None => Ok(false),
    }
}

/// Create the database named by `info` unless it exists.
///
/// Returns `true` when a database was created. `conn` must point at the
/// server rather than the database itself; it is unused for SQLite.
pub fn create_database(
    conn: &mut dyn Connection,
    dialect: &dyn Dialect,
    info: &ConnectionInfo,
) -> Result<bool> {
    let database = database_name(dialect, info)?;
    if !dialect.capabilities().can_create_database {
        return Err(Error::Provisioning {
            dialect: dialect.name(),
            database,
        });
    }
    if database_exists(conn, dialect, info)? {
        info!(dialect = dialect.name(), database = %database, "database already exists");
        return Ok(false);
    }

    if dialect.kind() == DialectKind::Sqlite {
        let path = Path::new(&database);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
    } else {
        let sql = dialect
            .create_database_clause(&database)
            .ok_or(Error::Provisioning {
                dialect: dialect.name(),
                database: database.clone(),
            })?;
        conn.execute_sql(&sql)?;
    }

    info!(dialect = dialect.name(), database = %database, "database created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{RecordingConnection, SqlValue};
    use crate::dialect::{OracleDialect, PostgresDialect, SqliteDialect};

    #[test]
    fn test_oracle_cannot_provision() {
        let info = ConnectionInfo::parse("Provider=Oracle;Data Source=xe;User Id=app").unwrap();
        let err = create_database(&mut RecordingConnection::new(), &OracleDialect, &info).unwrap_err();
        assert!(matches!(err, Error::Provisioning { dialect: "oracle", .. }));
    }

    #[test]
    fn test_postgres_creates_missing_database() {
        let info = ConnectionInfo::parse("Provider=Npgsql;Host=db;Database=sales").unwrap();

        let mut conn = RecordingConnection::new();
        assert!(create_database(&mut conn, &PostgresDialect, &info).unwrap());
        assert_eq!(conn.executed(), &["CREATE DATABASE \"sales\"".to_string()]);

        let mut conn = RecordingConnection::new()
            .with_response("pg_database", vec![vec![SqlValue::Integer(1)]]);
        assert!(!create_database(&mut conn, &PostgresDialect, &info).unwrap());
        assert!(conn.executed().is_empty());
    }

    #[test]
    fn test_sqlite_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let info =
            ConnectionInfo::parse(&format!("Provider=sqlite;Data Source={}", path.display())).unwrap();
        let mut conn = RecordingConnection::new();

        assert!(!database_exists(&mut conn, &SqliteDialect, &info).unwrap());
        assert!(create_database(&mut conn, &SqliteDialect, &info).unwrap());
        assert!(path.exists());
        assert!(!create_database(&mut conn, &SqliteDialect, &info).unwrap());
    }
}
