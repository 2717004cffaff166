//! Database connection boundary.
//!
//! The engine only needs to run statements and read back small result sets
//! (tracking rows, existence probes). Pooling, transactions across tables and
//! unit-of-work propagation belong to the caller.

use std::collections::HashMap;
use thiserror::Error;

/// An error reported by the database engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    /// Engine message.
    pub message: String,
}

impl EngineError {
    /// Create an engine error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A value read back from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,
    /// Integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Interpret as an integer. Text holding digits is accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret as text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// Check if this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// One result row.
pub type Row = Vec<SqlValue>;

/// A live connection to the target database.
pub trait Connection {
    /// Execute a statement that returns no rows.
    fn execute_sql(&mut self, sql: &str) -> Result<(), EngineError>;

    /// Run a query and collect every row.
    fn query_rows(&mut self, sql: &str) -> Result<Vec<Row>, EngineError>;

    /// Run a query returning a single integer (counts, existence probes).
    fn query_i64(&mut self, sql: &str) -> Result<Option<i64>, EngineError> {
        let rows = self.query_rows(sql)?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64))
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::{Connection, EngineError, Row, SqlValue};
    use rusqlite::types::ValueRef;

    impl From<rusqlite::Error> for EngineError {
        fn from(err: rusqlite::Error) -> Self {
            EngineError::new(err.to_string())
        }
    }

    impl From<ValueRef<'_>> for SqlValue {
        fn from(value: ValueRef<'_>) -> Self {
            match value {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Integer(i) => SqlValue::Integer(i),
                ValueRef::Real(f) => SqlValue::Real(f),
                ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
            }
        }
    }

    impl Connection for rusqlite::Connection {
        fn execute_sql(&mut self, sql: &str) -> Result<(), EngineError> {
            self.execute_batch(sql)?;
            Ok(())
        }

        fn query_rows(&mut self, sql: &str) -> Result<Vec<Row>, EngineError> {
            let mut stmt = self.prepare(sql)?;
            let count = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    (0..count)
                        .map(|idx| row.get_ref(idx).map(SqlValue::from))
                        .collect::<rusqlite::Result<Row>>()
                })?
                .collect::<rusqlite::Result<Vec<Row>>>()?;
            Ok(rows)
        }
    }
}

/// Open the SQLite database named by `info`; `:memory:` opens a private
/// in-memory database.
#[cfg(feature = "sqlite")]
pub fn open_sqlite(info: &crate::config::ConnectionInfo) -> crate::error::Result<rusqlite::Connection> {
    let path = info
        .database_name()
        .ok_or_else(|| crate::error::Error::Config("connection string names no database".to_string()))?;
    let conn = if path == ":memory:" {
        rusqlite::Connection::open_in_memory()
    } else {
        rusqlite::Connection::open(path)
    };
    conn.map_err(|e| EngineError::from(e).into())
}

/// A connection that records statements instead of running them.
///
/// Used for dry runs and for planning against engines with no driver linked
/// into this build. Queries return pre-registered rows matched by substring.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    executed: Vec<String>,
    responses: HashMap<String, Vec<Row>>,
    fail_on: Option<String>,
}

impl RecordingConnection {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `pattern` with `rows`.
    pub fn with_response(mut self, pattern: impl Into<String>, rows: Vec<Row>) -> Self {
        self.responses.insert(pattern.into(), rows);
        self
    }

    /// Fail any statement containing `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_on = Some(pattern.into());
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    fn check_failure(&self, sql: &str) -> Result<(), EngineError> {
        match &self.fail_on {
            Some(pattern) if sql.contains(pattern.as_str()) => {
                Err(EngineError::new(format!("forced failure on '{}'", pattern)))
            }
            _ => Ok(()),
        }
    }
}

impl Connection for RecordingConnection {
    fn execute_sql(&mut self, sql: &str) -> Result<(), EngineError> {
        self.executed.push(sql.to_string());
        self.check_failure(sql)
    }

    fn query_rows(&mut self, sql: &str) -> Result<Vec<Row>, EngineError> {
        self.check_failure(sql)?;
        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}
