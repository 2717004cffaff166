//! Core error types.

use thiserror::Error;

/// Phase of a table migration in which a statement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Diffing and script generation.
    Plan,
    /// Session setup outside the transaction (foreign-key switches).
    Prologue,
    /// Transaction control statements.
    Transaction,
    /// Structural DDL (create, alter, rename, drop).
    Ddl,
    /// Row copy from the rebuilt table.
    Copy,
    /// Seed data inserts.
    Seed,
    /// Tracking catalog writes.
    Tracking,
    /// Session teardown after the transaction.
    Epilogue,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Plan => write!(f, "plan"),
            Phase::Prologue => write!(f, "prologue"),
            Phase::Transaction => write!(f, "transaction"),
            Phase::Ddl => write!(f, "ddl"),
            Phase::Copy => write!(f, "copy"),
            Phase::Seed => write!(f, "seed"),
            Phase::Tracking => write!(f, "tracking"),
            Phase::Epilogue => write!(f, "epilogue"),
        }
    }
}

/// Errors raised while modelling, planning or applying a schema migration.
#[derive(Debug, Error)]
pub enum Error {
    /// Logical type name with no mapping.
    #[error("unsupported type '{type_name}'")]
    UnsupportedType {
        /// The offending type name.
        type_name: String,
    },

    /// Clause the active dialect cannot produce.
    #[error("{dialect} does not support {operation}")]
    UnsupportedOperation {
        /// Dialect name.
        dialect: &'static str,
        /// Requested operation.
        operation: &'static str,
    },

    /// A declared rename could not be matched to a tracked object.
    #[error("cannot resolve rename for {}: {reason}", object_label(.table, .column.as_deref()))]
    RenameResolution {
        /// Table being reconciled.
        table: String,
        /// Column being reconciled, if the rename is column-level.
        column: Option<String>,
        /// Why resolution failed.
        reason: String,
    },

    /// A generated statement failed at the engine.
    #[error("migration of table {table} failed during {phase}: {message}\n  Statement: {statement}")]
    MigrationExecution {
        /// Table being migrated.
        table: String,
        /// Phase of the failing statement.
        phase: Phase,
        /// Engine error message.
        message: String,
        /// The failing statement.
        statement: String,
        /// Full statement batch generated for the table.
        script: Vec<String>,
    },

    /// Database provisioning requested from a dialect that cannot do it.
    #[error("{dialect} databases cannot be created by schemasync: provision '{database}' out of band")]
    Provisioning {
        /// Dialect name.
        dialect: &'static str,
        /// Requested database.
        database: String,
    },

    /// Structurally invalid table definition.
    #[error("invalid schema for table {table}: {message}")]
    InvalidSchema {
        /// Table name.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// Bad connection string or configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreadable tracking data.
    #[error("tracking store error: {0}")]
    Tracking(String),

    /// Connection-level failure outside a table migration.
    #[error("engine error: {0}")]
    Engine(#[from] crate::connection::EngineError),

    /// Filesystem failure while provisioning an embedded database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Offline tracking store failure.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

fn object_label(table: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("{}.{}", table, column),
        None => table.to_string(),
    }
}

impl Error {
    /// Create an `UnsupportedType` error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Error::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create an `InvalidSchema` error.
    pub fn invalid_schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a table-level `RenameResolution` error.
    pub fn table_rename(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::RenameResolution {
            table: table.into(),
            column: None,
            reason: reason.into(),
        }
    }

    /// Create a column-level `RenameResolution` error.
    pub fn column_rename(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::RenameResolution {
            table: table.into(),
            column: Some(column.into()),
            reason: reason.into(),
        }
    }

    /// Whether the reconciliation engine can recover by switching strategy.
    pub fn is_recoverable_by_rebuild(&self) -> bool {
        matches!(self, Error::UnsupportedOperation { .. })
    }

    /// Format error with full details including the generated script.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let Error::MigrationExecution { script, .. } = self {
            output.push_str("\nScript:\n");
            for (idx, sql) in script.iter().enumerate() {
                output.push_str(&format!("  {:>3}: {}\n", idx + 1, sql));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schemasync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_error_display() {
        let err = Error::column_rename("sample_t1", "v2_string", "no tracked column named v1");
        assert!(err.to_string().contains("sample_t1.v2_string"));

        let err = Error::table_rename("sample_t12", "internal id 7 is tracked as other_t");
        assert!(err.to_string().contains("sample_t12"));
        assert!(!err.to_string().contains("sample_t12."));
    }

    #[test]
    fn test_execution_error_details() {
        let err = Error::MigrationExecution {
            table: "users".into(),
            phase: Phase::Copy,
            message: "no such column: emial".into(),
            statement: "INSERT INTO users SELECT emial FROM tmp".into(),
            script: vec!["BEGIN".into(), "INSERT INTO users SELECT emial FROM tmp".into()],
        };

        assert!(err.to_string().contains("during copy"));
        let detailed = err.format_detailed();
        assert!(detailed.contains("  1: BEGIN"));
        assert!(detailed.contains("  2: INSERT INTO users"));
    }

    #[test]
    fn test_recoverable() {
        let err = Error::UnsupportedOperation {
            dialect: "sqlite",
            operation: "ALTER COLUMN",
        };
        assert!(err.is_recoverable_by_rebuild());
        assert!(!Error::unsupported_type("NotARealType").is_recoverable_by_rebuild());
    }
}
