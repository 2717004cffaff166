//! Subcommand execution.

use crate::formatter::{create_formatter, OutputFormat};
use crate::{Args, Command};
use schemasync_core::connection::open_sqlite;
use schemasync_core::provision;
use schemasync_core::{
    Connection, ConnectionInfo, DialectKind, MigrationConfig, Migrator, RecordingConnection,
    SledTrackingStore, Table,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] schemasync_core::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid schema document: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("no {0} driver in this build; use `plan` to generate the script")]
    NoDriver(DialectKind),

    #[error("{report}\n{failed} table(s) failed")]
    MigrationFailed { report: String, failed: usize },
}

type Result<T> = std::result::Result<T, CliError>;

/// A schema document: either a bare array of tables or `{"tables": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Tables(Vec<Table>),
    Wrapped { tables: Vec<Table> },
}

impl SchemaDocument {
    fn into_tables(self) -> Vec<Table> {
        match self {
            SchemaDocument::Tables(tables) | SchemaDocument::Wrapped { tables } => tables,
        }
    }
}

/// Parse a schema document.
pub fn parse_schema(text: &str) -> Result<Vec<Table>> {
    let document: SchemaDocument = serde_json::from_str(text)?;
    Ok(document.into_tables())
}

fn load_schema(path: &Path) -> Result<Vec<Table>> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schema(&text)
}

struct Session {
    info: ConnectionInfo,
    kind: DialectKind,
    tracking: Option<PathBuf>,
    tracking_table: String,
    format: OutputFormat,
}

impl Session {
    fn new(args: &Args) -> Result<Self> {
        let info = ConnectionInfo::parse(&args.connection)?;
        let kind = info.dialect_kind()?;
        Ok(Self {
            info,
            kind,
            tracking: args.tracking.clone(),
            tracking_table: args.tracking_table.clone(),
            format: args.format,
        })
    }

    fn migrator(&self, config: MigrationConfig) -> Result<Migrator> {
        let config = config.with_tracking_table(self.tracking_table.clone());
        let migrator = Migrator::new(self.kind.dialect(), config);
        Ok(match &self.tracking {
            Some(path) => migrator.with_store(SledTrackingStore::open(path)?),
            None => migrator,
        })
    }

    /// A live connection, when this build has a driver for the engine.
    fn connect(&self) -> Result<Option<Box<dyn Connection>>> {
        match self.kind {
            DialectKind::Sqlite => {
                let conn: Box<dyn Connection> = Box::new(open_sqlite(&self.info)?);
                Ok(Some(conn))
            }
            _ => Ok(None),
        }
    }

    /// A live connection, or a recorder that answers every probe with
    /// "absent" so plans can still be produced.
    fn connect_or_record(&self) -> Result<Box<dyn Connection>> {
        match self.connect()? {
            Some(conn) => Ok(conn),
            None => {
                if self.tracking.is_none() {
                    warn!(
                        dialect = %self.kind,
                        "no driver in this build; planning against an empty tracking catalog"
                    );
                }
                Ok(Box::new(RecordingConnection::new()))
            }
        }
    }
}

/// Run the selected subcommand and return its output.
pub fn run(args: Args) -> Result<String> {
    let session = Session::new(&args)?;

    match args.command {
        Command::Plan { schema } => {
            let tables = load_schema(&schema)?;
            let mut conn = session.connect_or_record()?;
            let plan = session
                .migrator(MigrationConfig::default())?
                .plan(conn.as_mut(), &tables)?;
            Ok(create_formatter(session.format).format_plan(&plan))
        }

        Command::Apply {
            schema,
            drop_removed_columns,
            no_seed,
        } => {
            let tables = load_schema(&schema)?;
            let mut conn = session.connect()?.ok_or(CliError::NoDriver(session.kind))?;
            let config = MigrationConfig::default()
                .with_drop_removed_columns(drop_removed_columns)
                .with_seed_data(!no_seed);
            let report = session.migrator(config)?.run(conn.as_mut(), &tables)?;

            let output = create_formatter(session.format).format_report(&report);
            let failed = report.failures().count();
            if failed > 0 {
                return Err(CliError::MigrationFailed {
                    report: output,
                    failed,
                });
            }
            Ok(output)
        }

        Command::Status => {
            let mut conn = session.connect_or_record()?;
            let snapshot = session
                .migrator(MigrationConfig::default())?
                .tracked(conn.as_mut())?;
            Ok(create_formatter(session.format).format_status(&snapshot))
        }

        Command::Provision => {
            // SQLite is provisioned on disk. Server engines have no driver here, so
            // the existence check cannot run and the statement is only printed.
            let dialect = session.kind.dialect();
            let mut conn = RecordingConnection::new();
            let created = provision::create_database(&mut conn, dialect.as_ref(), &session.info)?;
            Ok(create_formatter(session.format).format_provision(
                &session.info,
                created,
                conn.executed(),
            ))
        }
    }
}
