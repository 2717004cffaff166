//! schemasync command-line tool.
//!
//! Plans and applies schema migrations described by a JSON schema document.

mod commands;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;

/// schemasync: declarative schema migrations
#[derive(Parser, Debug)]
#[command(name = "schemasync")]
#[command(version, about = "Declarative schema migrations for Oracle, SQL Server, PostgreSQL and SQLite")]
pub struct Args {
    /// ADO-style connection string, e.g. "Provider=sqlite;Data Source=app.db"
    #[arg(short = 'c', long, env = "SCHEMASYNC_CONNECTION")]
    pub connection: String,

    /// Keep tracking records in a local sled database instead of the
    /// in-database catalog
    #[arg(long)]
    pub tracking: Option<PathBuf>,

    /// Name of the in-database tracking catalog
    #[arg(long, default_value = "ddl_objects")]
    pub tracking_table: String,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the statements a migration would run
    Plan {
        /// Schema document (JSON)
        schema: PathBuf,
    },
    /// Migrate the database to the schema document
    Apply {
        /// Schema document (JSON)
        schema: PathBuf,

        /// Drop tracked columns the schema no longer declares
        #[arg(long)]
        drop_removed_columns: bool,

        /// Skip seed data
        #[arg(long)]
        no_seed: bool,
    },
    /// List tracked tables
    Status,
    /// Create the target SQLite database, or print the CREATE DATABASE
    /// statement for a server engine without checking the server
    Provision,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("schemasync=info,schemasync_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match commands::run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
