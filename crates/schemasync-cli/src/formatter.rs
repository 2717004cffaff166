//! Output formatters for plans, reports and tracking state.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use schemasync_core::{ConnectionInfo, MigrationPlan, MigrationReport, TrackingSnapshot};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format a migration plan.
    fn format_plan(&self, plan: &MigrationPlan) -> String;

    /// Format the report of an executed run.
    fn format_report(&self, report: &MigrationReport) -> String;

    /// Format the tracked tables.
    fn format_status(&self, snapshot: &TrackingSnapshot) -> String;

    /// Format the result of provisioning. `statements` holds SQL left for
    /// the operator to run.
    fn format_provision(&self, info: &ConnectionInfo, created: bool, statements: &[String]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn database_label(info: &ConnectionInfo) -> &str {
    info.database_name().unwrap_or("database")
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_plan(&self, plan: &MigrationPlan) -> String {
        if plan.is_empty() && plan.failures().next().is_none() {
            return "Schema is up to date".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Table", "Action", "Changes", "Statements"]);
        for planned in &plan.tables {
            match &planned.result {
                Ok(p) => {
                    let changes = p
                        .column_changes()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join("\n");
                    table.add_row(vec![
                        Cell::new(&planned.name),
                        Cell::new(p.action),
                        Cell::new(changes),
                        Cell::new(p.body.len()),
                    ]);
                }
                Err(e) => {
                    table.add_row(vec![
                        Cell::new(&planned.name),
                        Cell::new("error"),
                        Cell::new(e),
                        Cell::new(0),
                    ]);
                }
            }
        }

        let mut output = table.to_string();
        let script = plan.script();
        if !script.is_empty() {
            output.push_str("\n\n");
            for sql in script {
                output.push_str(&sql);
                output.push_str(";\n");
            }
        }
        output
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Table", "Status", "Statements"]);
        for outcome in &report.outcomes {
            table.add_row(vec![
                Cell::new(&outcome.table),
                Cell::new(outcome.status),
                Cell::new(outcome.statements.len()),
            ]);
        }

        let mut output = table.to_string();
        for outcome in report.failures() {
            if let Some(error) = &outcome.error {
                output.push_str(&format!("\n\n{}: {}", outcome.table, error.format_detailed()));
            }
        }
        output.push_str(&format!(
            "\n\n{} statement(s) executed",
            report.statement_count()
        ));
        output
    }

    fn format_status(&self, snapshot: &TrackingSnapshot) -> String {
        if snapshot.is_empty() {
            return "No tracked tables".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Id", "Table", "Version", "Data", "Columns", "Hash"]);
        for tracked in snapshot.tables() {
            table.add_row(vec![
                Cell::new(tracked.internal_id),
                Cell::new(&tracked.name),
                Cell::new(tracked.version),
                Cell::new(tracked.data_version),
                Cell::new(tracked.columns.len()),
                Cell::new(tracked.schema_hash()),
            ]);
        }
        table.to_string()
    }

    fn format_provision(&self, info: &ConnectionInfo, created: bool, statements: &[String]) -> String {
        if !statements.is_empty() {
            let mut output = format!(
                "Existence of {} was not checked. Run on the server if it is missing:\n",
                database_label(info)
            );
            for sql in statements {
                output.push_str(&format!("{};\n", sql));
            }
            return output;
        }
        if created {
            format!("Created {}", database_label(info))
        } else {
            format!("{} already exists", database_label(info))
        }
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_plan(&self, plan: &MigrationPlan) -> String {
        let tables: Vec<serde_json::Value> = plan
            .tables
            .iter()
            .map(|planned| match &planned.result {
                Ok(p) => json!({
                    "table": planned.name,
                    "action": p.action.to_string(),
                    "changes": p.column_changes().map(|c| c.to_string()).collect::<Vec<_>>(),
                    "script": p.script(),
                }),
                Err(e) => json!({
                    "table": planned.name,
                    "error": e.to_string(),
                }),
            })
            .collect();

        let value = json!({
            "bootstrap": plan.bootstrap,
            "tables": tables,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        let tables: Vec<serde_json::Value> = report
            .outcomes
            .iter()
            .map(|outcome| {
                json!({
                    "table": outcome.table,
                    "status": outcome.status.to_string(),
                    "statements": outcome.statements,
                    "error": outcome.error.as_ref().map(|e| e.to_string()),
                })
            })
            .collect();

        let value = json!({
            "bootstrap": report.bootstrap,
            "tables": tables,
            "success": report.is_success(),
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_status(&self, snapshot: &TrackingSnapshot) -> String {
        let tables: Vec<serde_json::Value> = snapshot
            .tables()
            .iter()
            .map(|tracked| {
                json!({
                    "id": tracked.internal_id,
                    "name": tracked.name,
                    "version": tracked.version,
                    "data_version": tracked.data_version,
                    "hash": tracked.schema_hash().to_string(),
                    "columns": tracked.columns.iter().map(|c| json!({
                        "name": c.name,
                        "type": c.sql_type,
                        "size": c.size,
                        "nullable": c.nullable,
                        "version": c.version,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&tables).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_provision(&self, info: &ConnectionInfo, created: bool, statements: &[String]) -> String {
        let value = json!({
            "database": info.database_name(),
            "created": created && statements.is_empty(),
            "advisory": !statements.is_empty(),
            "statements": statements,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemasync_core::{TrackingColumn, TrackingTable};

    fn snapshot() -> TrackingSnapshot {
        TrackingSnapshot::from_tables(vec![TrackingTable {
            internal_id: 1,
            name: "country".to_string(),
            version: 2,
            hash: 7,
            data_version: 1,
            columns: Vec::<TrackingColumn>::new(),
            indexes: Vec::new(),
        }])
    }

    #[test]
    fn test_status_formats() {
        let table = TableFormatter.format_status(&snapshot());
        assert!(table.contains("country"));

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_status(&snapshot())).unwrap();
        assert_eq!(json[0]["version"], 2);
        assert_eq!(json[0]["data_version"], 1);

        assert_eq!(
            TableFormatter.format_status(&TrackingSnapshot::default()),
            "No tracked tables"
        );
    }

    #[test]
    fn test_provision_lists_statements() {
        let info = ConnectionInfo::parse("Provider=Npgsql;Host=db;Database=app").unwrap();
        let out = TableFormatter.format_provision(&info, true, &["CREATE DATABASE \"app\"".to_string()]);
        assert!(out.starts_with("Existence of app was not checked"));
        assert!(out.contains("CREATE DATABASE \"app\";"));
        assert_eq!(TableFormatter.format_provision(&info, false, &[]), "app already exists");
    }

    #[test]
    fn test_provision_json_marks_statements_advisory() {
        let info = ConnectionInfo::parse("Provider=Npgsql;Host=db;Database=app").unwrap();
        let out = JsonFormatter.format_provision(&info, true, &["CREATE DATABASE \"app\"".to_string()]);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["advisory"], true);
        assert_eq!(value["created"], false);

        let out = JsonFormatter.format_provision(&info, true, &[]);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["advisory"], false);
        assert_eq!(value["created"], true);
    }
}
