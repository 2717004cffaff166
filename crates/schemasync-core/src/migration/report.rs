//! Outcome of a migration run.

use super::plan::{MigrationPlan, MigrationStrategy, TableAction, TablePlan};
use crate::error::Error;

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Already up to date.
    Unchanged,
    /// Created.
    Created,
    /// Migrated in place.
    Altered,
    /// Migrated by rebuild-copy-swap.
    Rebuilt,
    /// Planned but not executed (dry run).
    Planned,
    /// Planning or execution failed; the table was left as it was.
    Failed,
}

impl TableStatus {
    /// Status of a plan that executed successfully.
    pub fn applied(plan: &TablePlan) -> Self {
        match plan.action {
            TableAction::Unchanged => TableStatus::Unchanged,
            TableAction::Create => TableStatus::Created,
            TableAction::Migrate(MigrationStrategy::Incremental) => TableStatus::Altered,
            TableAction::Migrate(MigrationStrategy::Rebuild) => TableStatus::Rebuilt,
        }
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Unchanged => write!(f, "unchanged"),
            TableStatus::Created => write!(f, "created"),
            TableStatus::Altered => write!(f, "altered"),
            TableStatus::Rebuilt => write!(f, "rebuilt"),
            TableStatus::Planned => write!(f, "planned"),
            TableStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result for one table.
#[derive(Debug)]
pub struct TableOutcome {
    /// Desired table name.
    pub table: String,
    /// Final status.
    pub status: TableStatus,
    /// Statements executed, or planned on a dry run.
    pub statements: Vec<String>,
    /// Failure, when `status` is [`TableStatus::Failed`].
    pub error: Option<Error>,
}

impl TableOutcome {
    pub(crate) fn failed(table: impl Into<String>, error: Error) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Failed,
            statements: Vec::new(),
            error: Some(error),
        }
    }
}

/// Result of a whole run. Tables migrate independently, so a report can
/// mix successes and failures.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Statements that created the tracking store.
    pub bootstrap: Vec<String>,
    /// One outcome per table, in registration order.
    pub outcomes: Vec<TableOutcome>,
}

impl MigrationReport {
    /// Report for a dry run: every table that needs work is `Planned`.
    pub fn from_plan(plan: MigrationPlan) -> Self {
        let outcomes = plan
            .tables
            .into_iter()
            .map(|planned| match planned.result {
                Ok(table) => TableOutcome {
                    status: if table.body.is_empty() {
                        TableStatus::Unchanged
                    } else {
                        TableStatus::Planned
                    },
                    statements: table.script(),
                    table: planned.name,
                    error: None,
                },
                Err(err) => TableOutcome::failed(planned.name, err),
            })
            .collect();

        Self {
            bootstrap: plan.bootstrap,
            outcomes,
        }
    }

    /// Check if every table succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status != TableStatus::Failed)
    }

    /// Failed tables.
    pub fn failures(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes.iter().filter(|o| o.status == TableStatus::Failed)
    }

    /// Outcome for a table.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }

    /// Statements executed across the run, bootstrap included.
    pub fn statement_count(&self) -> usize {
        self.bootstrap.len() + self.outcomes.iter().map(|o| o.statements.len()).sum::<usize>()
    }

    /// Count tables with a given status.
    pub fn count(&self, status: TableStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}
