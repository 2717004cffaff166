//! Per-table migration plans.
//!
//! A [`Planner`] turns one desired table plus the tracking snapshot into a
//! [`TablePlan`]: the action taken, the column classification and the ordered
//! statement script. Existing tables are migrated with one of two
//! [`MigrationStrategy`] variants, selected from the column changes and the
//! dialect's capabilities.

use super::diff::{classify_columns, resolve_identity, ColumnChange, ColumnChangeKind};
use super::rebuild::{self, retained_column};
use super::seed;
use crate::config::MigrationConfig;
use crate::dialect::Dialect;
use crate::error::{Error, Phase, Result};
use crate::schema::{IndexDef, Table};
use crate::tracking::{TrackingColumn, TrackingIndex, TrackingSnapshot, TrackingStore, TrackingTable};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// How an existing table is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationStrategy {
    /// In-place ALTER statements.
    Incremental,
    /// Rename the live table, create the new definition, copy rows, drop the old table.
    Rebuild,
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStrategy::Incremental => write!(f, "incremental"),
            MigrationStrategy::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// What happens to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableAction {
    /// Nothing to do.
    Unchanged,
    /// The table is created.
    Create,
    /// The table exists and is migrated.
    Migrate(MigrationStrategy),
}

impl std::fmt::Display for TableAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableAction::Unchanged => write!(f, "unchanged"),
            TableAction::Create => write!(f, "create"),
            TableAction::Migrate(MigrationStrategy::Incremental) => write!(f, "alter"),
            TableAction::Migrate(MigrationStrategy::Rebuild) => write!(f, "rebuild"),
        }
    }
}

/// One generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Phase reported if the statement fails.
    pub phase: Phase,
    /// SQL text.
    pub sql: String,
}

impl Statement {
    /// Create a statement.
    pub fn new(phase: Phase, sql: impl Into<String>) -> Self {
        Self {
            phase,
            sql: sql.into(),
        }
    }
}

fn in_phase(phase: Phase, statements: Vec<String>) -> impl Iterator<Item = Statement> {
    statements.into_iter().map(move |sql| Statement::new(phase, sql))
}

/// The plan for one table.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// Desired table name.
    pub table: String,
    /// Name the table is tracked under, when it is being renamed.
    pub previous_name: Option<String>,
    /// What happens to the table.
    pub action: TableAction,
    /// Column classification; empty for new and unchanged tables.
    pub changes: Vec<ColumnChange>,
    /// Columns walked while diffing.
    pub columns_checked: usize,
    /// Whether seed rows are inserted.
    pub seeded: bool,
    /// Session statements run before the transaction.
    pub prologue: Vec<String>,
    /// Transaction start, if DDL is transactional.
    pub begin: Option<&'static str>,
    /// Statements run inside the transaction.
    pub body: Vec<Statement>,
    /// Transaction commit.
    pub commit: Option<&'static str>,
    /// Transaction rollback, run when a body statement fails.
    pub rollback: Option<&'static str>,
    /// Session statements run after the transaction, also on failure.
    pub epilogue: Vec<String>,
    /// Tracking record stored once the table has migrated.
    pub record: Option<TrackingTable>,
}

impl TablePlan {
    fn unchanged(table: &Table) -> Self {
        Self {
            table: table.name.clone(),
            previous_name: None,
            action: TableAction::Unchanged,
            changes: Vec::new(),
            columns_checked: 0,
            seeded: false,
            prologue: Vec::new(),
            begin: None,
            body: Vec::new(),
            commit: None,
            rollback: None,
            epilogue: Vec::new(),
            record: None,
        }
    }

    /// Check if the table needs nothing.
    pub fn is_unchanged(&self) -> bool {
        self.action == TableAction::Unchanged
    }

    /// Strategy used for an existing table.
    pub fn strategy(&self) -> Option<MigrationStrategy> {
        match self.action {
            TableAction::Migrate(strategy) => Some(strategy),
            _ => None,
        }
    }

    /// Column changes other than `Unchanged`.
    pub fn column_changes(&self) -> impl Iterator<Item = &ColumnChange> {
        self.changes.iter().filter(|c| c.is_change())
    }

    /// Every statement in execution order; empty when the table needs no SQL.
    pub fn script(&self) -> Vec<String> {
        if self.body.is_empty() {
            return Vec::new();
        }
        let mut script = self.prologue.clone();
        script.extend(self.begin.map(str::to_string));
        script.extend(self.body.iter().map(|s| s.sql.clone()));
        script.extend(self.commit.map(str::to_string));
        script.extend(self.epilogue.iter().cloned());
        script
    }
}

/// A planned table, or why it could not be planned.
#[derive(Debug)]
pub struct PlannedTable {
    /// Desired table name.
    pub name: String,
    /// The plan.
    pub result: Result<TablePlan>,
}

/// Plans for a whole run.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    /// Statements that create the tracking store.
    pub bootstrap: Vec<String>,
    /// One entry per table, in registration order.
    pub tables: Vec<PlannedTable>,
}

impl MigrationPlan {
    /// Check if the run would execute nothing.
    pub fn is_empty(&self) -> bool {
        self.bootstrap.is_empty()
            && self.tables.iter().all(|t| match &t.result {
                Ok(plan) => plan.body.is_empty(),
                Err(_) => true,
            })
    }

    /// Every statement the run would execute, in order.
    pub fn script(&self) -> Vec<String> {
        let mut script = self.bootstrap.clone();
        for table in &self.tables {
            if let Ok(plan) = &table.result {
                script.extend(plan.script());
            }
        }
        script
    }

    /// Tables that could not be planned.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.tables
            .iter()
            .filter_map(|t| t.result.as_ref().err().map(|e| (t.name.as_str(), e)))
    }
}

/// An index as it will exist after the migration.
#[derive(Debug, Clone)]
pub(crate) struct PlannedIndex {
    /// Tracked id of an index that is kept.
    pub internal_id: Option<u64>,
    /// Physical name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Uniqueness.
    pub unique: bool,
}

impl PlannedIndex {
    pub(crate) fn created(dialect: &dyn Dialect, index: &IndexDef) -> Self {
        Self {
            internal_id: None,
            name: dialect.object_name(&index.name),
            columns: index.columns.clone(),
            unique: index.unique,
        }
    }
}

/// Builds table plans for one dialect and tracking store.
pub struct Planner<'a> {
    dialect: &'a dyn Dialect,
    store: &'a dyn TrackingStore,
    config: &'a MigrationConfig,
}

impl<'a> Planner<'a> {
    /// Create a planner.
    pub fn new(
        dialect: &'a dyn Dialect,
        store: &'a dyn TrackingStore,
        config: &'a MigrationConfig,
    ) -> Self {
        Self {
            dialect,
            store,
            config,
        }
    }

    /// Plan one table. New object ids are allocated from `snapshot`.
    pub fn plan_table(&self, table: &Table, snapshot: &mut TrackingSnapshot) -> Result<TablePlan> {
        table.validate()?;
        let tracked = resolve_identity(table, snapshot)?.tracked().cloned();
        match tracked {
            None => self.plan_create(table, snapshot),
            Some(tracked) => self.plan_existing(table, &tracked, snapshot),
        }
    }

    fn plan_create(&self, table: &Table, snapshot: &mut TrackingSnapshot) -> Result<TablePlan> {
        let d = self.dialect;
        let mut body: Vec<Statement> = in_phase(Phase::Ddl, d.create_table_clause(table)).collect();

        let indexes = table.effective_indexes();
        for index in &indexes {
            body.push(Statement::new(Phase::Ddl, d.create_index_clause(table, index)));
        }
        if let Some(column) = table.auto_increment_column() {
            body.extend(in_phase(Phase::Ddl, d.auto_increment_clauses(&table.name, column)));
        }

        let seeded = seed::seed_due(table, 0, self.config);
        if seeded {
            body.extend(in_phase(Phase::Seed, seed::seed_statements(d, table, false)));
        }

        let planned = indexes.iter().map(|i| PlannedIndex::created(d, i)).collect();
        let record = self.build_record(table, None, &[], true, planned, seeded, snapshot)?;
        body.extend(in_phase(
            Phase::Tracking,
            self.store.record_statements(d, &record, None),
        ));

        debug!(table = %table.name, statements = body.len(), "planned new table");
        Ok(TablePlan {
            action: TableAction::Create,
            seeded,
            begin: d.begin_transaction(),
            body,
            commit: d.commit_transaction(),
            rollback: d.rollback_transaction(),
            record: Some(record),
            ..TablePlan::unchanged(table)
        })
    }

    fn plan_existing(
        &self,
        table: &Table,
        tracked: &TrackingTable,
        snapshot: &mut TrackingSnapshot,
    ) -> Result<TablePlan> {
        let d = self.dialect;
        let renamed = tracked.name != table.name;
        let version_bumped = table.version > tracked.version;
        let forced = table.columns.iter().any(|c| {
            tracked
                .column(&c.name)
                .map_or(false, |previous| c.version > previous.version)
        });
        let seeded = seed::seed_due(table, tracked.data_version, self.config);
        // Retained columns leave the hash untouched, so dropping them is
        // decided from the tracked column list.
        let drops_retained = self.config.drop_removed_columns
            && tracked
                .columns
                .iter()
                .any(|c| !table.columns.iter().any(|d| d.answers_to(&c.name)));

        if !renamed
            && !version_bumped
            && !forced
            && !seeded
            && !drops_retained
            && table.hash() == tracked.schema_hash()
        {
            debug!(table = %table.name, hash = %tracked.schema_hash(), "table unchanged");
            return Ok(TablePlan::unchanged(table));
        }

        let changes = classify_columns(table, tracked)?;
        let columns_checked = table.columns.len();
        debug!(
            table = %table.name,
            checked = columns_checked,
            version_bumped,
            "re-checked columns"
        );

        for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Removed) {
            if !self.config.drop_removed_columns {
                warn!(
                    table = %table.name,
                    column = %change.name,
                    "column is no longer declared; kept in place"
                );
            }
        }

        let seeds = if seeded {
            seed::seed_statements(d, table, true)
        } else {
            Vec::new()
        };

        let mut strategy = self.select_strategy(table, &changes);
        let mut prologue = Vec::new();
        let mut epilogue = Vec::new();
        let mut attempt = None;

        if strategy == MigrationStrategy::Incremental {
            match self.incremental(table, tracked, &changes, &seeds) {
                Ok(result) => attempt = Some(result),
                Err(err) if err.is_recoverable_by_rebuild() => {
                    debug!(table = %table.name, reason = %err, "falling back to rebuild");
                    strategy = MigrationStrategy::Rebuild;
                }
                Err(err) => return Err(err),
            }
        }

        let (mut body, indexes) = match attempt {
            Some(result) => result,
            None => {
                let script = rebuild::rebuild_script(d, table, tracked, &changes, self.config, seeds)?;
                prologue = script.prologue;
                epilogue = script.epilogue;
                let indexes = script
                    .effective
                    .effective_indexes()
                    .iter()
                    .map(|i| PlannedIndex::created(d, i))
                    .collect();
                (script.body, indexes)
            }
        };

        let rebuilt = strategy == MigrationStrategy::Rebuild;
        let record = self.build_record(table, Some(tracked), &changes, rebuilt, indexes, seeded, snapshot)?;
        body.extend(in_phase(
            Phase::Tracking,
            self.store.record_statements(d, &record, Some(tracked)),
        ));

        debug!(
            table = %table.name,
            strategy = %strategy,
            statements = body.len(),
            "planned table migration"
        );
        Ok(TablePlan {
            previous_name: renamed.then(|| tracked.name.clone()),
            action: TableAction::Migrate(strategy),
            changes,
            columns_checked,
            seeded,
            prologue,
            begin: d.begin_transaction(),
            body,
            commit: d.commit_transaction(),
            rollback: d.rollback_transaction(),
            epilogue,
            record: Some(record),
            ..TablePlan::unchanged(table)
        })
    }

    /// Rebuild whenever a change cannot be applied in place.
    fn select_strategy(&self, table: &Table, changes: &[ColumnChange]) -> MigrationStrategy {
        let caps = self.dialect.capabilities();
        let rebuild = changes.iter().any(|change| match change.kind {
            ColumnChangeKind::Unchanged => false,
            ColumnChangeKind::Added => table
                .column(&change.name)
                .map_or(false, |c| c.primary_key || !self.dialect.can_add_column(c)),
            ColumnChangeKind::Modified | ColumnChangeKind::Renamed => {
                change.forced || change.delta.key_changed || !caps.supports_alter_column
            }
            ColumnChangeKind::Removed => {
                self.config.drop_removed_columns
                    && (!caps.supports_drop_column
                        || change.previous.as_ref().map_or(false, |p| p.primary_key))
            }
        });

        if rebuild {
            MigrationStrategy::Rebuild
        } else {
            MigrationStrategy::Incremental
        }
    }

    /// In-place script. Any clause the dialect cannot produce surfaces as
    /// `UnsupportedOperation`.
    fn incremental(
        &self,
        table: &Table,
        tracked: &TrackingTable,
        changes: &[ColumnChange],
        seeds: &[String],
    ) -> Result<(Vec<Statement>, Vec<PlannedIndex>)> {
        let d = self.dialect;
        let name = table.name.as_str();
        let drop_removed = self.config.drop_removed_columns;
        let mut body = Vec::new();

        let renamed_columns: HashMap<&str, &str> = changes
            .iter()
            .filter(|c| c.kind == ColumnChangeKind::Renamed)
            .filter_map(|c| c.previous.as_ref().map(|p| (p.name.as_str(), c.name.as_str())))
            .collect();

        // Tracked columns whose indexes must go before they are altered or dropped.
        let touched: HashSet<&str> = changes
            .iter()
            .filter(|c| {
                c.delta.alters_definition() || (c.kind == ColumnChangeKind::Removed && drop_removed)
            })
            .filter_map(|c| c.previous.as_ref().map(|p| p.name.as_str()))
            .collect();

        if tracked.name != table.name {
            body.push(Statement::new(Phase::Ddl, d.rename_table_clause(&tracked.name, name)));
            if let Some(column) = table
                .auto_increment_column()
                .filter(|_| tracked.columns.iter().any(|c| c.auto_increment))
            {
                body.extend(
                    d.rename_auto_increment_clauses(&tracked.name, name, column)
                        .into_iter()
                        .map(|sql| Statement::new(Phase::Ddl, sql)),
                );
            }
        }

        let desired = table.effective_indexes();
        let mut matched = vec![false; desired.len()];
        let mut indexes = Vec::with_capacity(desired.len());
        for index in &tracked.indexes {
            let columns: Vec<String> = index
                .columns
                .iter()
                .map(|c| renamed_columns.get(c.as_str()).map_or_else(|| c.clone(), |n| n.to_string()))
                .collect();
            let touches_altered = index.columns.iter().any(|c| touched.contains(c.as_str()));
            let slot = (0..desired.len())
                .find(|&i| !matched[i] && desired[i].same_shape(&columns, index.unique));

            match slot {
                Some(i) if !touches_altered => {
                    matched[i] = true;
                    indexes.push(PlannedIndex {
                        internal_id: Some(index.internal_id),
                        name: index.name.clone(),
                        columns,
                        unique: index.unique,
                    });
                }
                _ => body.push(Statement::new(Phase::Ddl, d.drop_index_clause(name, &index.name))),
            }
        }

        for change in changes {
            let Some(previous) = &change.previous else {
                continue;
            };
            let dropped = change.kind == ColumnChangeKind::Removed && drop_removed;
            let reference_changed =
                change.kind != ColumnChangeKind::Removed && change.delta.reference_changed;
            if dropped || reference_changed {
                if let Some(fk) = &previous.foreign_key_name {
                    body.push(Statement::new(Phase::Ddl, d.drop_foreign_key_clause(name, fk)?));
                }
            }
            if dropped {
                if let Some(df) = &previous.default_constraint_name {
                    body.push(Statement::new(
                        Phase::Ddl,
                        d.remove_default_constraint_clause(name, df)?,
                    ));
                }
            }
        }

        for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Renamed) {
            if let Some(previous) = &change.previous {
                body.push(Statement::new(
                    Phase::Ddl,
                    d.rename_column_clause(name, &previous.name, &change.name)?,
                ));
            }
        }

        for change in changes.iter().filter(|c| {
            matches!(c.kind, ColumnChangeKind::Modified | ColumnChangeKind::Renamed)
                && (c.delta.alters_definition() || c.delta.default_changed)
        }) {
            if let (Some(column), Some(previous)) = (table.column(&change.name), &change.previous) {
                body.extend(in_phase(Phase::Ddl, d.modify_column_clause(name, column, previous)?));
            }
        }

        for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Added) {
            let Some(column) = table.column(&change.name) else {
                continue;
            };
            if !d.can_add_column(column) {
                return Err(d.unsupported("ADD COLUMN"));
            }
            body.extend(in_phase(Phase::Ddl, d.add_column_clause(name, column)?));
            if column.reference.is_some() {
                body.extend(d.add_foreign_key_clause(name, column)?.map(|sql| Statement::new(Phase::Ddl, sql)));
            }
        }

        if drop_removed {
            for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Removed) {
                body.push(Statement::new(Phase::Ddl, d.drop_column_clause(name, &change.name)?));
            }
        }

        for change in changes.iter().filter(|c| {
            matches!(c.kind, ColumnChangeKind::Modified | ColumnChangeKind::Renamed)
                && c.delta.reference_changed
        }) {
            if let Some(column) = table.column(&change.name).filter(|c| c.reference.is_some()) {
                body.extend(d.add_foreign_key_clause(name, column)?.map(|sql| Statement::new(Phase::Ddl, sql)));
            }
        }

        for (i, index) in desired.iter().enumerate() {
            if !matched[i] {
                body.push(Statement::new(Phase::Ddl, d.create_index_clause(table, index)));
                indexes.push(PlannedIndex::created(d, index));
            }
        }

        body.extend(in_phase(Phase::Seed, seeds.to_vec()));
        Ok((body, indexes))
    }

    /// The tracking record describing the table after the migration.
    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        table: &Table,
        tracked: Option<&TrackingTable>,
        changes: &[ColumnChange],
        rebuilt: bool,
        indexes: Vec<PlannedIndex>,
        seeded: bool,
        snapshot: &mut TrackingSnapshot,
    ) -> Result<TrackingTable> {
        let d = self.dialect;
        let internal_id = match tracked {
            Some(t) => t.internal_id,
            None => snapshot.allocate_id(),
        };

        let mut columns = Vec::with_capacity(table.columns.len());
        for (position, column) in table.columns.iter().enumerate() {
            let change = changes
                .iter()
                .find(|c| c.kind != ColumnChangeKind::Removed && c.name == column.name);
            let previous = change.and_then(|c| c.previous.as_ref());
            let delta = change.map(|c| c.delta).unwrap_or_default();
            let column_id = match previous {
                Some(p) => p.internal_id,
                None => snapshot.allocate_id(),
            };

            let mut record = TrackingColumn::from_column(column, column_id, position as u32);

            let fresh_fk = rebuilt || previous.is_none() || delta.reference_changed;
            record.foreign_key_name = column.reference.as_ref().map(|_| {
                match previous.and_then(|p| p.foreign_key_name.clone()) {
                    Some(existing) if !fresh_fk => existing,
                    _ => d.foreign_key_name(&table.name, &column.name),
                }
            });

            let fresh_default =
                rebuilt || previous.is_none() || delta.default_changed || delta.type_changed;
            record.default_constraint_name = if fresh_default {
                d.default_constraint_name(&table.name, column)
            } else {
                previous.and_then(|p| p.default_constraint_name.clone())
            };
            columns.push(record);
        }

        if !self.config.drop_removed_columns {
            for change in changes.iter().filter(|c| c.kind == ColumnChangeKind::Removed) {
                let Some(previous) = &change.previous else {
                    continue;
                };
                let column = retained_column(previous)?;
                let mut record =
                    TrackingColumn::from_column(&column, previous.internal_id, columns.len() as u32);
                if rebuilt {
                    record.foreign_key_name = column
                        .reference
                        .as_ref()
                        .map(|_| d.foreign_key_name(&table.name, &column.name));
                    record.default_constraint_name = d.default_constraint_name(&table.name, &column);
                } else {
                    record.foreign_key_name = previous.foreign_key_name.clone();
                    record.default_constraint_name = previous.default_constraint_name.clone();
                }
                columns.push(record);
            }
        }

        let indexes = indexes
            .into_iter()
            .map(|index| TrackingIndex {
                internal_id: index.internal_id.unwrap_or_else(|| snapshot.allocate_id()),
                name: index.name,
                columns: index.columns,
                unique: index.unique,
            })
            .collect();

        Ok(TrackingTable {
            internal_id,
            name: table.name.clone(),
            version: table.version,
            hash: table.hash().0,
            data_version: if seeded {
                table.data_version()
            } else {
                tracked.map_or(0, |t| t.data_version)
            },
            columns,
            indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
    use crate::schema::{Column, SqlType, Value};
    use crate::tracking::SledTrackingStore;

    fn sample_t2() -> Table {
        Table::new("sample_t2", 1)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("label", SqlType::String).sized(50))
    }

    fn sample_t1() -> Table {
        Table::new("sample_t1", 1)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("v1_int", SqlType::Int32).references("sample_t2", "id"))
            .with_column(Column::new("v2_string", SqlType::String).sized(150).unique())
    }

    /// Plan `before`, take its record as applied, then plan `after`.
    fn replan(dialect: &dyn Dialect, config: &MigrationConfig, before: &Table, after: &Table) -> TablePlan {
        let store = SledTrackingStore::temporary().unwrap();
        let planner = Planner::new(dialect, &store, config);
        let first = planner
            .plan_table(before, &mut TrackingSnapshot::default())
            .unwrap();
        // A later run sees the record as loaded from the store.
        let mut snapshot = TrackingSnapshot::from_tables(vec![first.record.unwrap()]);
        planner.plan_table(after, &mut snapshot).unwrap()
    }

    fn sqls(plan: &TablePlan) -> Vec<&str> {
        plan.body.iter().map(|s| s.sql.as_str()).collect()
    }

    #[test]
    fn test_plan_new_table() {
        let store = SledTrackingStore::temporary().unwrap();
        let config = MigrationConfig::default();
        let planner = Planner::new(&SqliteDialect, &store, &config);
        let mut snapshot = TrackingSnapshot::default();

        let plan = planner.plan_table(&sample_t1(), &mut snapshot).unwrap();
        assert_eq!(plan.action, TableAction::Create);
        assert_eq!(plan.begin, Some("BEGIN TRANSACTION"));
        assert!(plan.body[0].sql.starts_with("CREATE TABLE \"sample_t1\""));
        assert!(plan.body[0].sql.contains("REFERENCES \"sample_t2\" (\"id\")"));
        assert_eq!(
            plan.body[1].sql,
            "CREATE UNIQUE INDEX \"UX_sample_t1_v2_string\" ON \"sample_t1\" (\"v2_string\")"
        );

        let record = plan.record.unwrap();
        assert_eq!(record.hash, sample_t1().hash().0);
        assert_eq!(record.columns.len(), 3);
        assert_eq!(record.indexes.len(), 1);
        assert_eq!(record.internal_id, 1);
    }

    #[test]
    fn test_oracle_new_table_emulates_auto_increment() {
        let store = SledTrackingStore::temporary().unwrap();
        let config = MigrationConfig::default();
        let planner = Planner::new(&OracleDialect, &store, &config);
        let plan = planner
            .plan_table(&sample_t2(), &mut TrackingSnapshot::default())
            .unwrap();

        assert_eq!(plan.begin, None);
        assert!(sqls(&plan).iter().any(|s| s.starts_with("CREATE SEQUENCE")));
        assert!(sqls(&plan).iter().any(|s| s.contains("TRIGGER")));
    }

    #[test]
    fn test_unchanged_table_has_no_statements() {
        let plan = replan(&SqliteDialect, &MigrationConfig::default(), &sample_t1(), &sample_t1());
        assert!(plan.is_unchanged());
        assert!(plan.script().is_empty());
        assert!(plan.record.is_none());
    }

    #[test]
    fn test_version_bump_walks_columns() {
        let mut bumped = sample_t1();
        bumped.version = 2;
        let plan = replan(&SqliteDialect, &MigrationConfig::default(), &sample_t1(), &bumped);

        assert_eq!(plan.action, TableAction::Migrate(MigrationStrategy::Incremental));
        assert_eq!(plan.columns_checked, 3);
        assert_eq!(plan.column_changes().count(), 0);
        assert!(plan.body.is_empty());
        assert_eq!(plan.record.unwrap().version, 2);
    }

    #[test]
    fn test_added_column_on_postgres() {
        let after = sample_t1().with_column(Column::new("v3", SqlType::Boolean).not_null());
        let plan = replan(&PostgresDialect, &MigrationConfig::default(), &sample_t1(), &after);

        assert_eq!(plan.strategy(), Some(MigrationStrategy::Incremental));
        assert_eq!(
            sqls(&plan),
            vec![
                "ALTER TABLE \"sample_t1\" ADD COLUMN \"v3\" BOOLEAN DEFAULT FALSE NOT NULL",
                "ALTER TABLE \"sample_t1\" ALTER COLUMN \"v3\" DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_widened_column_rebuilds_on_sqlite() {
        let mut after = sample_t1();
        after.columns[2] = after.columns[2].clone().sized(200).indexed();
        let plan = replan(&SqliteDialect, &MigrationConfig::default(), &sample_t1(), &after);

        assert_eq!(plan.strategy(), Some(MigrationStrategy::Rebuild));
        assert_eq!(plan.prologue, SqliteDialect.disable_foreign_keys());
        let body = sqls(&plan);
        assert!(body[0].starts_with("ALTER TABLE \"sample_t1\" RENAME TO \"tmp_"));
        assert!(body.iter().any(|s| s.starts_with("INSERT INTO \"sample_t1\"")));
        assert!(body.last().unwrap().starts_with("DROP TABLE \"tmp_"));

        let record = plan.record.unwrap();
        assert_eq!(record.column("v2_string").unwrap().hash, after.columns[2].hash().0);
        assert_eq!(record.hash, after.hash().0);
    }

    #[test]
    fn test_widened_column_alters_on_sqlserver() {
        let mut after = sample_t1();
        after.columns[2] = after.columns[2].clone().sized(200);
        let plan = replan(&SqlServerDialect, &MigrationConfig::default(), &sample_t1(), &after);

        assert_eq!(plan.strategy(), Some(MigrationStrategy::Incremental));
        assert_eq!(
            sqls(&plan),
            vec![
                "DROP INDEX [UX_sample_t1_v2_string] ON [sample_t1]",
                "ALTER TABLE [sample_t1] ALTER COLUMN [v2_string] NVARCHAR(200) NULL",
                "CREATE UNIQUE INDEX [UX_sample_t1_v2_string] ON [sample_t1] ([v2_string])",
            ]
        );
    }

    #[test]
    fn test_rename_column_on_postgres_keeps_index() {
        let mut after = sample_t1();
        after.columns[2] = Column::new("v2_text", SqlType::String)
            .sized(150)
            .unique()
            .renamed_from("v2_string");
        let plan = replan(&PostgresDialect, &MigrationConfig::default(), &sample_t1(), &after);

        assert_eq!(
            sqls(&plan),
            vec!["ALTER TABLE \"sample_t1\" RENAME COLUMN \"v2_string\" TO \"v2_text\""]
        );
        let record = plan.record.unwrap();
        assert_eq!(record.indexes[0].name, "UX_sample_t1_v2_string");
        assert_eq!(record.indexes[0].columns, vec!["v2_text".to_string()]);
        assert_eq!(record.column("v2_text").unwrap().internal_id, 4);
    }

    #[test]
    fn test_table_rename_keeps_identity() {
        let after = {
            let mut t = sample_t1().renamed_from(1, "sample_t1", 1);
            t.name = "sample_t11".into();
            t.version = 2;
            t
        };
        let plan = replan(&PostgresDialect, &MigrationConfig::default(), &sample_t1(), &after);

        assert_eq!(plan.previous_name.as_deref(), Some("sample_t1"));
        assert_eq!(
            plan.body[0].sql,
            "ALTER TABLE \"sample_t1\" RENAME TO \"sample_t11\""
        );
        assert_eq!(plan.record.unwrap().internal_id, 1);
    }

    #[test]
    fn test_removed_column_is_kept_by_default() {
        let mut after = sample_t1();
        after.columns.remove(1);

        let kept = replan(&PostgresDialect, &MigrationConfig::default(), &sample_t1(), &after);
        assert!(sqls(&kept).iter().all(|s| !s.contains("DROP COLUMN")));
        assert!(kept.record.unwrap().column("v1_int").is_some());

        let config = MigrationConfig::default().with_drop_removed_columns(true);
        let dropped = replan(&PostgresDialect, &config, &sample_t1(), &after);
        assert_eq!(
            sqls(&dropped),
            vec![
                "ALTER TABLE \"sample_t1\" DROP CONSTRAINT \"FK_sample_t1_v1_int\"",
                "ALTER TABLE \"sample_t1\" DROP COLUMN \"v1_int\"",
            ]
        );
        assert!(dropped.record.unwrap().column("v1_int").is_none());
    }

    #[test]
    fn test_forced_column_rebuilds_everywhere() {
        let mut after = sample_t1();
        after.columns[1].version = 2;
        let plan = replan(&PostgresDialect, &MigrationConfig::default(), &sample_t1(), &after);
        assert_eq!(plan.strategy(), Some(MigrationStrategy::Rebuild));
    }

    #[test]
    fn test_seed_version_bump_inserts_guarded_rows() {
        let before = sample_t2().with_data(vec![Value::Int(1), "one".into()]);
        let after = sample_t2()
            .with_data_version(2)
            .with_data(vec![Value::Int(1), "one".into()])
            .with_data(vec![Value::Int(2), "two".into()]);
        let plan = replan(&SqliteDialect, &MigrationConfig::default(), &before, &after);

        assert!(plan.seeded);
        let seeds: Vec<_> = plan.body.iter().filter(|s| s.phase == Phase::Seed).collect();
        assert_eq!(seeds.len(), 2);
        assert!(seeds[0].sql.contains("WHERE NOT EXISTS"));
        assert_eq!(plan.record.unwrap().data_version, 2);
    }

    #[test]
    fn test_invalid_table_is_rejected() {
        let store = SledTrackingStore::temporary().unwrap();
        let config = MigrationConfig::default();
        let planner = Planner::new(&SqliteDialect, &store, &config);
        let err = planner
            .plan_table(&Table::new("empty", 1), &mut TrackingSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }
}
