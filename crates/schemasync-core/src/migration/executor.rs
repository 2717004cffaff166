//! Migration executor: reads the tracking state, plans every table and
//! applies each table's script in its own transaction.

use super::plan::{MigrationPlan, PlannedTable, Planner, TablePlan};
use super::report::{MigrationReport, TableOutcome, TableStatus};
use crate::config::MigrationConfig;
use crate::connection::{Connection, EngineError};
use crate::dialect::Dialect;
use crate::error::{Error, Phase, Result};
use crate::schema::Table;
use crate::tracking::{CatalogTrackingStore, TrackingSnapshot, TrackingStore};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

/// Reconciles a set of desired tables with a live database.
pub struct Migrator {
    dialect: Box<dyn Dialect>,
    store: Box<dyn TrackingStore>,
    config: MigrationConfig,
}

impl Migrator {
    /// Create a migrator that tracks state in a catalog table inside the
    /// target database.
    pub fn new(dialect: Box<dyn Dialect>, config: MigrationConfig) -> Self {
        let store = CatalogTrackingStore::new(config.tracking_table.clone())
            .with_create_if_missing(config.create_tracking_catalog);
        Self {
            dialect,
            store: Box::new(store),
            config,
        }
    }

    /// Use a different tracking store.
    pub fn with_store(mut self, store: impl TrackingStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// The active dialect.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// The run configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Read the tracking state without changing anything.
    pub fn tracked(&mut self, conn: &mut dyn Connection) -> Result<TrackingSnapshot> {
        self.store.prepare(conn, self.dialect.as_ref(), true)?;
        self.store.load(conn, self.dialect.as_ref())
    }

    /// Plan every table without executing anything.
    #[instrument(skip_all, fields(tables = tables.len()))]
    pub fn plan(&mut self, conn: &mut dyn Connection, tables: &[Table]) -> Result<MigrationPlan> {
        let bootstrap = self.store.prepare(conn, self.dialect.as_ref(), true)?;
        let mut snapshot = self.store.load(conn, self.dialect.as_ref())?;
        info!(
            dialect = self.dialect.name(),
            tables = tables.len(),
            tracked = snapshot.tables().len(),
            "planning schema migration"
        );

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(tables.len());
        for table in tables {
            let result = self.plan_one(table, &mut seen, &mut snapshot);
            if let Ok(plan) = &result {
                if let Some(record) = &plan.record {
                    snapshot.upsert(record.clone());
                }
            }
            planned.push(PlannedTable {
                name: table.name.clone(),
                result,
            });
        }

        Ok(MigrationPlan {
            bootstrap,
            tables: planned,
        })
    }

    /// Bring every table up to date.
    ///
    /// Each table migrates in its own transaction. A table that fails is
    /// rolled back and reported; the remaining tables still run. Errors
    /// returned from here are failures before any table was attempted.
    #[instrument(skip_all, fields(tables = tables.len(), dry_run = self.config.dry_run))]
    pub fn run(&mut self, conn: &mut dyn Connection, tables: &[Table]) -> Result<MigrationReport> {
        if self.config.dry_run {
            return Ok(MigrationReport::from_plan(self.plan(conn, tables)?));
        }

        let bootstrap = self.store.prepare(conn, self.dialect.as_ref(), false)?;
        let mut snapshot = self.store.load(conn, self.dialect.as_ref())?;
        info!(
            dialect = self.dialect.name(),
            tables = tables.len(),
            tracked = snapshot.tables().len(),
            "running schema migration"
        );

        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(tables.len());
        for table in tables {
            let plan = match self.plan_one(table, &mut seen, &mut snapshot) {
                Ok(plan) => plan,
                Err(err) => {
                    error!(table = %table.name, error = %err, "planning failed");
                    outcomes.push(TableOutcome::failed(&table.name, err));
                    continue;
                }
            };

            if plan.body.is_empty() && !plan.is_unchanged() {
                // Only the tracked state moves, e.g. a version bump with no
                // structural change on a store that emits no SQL.
                if let Some(record) = &plan.record {
                    if let Err(err) = self.store.committed(record) {
                        error!(table = %table.name, error = %err, "tracking update failed");
                        outcomes.push(TableOutcome::failed(&table.name, err));
                        continue;
                    }
                    snapshot.upsert(record.clone());
                }
                debug!(table = %table.name, "tracking record advanced");
                outcomes.push(TableOutcome {
                    table: table.name.clone(),
                    status: TableStatus::applied(&plan),
                    statements: Vec::new(),
                    error: None,
                });
                continue;
            }

            if plan.is_unchanged() {
                debug!(table = %table.name, "up to date");
                outcomes.push(TableOutcome {
                    table: table.name.clone(),
                    status: TableStatus::Unchanged,
                    statements: Vec::new(),
                    error: None,
                });
                continue;
            }

            match self.apply(conn, &plan) {
                Ok(()) => {
                    let status = TableStatus::applied(&plan);
                    info!(
                        table = %table.name,
                        status = %status,
                        statements = plan.body.len(),
                        "table migrated"
                    );
                    if let Some(record) = &plan.record {
                        snapshot.upsert(record.clone());
                    }
                    outcomes.push(TableOutcome {
                        table: table.name.clone(),
                        status,
                        statements: plan.script(),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(table = %table.name, error = %err, "table migration failed");
                    outcomes.push(TableOutcome::failed(&table.name, err));
                }
            }
        }

        let report = MigrationReport {
            bootstrap,
            outcomes,
        };
        info!(
            created = report.count(TableStatus::Created),
            altered = report.count(TableStatus::Altered),
            rebuilt = report.count(TableStatus::Rebuilt),
            failed = report.count(TableStatus::Failed),
            "schema migration finished"
        );
        Ok(report)
    }

    fn plan_one(
        &self,
        table: &Table,
        seen: &mut HashSet<String>,
        snapshot: &mut TrackingSnapshot,
    ) -> Result<TablePlan> {
        if !seen.insert(table.name.clone()) {
            return Err(Error::invalid_schema(
                &table.name,
                "table is registered more than once",
            ));
        }
        Planner::new(self.dialect.as_ref(), self.store.as_ref(), &self.config)
            .plan_table(table, snapshot)
    }

    /// Execute one table's script.
    fn apply(&mut self, conn: &mut dyn Connection, plan: &TablePlan) -> Result<()> {
        for sql in &plan.prologue {
            if let Err(err) = conn.execute_sql(sql) {
                self.finish_session(conn, plan);
                return Err(execution_error(plan, Phase::Prologue, sql, err));
            }
        }

        if let Some(begin) = plan.begin {
            if let Err(err) = conn.execute_sql(begin) {
                self.finish_session(conn, plan);
                return Err(execution_error(plan, Phase::Transaction, begin, err));
            }
        }

        for statement in &plan.body {
            debug!(table = %plan.table, phase = %statement.phase, sql = %statement.sql, "executing");
            if let Err(err) = conn.execute_sql(&statement.sql) {
                self.abort(conn, plan);
                return Err(execution_error(plan, statement.phase, &statement.sql, err));
            }
        }

        if let Some(commit) = plan.commit {
            if let Err(err) = conn.execute_sql(commit) {
                self.abort(conn, plan);
                return Err(execution_error(plan, Phase::Transaction, commit, err));
            }
        }

        self.finish_session(conn, plan);

        if let Some(record) = &plan.record {
            self.store.committed(record)?;
        }
        Ok(())
    }

    fn abort(&self, conn: &mut dyn Connection, plan: &TablePlan) {
        match plan.rollback {
            Some(rollback) => {
                if let Err(err) = conn.execute_sql(rollback) {
                    warn!(table = %plan.table, error = %err, "rollback failed");
                }
            }
            None => warn!(
                table = %plan.table,
                "engine DDL is not transactional; statements already run are not undone"
            ),
        }
        self.finish_session(conn, plan);
    }

    fn finish_session(&self, conn: &mut dyn Connection, plan: &TablePlan) {
        for sql in &plan.epilogue {
            if let Err(err) = conn.execute_sql(sql) {
                warn!(table = %plan.table, sql = %sql, error = %err, "session reset failed");
            }
        }
    }
}

fn execution_error(plan: &TablePlan, phase: Phase, statement: &str, err: EngineError) -> Error {
    Error::MigrationExecution {
        table: plan.table.clone(),
        phase,
        message: err.message,
        statement: statement.to_string(),
        script: plan.script(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RecordingConnection;
    use crate::dialect::{OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
    use crate::schema::{Column, SqlType, Value};
    use crate::tracking::SledTrackingStore;

    fn sample_t1() -> Table {
        Table::new("sample_t1", 1)
            .with_pk_column(Column::new("id", SqlType::Int32).auto_increment())
            .with_column(Column::new("v1_int", SqlType::Int32))
    }

    fn seeded_t1() -> Table {
        sample_t1()
            .with_data(vec![Value::Int(5), Value::Int(50)])
            .with_data(vec![Value::Int(9), Value::Int(90)])
    }

    fn position(executed: &[String], pattern: &str) -> usize {
        executed
            .iter()
            .position(|s| s.contains(pattern))
            .unwrap_or_else(|| panic!("no statement containing {:?} in {:#?}", pattern, executed))
    }

    fn migrator(dialect: Box<dyn Dialect>) -> Migrator {
        Migrator::new(dialect, MigrationConfig::default())
            .with_store(SledTrackingStore::temporary().unwrap())
    }

    #[test]
    fn test_run_executes_in_transaction() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(PostgresDialect));

        let report = migrator.run(&mut conn, &[sample_t1()]).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes[0].status, TableStatus::Created);

        let executed = conn.executed();
        assert_eq!(executed.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(executed.last().map(String::as_str), Some("COMMIT"));
        assert!(executed[1].starts_with("CREATE TABLE \"sample_t1\""));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(SqliteDialect));
        migrator.run(&mut conn, &[sample_t1()]).unwrap();
        let first = conn.executed().len();

        let report = migrator.run(&mut conn, &[sample_t1()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Unchanged);
        assert_eq!(conn.executed().len(), first);
    }

    #[test]
    fn test_failure_rolls_back_and_continues() {
        let mut conn = RecordingConnection::new().fail_on("CREATE TABLE \"sample_t1\"");
        let mut migrator = migrator(Box::new(SqliteDialect));
        let other = Table::new("other_t", 1).with_pk_column(Column::new("id", SqlType::Int32));

        let report = migrator.run(&mut conn, &[sample_t1(), other]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Failed);
        assert_eq!(report.outcomes[1].status, TableStatus::Created);

        match &report.outcomes[0].error {
            Some(Error::MigrationExecution {
                table,
                phase,
                statement,
                script,
                ..
            }) => {
                assert_eq!(table, "sample_t1");
                assert_eq!(*phase, Phase::Ddl);
                assert!(statement.starts_with("CREATE TABLE"));
                assert!(script.len() > 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(conn.executed().iter().any(|s| s == "ROLLBACK"));

        // The failed table is attempted again on the next run.
        let mut conn = RecordingConnection::new();
        let report = migrator.run(&mut conn, &[sample_t1()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Created);
    }

    #[test]
    fn test_dry_run_executes_nothing() {
        let mut conn = RecordingConnection::new();
        let mut migrator = Migrator::new(
            Box::new(SqlServerDialect),
            MigrationConfig::default().with_dry_run(true),
        );

        let report = migrator.run(&mut conn, &[sample_t1()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Planned);
        assert!(!report.bootstrap.is_empty());
        assert!(conn.executed().is_empty());
    }

    #[test]
    fn test_version_bump_advances_offline_store() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(SqliteDialect));
        migrator.run(&mut conn, &[sample_t1()]).unwrap();
        let executed = conn.executed().len();

        let mut bumped = sample_t1();
        bumped.version = 2;
        let report = migrator.run(&mut conn, &[bumped.clone()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Altered);
        assert!(report.outcomes[0].statements.is_empty());
        assert_eq!(conn.executed().len(), executed);

        let snapshot = migrator.tracked(&mut conn).unwrap();
        assert_eq!(snapshot.find_by_name("sample_t1").unwrap().version, 2);

        let report = migrator.run(&mut conn, &[bumped]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Unchanged);
    }

    #[test]
    fn test_duplicate_table_is_rejected() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(SqliteDialect));

        let report = migrator.run(&mut conn, &[sample_t1(), sample_t1()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Created);
        assert!(matches!(
            report.outcomes[1].error,
            Some(Error::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_oracle_sequence_catches_up_after_seed_and_copy() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(OracleDialect));
        let resync = "'ALTER SEQUENCE \"SEQ_sample_t1\" INCREMENT BY '";

        let report = migrator.run(&mut conn, &[seeded_t1()]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Created);
        let executed = conn.executed();
        let last_seed = executed
            .iter()
            .rposition(|s| s.starts_with("INSERT INTO \"sample_t1\""))
            .unwrap();
        assert!(last_seed < position(executed, resync));
        let created = executed.len();

        let mut forced = seeded_t1();
        forced.columns[1].version = 2;
        let report = migrator.run(&mut conn, &[forced]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Rebuilt);
        let rebuild = &conn.executed()[created..];
        let copy = position(rebuild, "INSERT INTO \"sample_t1\" (\"id\", \"v1_int\") SELECT");
        let caught_up = position(rebuild, resync);
        let drop = position(rebuild, "DROP TABLE");
        assert!(copy < caught_up && caught_up < drop);
    }

    #[test]
    fn test_oracle_table_rename_moves_sequence_and_trigger() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(OracleDialect));
        migrator.run(&mut conn, &[sample_t1()]).unwrap();
        let created = conn.executed().len();

        let mut renamed = sample_t1().renamed_from(1, "sample_t1", 1);
        renamed.name = "sample_t11".into();
        renamed.version = 2;
        let report = migrator.run(&mut conn, &[renamed]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Altered);

        let executed = &conn.executed()[created..];
        let table = position(executed, "RENAME TO \"sample_t11\"");
        let sequence = position(executed, "RENAME \"SEQ_sample_t1\" TO \"SEQ_sample_t11\"");
        let dropped = position(executed, "DROP TRIGGER \"TRG_sample_t1_AI\"");
        let trigger = position(executed, "TRIGGER \"TRG_sample_t11_AI\" BEFORE INSERT ON \"sample_t11\"");
        assert!(table < sequence && sequence < dropped && dropped < trigger);
    }

    #[test]
    fn test_sqlserver_identity_insert_wraps_seed_and_copy() {
        let mut conn = RecordingConnection::new();
        let mut migrator = migrator(Box::new(SqlServerDialect));

        migrator.run(&mut conn, &[seeded_t1()]).unwrap();
        let executed = conn.executed();
        let on = position(executed, "SET IDENTITY_INSERT [sample_t1] ON");
        let off = position(executed, "SET IDENTITY_INSERT [sample_t1] OFF");
        let seeds: Vec<usize> = executed
            .iter()
            .enumerate()
            .filter(|(_, s)| s.starts_with("INSERT INTO [sample_t1]"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|&i| on < i && i < off));
        let created = executed.len();

        let mut forced = seeded_t1();
        forced.columns[1].version = 2;
        let report = migrator.run(&mut conn, &[forced]).unwrap();
        assert_eq!(report.outcomes[0].status, TableStatus::Rebuilt);
        let rebuild = &conn.executed()[created..];
        let on = position(rebuild, "SET IDENTITY_INSERT [sample_t1] ON");
        let copy = position(rebuild, "INSERT INTO [sample_t1] ([id], [v1_int]) SELECT");
        let off = position(rebuild, "SET IDENTITY_INSERT [sample_t1] OFF");
        assert!(on < copy && copy < off);
    }
}
