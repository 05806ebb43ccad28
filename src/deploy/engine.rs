use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::ExecuteChangeCommand;
use super::plan::{SchemaPlan, plan_schema};
use super::report::{CommandSummary, DeployReport, ErrorSummary, SchemaReport, SchemaStatus};
use super::session::{Session, SessionProvider};
use super::strategy::{DeployStrategy, ledger_error};
use crate::audit::{AuditLedger, AuditRecord};
use crate::change::{Change, read_changes, substitute_tokens};
use crate::config::DEFAULT_MAX_CONCURRENCY;
use crate::dialect::DialectConfig;
use crate::environment::Environment;
use crate::error::{AppError, ErrorKind, classify_error};

#[derive(Debug, Clone, Copy)]
pub struct DeployOptions {
    pub strategy: DeployStrategy,
    pub max_concurrency: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            strategy: DeployStrategy::Execute,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Deploys change sets into one environment.
///
/// Every collaborator is passed in; the deployer holds no global state and is cheap to clone
/// into schema workers.
#[derive(Clone)]
pub struct Deployer {
    environment: Arc<Environment>,
    dialect: Arc<DialectConfig>,
    sessions: Arc<dyn SessionProvider>,
    ledger: Arc<dyn AuditLedger>,
}

impl Deployer {
    pub fn new(
        environment: Arc<Environment>,
        dialect: Arc<DialectConfig>,
        sessions: Arc<dyn SessionProvider>,
        ledger: Arc<dyn AuditLedger>,
    ) -> Self {
        Self {
            environment,
            dialect,
            sessions,
            ledger,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn dialect(&self) -> &DialectConfig {
        &self.dialect
    }

    /// Reads every change under the environment's source directories.
    pub fn load_changes(&self) -> Result<Vec<Change>> {
        let dirs = self.environment.source_dirs()?;
        let changes = read_changes(&dirs)?;
        debug!(
            environment = self.environment.name(),
            dirs = dirs.len(),
            changes = changes.len(),
            "Loaded source changes"
        );
        Ok(changes)
    }

    /// Buckets changes by deployable schema.
    ///
    /// Every deployable schema gets an entry, even without changes, so objects removed from
    /// source are still noticed.
    pub fn group_changes(
        &self,
        changes: impl IntoIterator<Item = Change>,
    ) -> Result<BTreeMap<String, Vec<Arc<Change>>>> {
        let mut groups: BTreeMap<String, Vec<Arc<Change>>> = self
            .environment
            .schemas()
            .into_iter()
            .map(|schema| (schema.name().to_string(), Vec::new()))
            .collect();

        for change in changes {
            if !self.environment.has_schema(change.schema()) {
                let available = self
                    .environment
                    .all_schemas()
                    .iter()
                    .map(|schema| schema.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AppError::config(format!(
                    "Change {} references schema '{}' which {} does not declare. Available: {}",
                    change.identity(),
                    change.schema(),
                    self.environment.display_string(),
                    available
                ))
                .into());
            }
            if !self.environment.is_deployable(change.schema()) {
                debug!(change = %change.identity(), "Skipping change for read-only schema");
                continue;
            }
            if self.dialect.is_disabled(change.change_type()) {
                debug!(
                    change = %change.identity(),
                    platform = self.dialect.platform(),
                    "Skipping change type disabled on platform"
                );
                continue;
            }
            groups
                .entry(change.schema().to_string())
                .or_default()
                .push(Arc::new(change));
        }
        Ok(groups)
    }

    /// Computes each schema's delta without touching the target.
    pub async fn plan(&self, changes: impl IntoIterator<Item = Change>) -> Result<Vec<SchemaPlan>> {
        let groups = self.group_changes(changes)?;
        let mut plans = Vec::with_capacity(groups.len());
        for (schema, changes) in groups {
            plans.push(self.plan_one(&schema, &changes).await?);
        }
        Ok(plans)
    }

    async fn plan_one(&self, schema: &str, changes: &[Arc<Change>]) -> Result<SchemaPlan> {
        let physical = self.environment.physical_schema(schema)?;
        let deployed = self
            .ledger
            .list_deployed(schema)
            .await
            .map_err(ledger_error)
            .with_context(|| format!("Failed to read audit history for schema {}", schema))?;
        Ok(plan_schema(
            schema,
            physical,
            changes,
            deployed,
            self.environment.is_rollback_detection_enabled(),
            &self.dialect,
        ))
    }

    /// Runs a full pass: one worker per schema, at most `max_concurrency` at a time.
    ///
    /// Configuration problems fail the whole pass before anything runs. Anything after that is
    /// contained to the schema it happened in.
    pub async fn deploy(
        &self,
        changes: impl IntoIterator<Item = Change>,
        options: DeployOptions,
        cancel: CancellationToken,
    ) -> Result<DeployReport> {
        let groups = self.group_changes(changes)?;
        for schema in groups.keys() {
            self.environment.physical_schema(schema)?;
        }

        let strategy = options.strategy;
        let tokens = Arc::new(self.environment.substitution_tokens());
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

        info!(
            environment = self.environment.name(),
            schemas = groups.len(),
            mode = strategy.verb(),
            max_concurrency = options.max_concurrency.max(1),
            "Starting deployment"
        );

        let mut handles = Vec::with_capacity(groups.len());
        for (schema, changes) in groups {
            let deployer = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let tokens = tokens.clone();
            let name = schema.clone();

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    info!(schema = %schema, "Deployment cancelled before schema started");
                    return SchemaReport::new(schema, SchemaStatus::Cancelled);
                };
                deployer
                    .deploy_schema(schema, changes, strategy, &tokens)
                    .await
            });
            handles.push((name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (schema, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    let err = anyhow::Error::from(AppError::new(
                        ErrorKind::Internal,
                        format!("Worker for schema {} did not finish: {}", schema, err),
                    ));
                    reports.push(SchemaReport::failed(schema, &err));
                }
            }
        }

        let report = DeployReport::new(self.environment.name(), strategy.verb(), reports);
        info!(
            environment = %report.environment,
            applied = report.count(SchemaStatus::Applied),
            skipped = report.count(SchemaStatus::Skipped),
            rollback_flagged = report.count(SchemaStatus::RollbackFlagged),
            failed = report.count(SchemaStatus::Failed),
            cancelled = report.count(SchemaStatus::Cancelled),
            "Deployment finished"
        );
        Ok(report)
    }

    async fn deploy_schema(
        &self,
        schema: String,
        changes: Vec<Arc<Change>>,
        strategy: DeployStrategy,
        tokens: &BTreeMap<String, String>,
    ) -> SchemaReport {
        let mut report = SchemaReport::new(schema.clone(), SchemaStatus::Skipped);
        match self
            .run_schema(&schema, &changes, strategy, tokens, &mut report)
            .await
        {
            Ok(status) => {
                report.status = status;
                info!(
                    schema = %schema,
                    status = status.as_str(),
                    commands = report.commands.len(),
                    "Schema finished"
                );
            }
            Err(err) => {
                report.status = match classify_error(&err) {
                    ErrorKind::Rollback => SchemaStatus::RollbackFlagged,
                    _ => SchemaStatus::Failed,
                };
                warn!(
                    schema = %schema,
                    status = report.status.as_str(),
                    error = %format!("{:#}", err),
                    "Schema did not deploy"
                );
                report.error = Some(ErrorSummary::from(&err));
            }
        }
        report
    }

    async fn run_schema(
        &self,
        schema: &str,
        changes: &[Arc<Change>],
        strategy: DeployStrategy,
        tokens: &BTreeMap<String, String>,
        report: &mut SchemaReport,
    ) -> Result<SchemaStatus> {
        self.ledger
            .init_schema(schema)
            .await
            .map_err(ledger_error)
            .with_context(|| format!("Failed to prepare audit history for schema {}", schema))?;

        let plan = self.plan_one(schema, changes).await?;
        report.physical_schema = Some(plan.physical.clone());
        report.current = plan.current;
        report.rollback_candidates = plan.candidates.clone();

        if plan.is_blocked() && !strategy.is_init_allowed_on_hash_exceptions() {
            let details = plan
                .candidates
                .iter()
                .map(|candidate| candidate.describe())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::new(
                ErrorKind::Rollback,
                format!("Rollback detected in schema {}: {}", schema, details),
            )
            .into());
        }

        // Translate everything before any accepted checksum reaches the ledger.
        let commands = plan
            .commands
            .into_iter()
            .map(|command| self.prepare(command, tokens))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Schema {} was not deployed", schema))?;

        for candidate in plan.candidates.iter().filter(|c| c.is_removed()) {
            warn!(
                schema,
                change = %candidate.key,
                "Deployed change missing from source; leaving audit record"
            );
        }
        let mut rerecorded = 0;
        for change in &plan.changed_sources {
            warn!(change = %change.identity(), "Accepting changed checksum");
            self.record(change).await?;
            rerecorded += 1;
        }

        if commands.is_empty() {
            return Ok(if rerecorded > 0 {
                SchemaStatus::Applied
            } else {
                SchemaStatus::Skipped
            });
        }

        let mut session = if strategy.executes() {
            Some(
                self.sessions
                    .open(&plan.physical)
                    .await
                    .with_context(|| format!("Failed to open a session for schema {}", schema))?,
            )
        } else {
            None
        };

        let outcome = self
            .run_commands(schema, &commands, strategy, &mut session, report)
            .await;

        if let Some(session) = session {
            if let Err(err) = session.close().await {
                warn!(schema, error = %err, "Failed to close session");
            }
        }

        outcome?;
        Ok(SchemaStatus::Applied)
    }

    fn prepare(
        &self,
        command: ExecuteChangeCommand,
        tokens: &BTreeMap<String, String>,
    ) -> Result<ExecuteChangeCommand> {
        let sql = substitute_tokens(command.change().content(), tokens);
        let statements = self
            .dialect
            .prepare(&sql)
            .with_context(|| format!("Failed to translate {}", command.identity()))?;
        Ok(command.with_statements(statements))
    }

    async fn run_commands(
        &self,
        schema: &str,
        commands: &[ExecuteChangeCommand],
        strategy: DeployStrategy,
        session: &mut Option<Box<dyn Session>>,
        report: &mut SchemaReport,
    ) -> Result<()> {
        if let Some(session) = session.as_mut() {
            for sql in self.dialect.init_sqls() {
                session.execute(sql).await.map_err(|err| {
                    AppError::new(
                        ErrorKind::Execution,
                        format!("Init SQL failed for schema {}: {}\nSQL:\n{}", schema, err, sql),
                    )
                })?;
            }
            for sql in self.dialect.schema_init_sqls() {
                if let Err(err) = session.execute(sql).await {
                    debug!(schema, error = %err, "Ignoring schema init failure");
                }
            }
        }

        for command in commands {
            debug!(
                schema,
                change = %command.identity(),
                drop = command.is_drop(),
                "Running command"
            );
            strategy
                .deploy(command, session.as_mut(), self.ledger.as_ref())
                .await
                .with_context(|| format!("Deployment of schema {} halted", schema))?;
            report.commands.push(CommandSummary::from(command));
        }
        Ok(())
    }

    async fn record(&self, change: &Change) -> Result<()> {
        let record = AuditRecord {
            schema: change.schema().to_string(),
            key: change.key().clone(),
            change_type: change.change_type(),
            checksum: change.checksum().to_string(),
            deployed_at: Utc::now(),
        };
        self.ledger
            .record_deployment(&record)
            .await
            .map_err(ledger_error)
            .with_context(|| format!("Failed to update audit history for {}", change.identity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryLedger;
    use crate::change::ChangeType;
    use crate::environment::{PhysicalSchema, Schema};
    use async_trait::async_trait;

    struct NoSessions;

    #[async_trait]
    impl SessionProvider for NoSessions {
        async fn open(&self, schema: &PhysicalSchema) -> Result<Box<dyn Session>> {
            Err(AppError::new(ErrorKind::Connection, format!("no target for {}", schema)).into())
        }
    }

    fn deployer(dialect: DialectConfig) -> Deployer {
        let environment = Environment::builder("test", "sqlserver")
            .schema(Schema::new("APP"))
            .schema(Schema::read_only("LOOKUP"))
            .build()
            .unwrap();
        Deployer::new(
            Arc::new(environment),
            Arc::new(dialect),
            Arc::new(NoSessions),
            Arc::new(MemoryLedger::new()),
        )
    }

    #[test]
    fn grouping_skips_read_only_and_disabled() {
        let deployer = deployer(DialectConfig::ase_to_in_memory("sybase-ase-inmemory"));
        let groups = deployer
            .group_changes(vec![
                Change::rerunnable("APP", ChangeType::View, "V1", "CREATE VIEW V1 AS SELECT 1"),
                Change::rerunnable(
                    "APP",
                    ChangeType::Sp,
                    "SP1",
                    "CREATE PROCEDURE SP1 AS SELECT 1",
                ),
                Change::rerunnable("LOOKUP", ChangeType::View, "V2", "CREATE VIEW V2 AS SELECT 1"),
            ])
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["APP"].len(), 1);
        assert_eq!(groups["APP"][0].object_name(), "V1");
    }

    #[test]
    fn undeclared_schema_is_config_error() {
        let deployer = deployer(DialectConfig::native("sqlserver"));
        let err = deployer
            .group_changes(vec![Change::rerunnable("OTHER", ChangeType::View, "V", "x")])
            .unwrap_err();
        assert_eq!(classify_error(&err), ErrorKind::Config);
    }

    #[tokio::test]
    async fn connection_failure_is_isolated_to_schema() {
        let deployer = deployer(DialectConfig::native("sqlserver"));
        let report = deployer
            .deploy(
                vec![Change::rerunnable(
                    "APP",
                    ChangeType::View,
                    "V1",
                    "CREATE VIEW V1 AS SELECT 1",
                )],
                DeployOptions::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let app = report.schema("APP").unwrap();
        assert_eq!(app.status, SchemaStatus::Failed);
        assert_eq!(app.error.as_ref().map(|e| e.kind), Some(ErrorKind::Connection));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn audit_only_never_opens_a_session() {
        let deployer = deployer(DialectConfig::native("sqlserver"));
        let options = DeployOptions {
            strategy: DeployStrategy::AuditOnly,
            ..DeployOptions::default()
        };
        let report = deployer
            .deploy(
                vec![Change::rerunnable(
                    "APP",
                    ChangeType::View,
                    "V1",
                    "CREATE VIEW V1 AS SELECT 1",
                )],
                options,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.verb, "audit-only");
        assert_eq!(report.schema("APP").map(|s| s.status), Some(SchemaStatus::Applied));
    }
}
