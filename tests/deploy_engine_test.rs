mod common;

use std::fs;
use std::path::Path;

use common::{Harness, RecordingSessionProvider, harness, write_file};
use dbdeploy::change::{ChangeKey, ChangeType};
use dbdeploy::deploy::{DeployOptions, DeployReport, DeployStrategy, SchemaStatus};
use dbdeploy::dialect::DialectConfig;
use dbdeploy::environment::{Environment, Schema};
use dbdeploy::error::{ErrorKind, classify_error};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ORDERS: &str = "//// CHANGE name=init
CREATE TABLE ${owner}.ORDERS (ID int)
//// CHANGE name=add_total
ALTER TABLE ORDERS ADD TOTAL int
";

fn source_tree() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    write_file(root, "APP/table/ORDERS.sql", ORDERS);
    write_file(root, "APP/view/V_ORDERS.sql", "CREATE VIEW V_ORDERS AS SELECT ID FROM ORDERS\n");
    write_file(root, "APP/sp/SP_ORDERS.sql", "CREATE PROCEDURE SP_ORDERS AS SELECT 1\n");
    write_file(root, "OPS/table/JOBS.sql", "//// CHANGE name=init\nCREATE TABLE JOBS (ID int)\n");
    write_file(
        root,
        "LOOKUP/table/CODES.sql",
        "//// CHANGE name=init\nCREATE TABLE CODES (ID int)\n",
    );
    dir
}

fn environment(source: &Path) -> Environment {
    Environment::builder("test", "sqlserver")
        .schema(Schema::new("APP"))
        .schema(Schema::new("OPS"))
        .schema(Schema::read_only("LOOKUP"))
        .schema_prefix("t_")
        .token("owner", "dbo")
        .core_source(source)
        .build()
        .expect("environment")
}

fn sqlserver() -> DialectConfig {
    DialectConfig::native("sqlserver").with_database_sessions()
}

fn native(source: &Path) -> Harness {
    harness(environment(source), sqlserver(), RecordingSessionProvider::new())
}

async fn deploy(harness: &Harness, options: DeployOptions) -> DeployReport {
    let changes = harness.deployer.load_changes().expect("changes");
    harness
        .deployer
        .deploy(changes, options, CancellationToken::new())
        .await
        .expect("deploy")
}

fn status(report: &DeployReport, schema: &str) -> SchemaStatus {
    report.schema(schema).expect("schema report").status
}

#[tokio::test]
async fn first_deploy_runs_changes_in_order() {
    let source = source_tree();
    let harness = native(source.path());

    let report = deploy(&harness, DeployOptions::default()).await;

    assert!(report.is_success());
    assert_eq!(status(&report, "APP"), SchemaStatus::Applied);
    assert_eq!(status(&report, "OPS"), SchemaStatus::Applied);
    assert!(report.schema("LOOKUP").is_none());
    assert_eq!(
        harness.sessions.statements_for("t_APP"),
        vec![
            "CREATE TABLE dbo.ORDERS (ID int)",
            "ALTER TABLE ORDERS ADD TOTAL int",
            "CREATE VIEW V_ORDERS AS SELECT ID FROM ORDERS",
            "CREATE PROCEDURE SP_ORDERS AS SELECT 1",
        ]
    );
    assert_eq!(harness.sessions.statements_for("t_OPS"), vec!["CREATE TABLE JOBS (ID int)"]);
    assert_eq!(harness.ledger.snapshot().len(), 5);
    assert_eq!(harness.sessions.opened(), 2);
    assert_eq!(harness.sessions.closed(), 2);
}

#[tokio::test]
async fn redeploying_unchanged_source_skips_everything() {
    let source = source_tree();
    let harness = native(source.path());

    deploy(&harness, DeployOptions::default()).await;
    harness.sessions.clear();
    let second = deploy(&harness, DeployOptions::default()).await;

    assert!(second.is_success());
    assert_eq!(status(&second, "APP"), SchemaStatus::Skipped);
    assert_eq!(status(&second, "OPS"), SchemaStatus::Skipped);
    assert_eq!(second.schema("APP").map(|s| s.current), Some(4));
    assert!(harness.sessions.executed().is_empty());
    assert_eq!(harness.sessions.opened(), 2);
}

#[tokio::test]
async fn edited_incremental_change_flags_rollback_until_reverted() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    write_file(
        source.path(),
        "APP/table/ORDERS.sql",
        &ORDERS.replace("(ID int)", "(ID bigint)"),
    );
    harness.sessions.clear();
    let flagged = deploy(&harness, DeployOptions::default()).await;

    assert!(!flagged.is_success());
    let app = flagged.schema("APP").expect("APP");
    assert_eq!(app.status, SchemaStatus::RollbackFlagged);
    assert_eq!(app.error.as_ref().map(|e| e.kind), Some(ErrorKind::Rollback));
    assert_eq!(app.rollback_candidates.len(), 1);
    assert_eq!(app.rollback_candidates[0].key, ChangeKey::new("ORDERS", "init"));
    assert_eq!(status(&flagged, "OPS"), SchemaStatus::Skipped);
    assert!(harness.sessions.executed().is_empty());

    write_file(source.path(), "APP/table/ORDERS.sql", ORDERS);
    let cleared = deploy(&harness, DeployOptions::default()).await;
    assert!(cleared.is_success());
    assert_eq!(status(&cleared, "APP"), SchemaStatus::Skipped);
}

#[tokio::test]
async fn whitespace_only_edits_do_not_flag_rollback() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    write_file(
        source.path(),
        "APP/table/ORDERS.sql",
        &ORDERS.replace('\n', "   \r\n"),
    );
    let report = deploy(&harness, DeployOptions::default()).await;
    assert_eq!(status(&report, "APP"), SchemaStatus::Skipped);
}

#[tokio::test]
async fn removed_incremental_change_is_flagged() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    fs::remove_file(source.path().join("OPS/table/JOBS.sql")).expect("remove");
    let report = deploy(&harness, DeployOptions::default()).await;

    let ops = report.schema("OPS").expect("OPS");
    assert_eq!(ops.status, SchemaStatus::RollbackFlagged);
    assert!(ops.rollback_candidates[0].is_removed());
}

#[tokio::test]
async fn disabled_rollback_detection_treats_drift_as_current() {
    let source = source_tree();
    let environment = Environment::builder("test", "sqlserver")
        .schema(Schema::new("APP"))
        .schema(Schema::new("OPS"))
        .schema(Schema::read_only("LOOKUP"))
        .schema_prefix("t_")
        .token("owner", "dbo")
        .rollback_detection(false)
        .core_source(source.path())
        .build()
        .expect("environment");
    let harness = harness(environment, sqlserver(), RecordingSessionProvider::new());
    deploy(&harness, DeployOptions::default()).await;

    write_file(
        source.path(),
        "APP/table/ORDERS.sql",
        &ORDERS.replace("(ID int)", "(ID bigint)"),
    );
    let report = deploy(&harness, DeployOptions::default()).await;
    assert!(report.is_success());
    assert_eq!(status(&report, "APP"), SchemaStatus::Skipped);
    assert!(report.schema("LOOKUP").is_none());
}

#[tokio::test]
async fn removed_and_added_objects_drop_before_create() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    fs::remove_file(source.path().join("APP/view/V_ORDERS.sql")).expect("remove");
    write_file(
        source.path(),
        "APP/view/V_TOTALS.sql",
        "CREATE VIEW V_TOTALS AS SELECT TOTAL FROM ORDERS\n",
    );
    harness.sessions.clear();
    let report = deploy(&harness, DeployOptions::default()).await;

    assert_eq!(status(&report, "APP"), SchemaStatus::Applied);
    assert_eq!(
        harness.sessions.statements_for("t_APP"),
        vec![
            "DROP VIEW V_ORDERS",
            "CREATE VIEW V_TOTALS AS SELECT TOTAL FROM ORDERS",
        ]
    );
    let keys = harness
        .ledger
        .snapshot()
        .into_iter()
        .map(|record| record.key.object_name)
        .collect::<Vec<_>>();
    assert!(keys.contains(&"V_TOTALS".to_string()));
    assert!(!keys.contains(&"V_ORDERS".to_string()));
}

#[tokio::test]
async fn edited_rerunnable_object_is_redeployed() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    write_file(
        source.path(),
        "APP/view/V_ORDERS.sql",
        "CREATE VIEW V_ORDERS AS SELECT ID, TOTAL FROM ORDERS\n",
    );
    harness.sessions.clear();
    let report = deploy(&harness, DeployOptions::default()).await;

    assert_eq!(status(&report, "APP"), SchemaStatus::Applied);
    assert_eq!(
        harness.sessions.statements_for("t_APP"),
        vec!["CREATE VIEW V_ORDERS AS SELECT ID, TOTAL FROM ORDERS"]
    );
}

#[tokio::test]
async fn disabled_change_types_never_reach_the_target() {
    let source = source_tree();
    let harness = harness(
        environment(source.path()),
        DialectConfig::ase_to_in_memory("sybase-ase-inmemory"),
        RecordingSessionProvider::new(),
    );

    let report = deploy(&harness, DeployOptions::default()).await;

    assert_eq!(status(&report, "APP"), SchemaStatus::Applied);
    let statements = harness.sessions.statements_for("t_APP");
    assert_eq!(statements[0], "SET DATABASE SQL SYNTAX MSS TRUE");
    assert!(statements.iter().any(|sql| sql.starts_with("CREATE DOMAIN")));
    assert!(!statements.iter().any(|sql| sql.contains("PROCEDURE")));
    assert_eq!(
        statements.last().map(String::as_str),
        Some("CREATE VIEW V_ORDERS AS SELECT ID FROM ORDERS")
    );
    assert!(
        !harness
            .ledger
            .snapshot()
            .iter()
            .any(|record| record.key.object_name == "SP_ORDERS")
    );
}

#[tokio::test]
async fn failing_schema_does_not_stop_siblings() {
    let source = source_tree();
    let harness = harness(
        environment(source.path()),
        sqlserver(),
        RecordingSessionProvider::failing_on("ADD TOTAL"),
    );

    let report = deploy(&harness, DeployOptions::default()).await;

    assert!(!report.is_success());
    let app = report.schema("APP").expect("APP");
    assert_eq!(app.status, SchemaStatus::Failed);
    let error = app.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::Execution);
    assert!(error.message.contains("APP.TABLE.ORDERS.add_total"));
    assert!(error.message.contains("ALTER TABLE ORDERS ADD TOTAL int"));
    assert_eq!(app.commands.len(), 1);
    assert_eq!(
        harness.sessions.statements_for("t_APP"),
        vec!["CREATE TABLE dbo.ORDERS (ID int)"]
    );
    assert_eq!(status(&report, "OPS"), SchemaStatus::Applied);
    assert_eq!(harness.sessions.opened(), harness.sessions.closed());

    let recorded = harness
        .ledger
        .snapshot()
        .into_iter()
        .filter(|record| record.schema == "APP")
        .map(|record| record.key)
        .collect::<Vec<_>>();
    assert_eq!(recorded, vec![ChangeKey::new("ORDERS", "init")]);
}

#[tokio::test]
async fn audit_only_records_without_executing() {
    let source = source_tree();
    let harness = native(source.path());
    let options = DeployOptions {
        strategy: DeployStrategy::AuditOnly,
        ..DeployOptions::default()
    };

    let report = deploy(&harness, options).await;

    assert!(report.is_success());
    assert_eq!(report.verb, "audit-only");
    assert_eq!(harness.sessions.opened(), 0);
    assert_eq!(harness.ledger.snapshot().len(), 5);

    let follow_up = deploy(&harness, DeployOptions::default()).await;
    assert_eq!(status(&follow_up, "APP"), SchemaStatus::Skipped);
}

#[tokio::test]
async fn audit_only_accepts_changed_checksums() {
    let source = source_tree();
    let harness = native(source.path());
    deploy(&harness, DeployOptions::default()).await;

    write_file(
        source.path(),
        "APP/table/ORDERS.sql",
        &ORDERS.replace("(ID int)", "(ID bigint)"),
    );
    let audit_only = DeployOptions {
        strategy: DeployStrategy::AuditOnly,
        ..DeployOptions::default()
    };
    let report = deploy(&harness, audit_only).await;
    assert!(report.is_success());
    assert_eq!(status(&report, "APP"), SchemaStatus::Applied);

    let follow_up = deploy(&harness, DeployOptions::default()).await;
    assert_eq!(status(&follow_up, "APP"), SchemaStatus::Skipped);
}

#[tokio::test]
async fn failed_translation_leaves_accepted_checksums_unrecorded() {
    let source = source_tree();
    let harness = harness(
        environment(source.path()),
        DialectConfig::ase_to_in_memory("sybase-ase-inmemory"),
        RecordingSessionProvider::new(),
    );
    deploy(&harness, DeployOptions::default()).await;
    let before = harness.ledger.snapshot();

    write_file(
        source.path(),
        "APP/table/ORDERS.sql",
        &ORDERS.replace("(ID int)", "(ID bigint)"),
    );
    write_file(source.path(), "APP/view/V_RENAMED.sql", "sp_rename ORDERS\n");
    let audit_only = DeployOptions {
        strategy: DeployStrategy::AuditOnly,
        ..DeployOptions::default()
    };
    let report = deploy(&harness, audit_only).await;

    let app = report.schema("APP").expect("APP");
    assert_eq!(app.status, SchemaStatus::Failed);
    assert_eq!(app.error.as_ref().map(|e| e.kind), Some(ErrorKind::Translation));
    assert_eq!(harness.ledger.snapshot(), before);
}

#[tokio::test]
async fn same_object_name_under_two_types_stays_current() {
    let source = source_tree();
    write_file(
        source.path(),
        "APP/usertype/Amount.sql",
        "CREATE TYPE Amount FROM numeric(10, 2)\n",
    );
    write_file(source.path(), "APP/view/Amount.sql", "CREATE VIEW Amount AS SELECT 1 AS ID\n");
    let harness = native(source.path());

    let first = deploy(&harness, DeployOptions::default()).await;
    assert_eq!(status(&first, "APP"), SchemaStatus::Applied);
    let amount_types = harness
        .ledger
        .snapshot()
        .into_iter()
        .filter(|record| record.key.object_name == "Amount")
        .map(|record| record.change_type)
        .collect::<Vec<_>>();
    assert_eq!(amount_types, vec![ChangeType::Usertype, ChangeType::View]);

    harness.sessions.clear();
    for _ in 0..2 {
        let again = deploy(&harness, DeployOptions::default()).await;
        assert_eq!(status(&again, "APP"), SchemaStatus::Skipped);
    }
    assert!(harness.sessions.executed().is_empty());
}

#[tokio::test]
async fn cancelled_pass_starts_no_schema() {
    let source = source_tree();
    let harness = native(source.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let changes = harness.deployer.load_changes().expect("changes");
    let report = harness
        .deployer
        .deploy(changes, DeployOptions::default(), cancel)
        .await
        .expect("deploy");

    assert_eq!(status(&report, "APP"), SchemaStatus::Cancelled);
    assert_eq!(status(&report, "OPS"), SchemaStatus::Cancelled);
    assert!(!report.is_success());
    assert_eq!(harness.sessions.opened(), 0);
}

#[tokio::test]
async fn single_worker_gives_same_result() {
    let source = source_tree();
    let harness = native(source.path());
    let options = DeployOptions {
        max_concurrency: 1,
        ..DeployOptions::default()
    };

    let report = deploy(&harness, options).await;
    assert!(report.is_success());
    assert_eq!(report.executed_commands(), 5);
}

#[tokio::test]
async fn undeclared_schema_fails_before_execution() {
    let source = source_tree();
    write_file(source.path(), "BILLING/view/V_BILLS.sql", "CREATE VIEW V_BILLS AS SELECT 1\n");
    let harness = native(source.path());

    let changes = harness.deployer.load_changes().expect("changes");
    let err = harness
        .deployer
        .deploy(changes, DeployOptions::default(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(classify_error(&err), ErrorKind::Config);
    assert!(err.to_string().contains("BILLING"));
    assert_eq!(harness.sessions.opened(), 0);
}

#[tokio::test]
async fn plan_reports_pending_work_without_side_effects() {
    let source = source_tree();
    let harness = native(source.path());

    let changes = harness.deployer.load_changes().expect("changes");
    let plans = harness.deployer.plan(changes).await.expect("plan");

    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].schema, "APP");
    assert_eq!(plans[0].physical.to_string(), "t_APP");
    assert_eq!(plans[0].commands.len(), 4);
    assert_eq!(harness.sessions.opened(), 0);
    assert!(harness.ledger.snapshot().is_empty());
}
