use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::command::{ExecuteChangeCommand, order_commands};
use crate::audit::AuditRecord;
use crate::change::{Change, ChangeKey, ChangeType};
use crate::dialect::DialectConfig;
use crate::environment::PhysicalSchema;

/// A deployed incremental change whose source changed or disappeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCandidate {
    #[serde(flatten)]
    pub key: ChangeKey,
    pub change_type: ChangeType,
    pub deployed_checksum: String,
    /// `None` when the change no longer exists in source.
    pub source_checksum: Option<String>,
}

impl RollbackCandidate {
    pub fn is_removed(&self) -> bool {
        self.source_checksum.is_none()
    }

    pub fn describe(&self) -> String {
        match &self.source_checksum {
            Some(_) => format!("{} {} changed since it was deployed", self.change_type, self.key),
            None => format!("{} {} was removed from source", self.change_type, self.key),
        }
    }
}

/// Delta between source and ledger for one schema, with commands in execution order.
#[derive(Debug, Clone)]
pub struct SchemaPlan {
    pub schema: String,
    pub physical: PhysicalSchema,
    pub commands: Vec<ExecuteChangeCommand>,
    /// Changes already deployed with a matching checksum.
    pub current: usize,
    pub candidates: Vec<RollbackCandidate>,
    /// Source changes behind the candidates that are still present, for re-recording.
    pub changed_sources: Vec<Arc<Change>>,
}

impl SchemaPlan {
    pub fn is_blocked(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Compares the schema's source changes with its deployment history.
///
/// Records of change types the dialect disables are left alone, so disabling a type never
/// drops objects.
pub fn plan_schema(
    schema: &str,
    physical: PhysicalSchema,
    changes: &[Arc<Change>],
    deployed: Vec<AuditRecord>,
    rollback_detection: bool,
    dialect: &DialectConfig,
) -> SchemaPlan {
    let ignored = dialect.disabled_change_types();
    let mut records: BTreeMap<(ChangeType, ChangeKey), AuditRecord> = deployed
        .into_iter()
        .filter(|record| !ignored.contains(&record.change_type))
        .map(|record| ((record.change_type, record.key.clone()), record))
        .collect();

    let mut commands = Vec::new();
    let mut current = 0;
    let mut candidates = Vec::new();
    let mut changed_sources = Vec::new();

    for change in changes {
        let lookup = (change.change_type(), change.key().clone());
        match records.remove(&lookup) {
            None => commands.push(ExecuteChangeCommand::new(change.clone())),
            Some(record) if record.checksum == change.checksum() => current += 1,
            Some(_) if change.change_type().is_rerunnable() => {
                debug!(change = %change.identity(), "Rerunnable change modified; redeploying");
                commands.push(ExecuteChangeCommand::new(change.clone()));
            }
            Some(record) => {
                if rollback_detection {
                    candidates.push(RollbackCandidate {
                        key: record.key,
                        change_type: record.change_type,
                        deployed_checksum: record.checksum,
                        source_checksum: Some(change.checksum().to_string()),
                    });
                    changed_sources.push(change.clone());
                } else {
                    warn!(
                        change = %change.identity(),
                        "Deployed change differs from source; rollback detection disabled, treating as current"
                    );
                    current += 1;
                }
            }
        }
    }

    let qualifier = dialect.object_qualifier(&physical);
    for ((change_type, key), record) in records {
        if change_type.is_rerunnable() {
            let drop =
                Change::synthesized_drop(schema, change_type, key, &qualifier, record.checksum);
            commands.push(ExecuteChangeCommand::removal(Arc::new(drop)));
        } else if rollback_detection {
            candidates.push(RollbackCandidate {
                key,
                change_type,
                deployed_checksum: record.checksum,
                source_checksum: None,
            });
        } else {
            warn!(
                schema,
                change = %key,
                "Deployed change missing from source; rollback detection disabled, ignoring"
            );
        }
    }

    SchemaPlan {
        schema: schema.to_string(),
        physical,
        commands: order_commands(commands),
        current,
        candidates,
        changed_sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(change: &Change) -> AuditRecord {
        AuditRecord {
            schema: change.schema().to_string(),
            key: change.key().clone(),
            change_type: change.change_type(),
            checksum: change.checksum().to_string(),
            deployed_at: Utc::now(),
        }
    }

    fn plan(changes: &[Arc<Change>], deployed: Vec<AuditRecord>, detection: bool) -> SchemaPlan {
        plan_schema(
            "APP",
            PhysicalSchema::new("t_APP"),
            changes,
            deployed,
            detection,
            &DialectConfig::ase_to_in_memory("sybase-ase-inmemory"),
        )
    }

    fn table_change(name: &str, body: &str) -> Arc<Change> {
        Arc::new(Change::new("APP", ChangeType::Table, "ORDERS", name, body))
    }

    #[test]
    fn new_changes_become_commands() {
        let changes = vec![table_change("init", "CREATE TABLE ORDERS (ID int)")];
        let plan = plan(&changes, Vec::new(), true);
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.current, 0);
        assert!(!plan.is_blocked());
    }

    #[test]
    fn matching_checksums_are_current() {
        let changes = vec![table_change("init", "CREATE TABLE ORDERS (ID int)")];
        let deployed = vec![record(&changes[0])];
        let plan = plan(&changes, deployed, true);
        assert!(plan.commands.is_empty());
        assert_eq!(plan.current, 1);
    }

    #[test]
    fn modified_incremental_change_is_rollback_candidate() {
        let original = table_change("init", "CREATE TABLE ORDERS (ID int)");
        let modified = table_change("init", "CREATE TABLE ORDERS (ID bigint)");
        let plan = plan(&[modified.clone()], vec![record(&original)], true);
        assert!(plan.commands.is_empty());
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].deployed_checksum, original.checksum());
        assert_eq!(
            plan.candidates[0].source_checksum.as_deref(),
            Some(modified.checksum())
        );
        assert_eq!(plan.changed_sources.len(), 1);
    }

    #[test]
    fn disabled_detection_treats_mismatch_as_current() {
        let original = table_change("init", "CREATE TABLE ORDERS (ID int)");
        let modified = table_change("init", "CREATE TABLE ORDERS (ID bigint)");
        let plan = plan(&[modified], vec![record(&original)], false);
        assert!(!plan.is_blocked());
        assert_eq!(plan.current, 1);
    }

    #[test]
    fn modified_rerunnable_change_is_redeployed() {
        let original =
            Change::rerunnable("APP", ChangeType::View, "V1", "CREATE VIEW V1 AS SELECT 1");
        let modified = Arc::new(Change::rerunnable(
            "APP",
            ChangeType::View,
            "V1",
            "CREATE VIEW V1 AS SELECT 2",
        ));
        let plan = plan(&[modified], vec![record(&original)], true);
        assert_eq!(plan.commands.len(), 1);
        assert!(!plan.commands[0].is_drop());
        assert!(!plan.is_blocked());
    }

    #[test]
    fn removed_rerunnable_object_is_dropped() {
        let gone =
            Change::rerunnable("APP", ChangeType::View, "V_OLD", "CREATE VIEW V_OLD AS SELECT 1");
        let plan = plan(&[], vec![record(&gone)], true);
        assert_eq!(plan.commands.len(), 1);
        let command = &plan.commands[0];
        assert!(command.is_drop());
        assert_eq!(command.change().content(), "DROP VIEW t_APP.V_OLD");
    }

    #[test]
    fn drops_inside_database_sessions_use_the_owner_only() {
        let gone =
            Change::rerunnable("APP", ChangeType::Sp, "SP1", "CREATE PROCEDURE SP1 AS SELECT 1");
        let dialect = DialectConfig::native("sqlserver").with_database_sessions();

        let owned = plan_schema(
            "APP",
            PhysicalSchema::parse("appdb.dbo"),
            &[],
            vec![record(&gone)],
            true,
            &dialect,
        );
        assert_eq!(owned.commands[0].change().content(), "DROP PROCEDURE dbo.SP1");

        let plain = plan_schema(
            "APP",
            PhysicalSchema::new("t_APP"),
            &[],
            vec![record(&gone)],
            true,
            &dialect,
        );
        assert_eq!(plain.commands[0].change().content(), "DROP PROCEDURE SP1");
    }

    #[test]
    fn removed_incremental_change_is_candidate() {
        let gone = table_change("init", "CREATE TABLE ORDERS (ID int)");
        let plan = plan(&[], vec![record(&gone)], true);
        assert!(plan.commands.is_empty());
        assert_eq!(plan.candidates.len(), 1);
        assert!(plan.candidates[0].is_removed());
    }

    #[test]
    fn ignored_types_keep_their_records() {
        let sp =
            Change::rerunnable("APP", ChangeType::Sp, "SP1", "CREATE PROCEDURE SP1 AS SELECT 1");
        let plan = plan_schema(
            "APP",
            PhysicalSchema::new("APP"),
            &[],
            vec![record(&sp)],
            true,
            &DialectConfig::native("sqlserver").with_disabled(ChangeType::Sp),
        );
        assert!(plan.commands.is_empty());
        assert!(!plan.is_blocked());
    }
}
