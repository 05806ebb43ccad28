use serde::Serialize;

use super::command::ExecuteChangeCommand;
use super::plan::RollbackCandidate;
use crate::change::{ChangeKey, ChangeType};
use crate::environment::PhysicalSchema;
use crate::error::{ErrorKind, classify_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaStatus {
    Applied,
    /// Everything was already current.
    Skipped,
    RollbackFlagged,
    Failed,
    Cancelled,
}

impl SchemaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaStatus::Applied => "applied",
            SchemaStatus::Skipped => "skipped",
            SchemaStatus::RollbackFlagged => "rollback-flagged",
            SchemaStatus::Failed => "failed",
            SchemaStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, SchemaStatus::Applied | SchemaStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub change_type: ChangeType,
    #[serde(flatten)]
    pub key: ChangeKey,
    pub order: i32,
    pub drop: bool,
    pub checksum: String,
}

impl From<&ExecuteChangeCommand> for CommandSummary {
    fn from(command: &ExecuteChangeCommand) -> Self {
        Self {
            change_type: command.change_type(),
            key: command.key().clone(),
            order: command.change().order(),
            drop: command.is_drop(),
            checksum: command.checksum().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub message: String,
    pub kind: ErrorKind,
}

impl From<&anyhow::Error> for ErrorSummary {
    fn from(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{:#}", err),
            kind: classify_error(err),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub schema: String,
    pub physical_schema: Option<PhysicalSchema>,
    pub status: SchemaStatus,
    /// Commands that completed, in execution order.
    pub commands: Vec<CommandSummary>,
    pub current: usize,
    pub rollback_candidates: Vec<RollbackCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

impl SchemaReport {
    pub fn new(schema: impl Into<String>, status: SchemaStatus) -> Self {
        Self {
            schema: schema.into(),
            physical_schema: None,
            status,
            commands: Vec::new(),
            current: 0,
            rollback_candidates: Vec::new(),
            error: None,
        }
    }

    pub fn failed(schema: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            error: Some(ErrorSummary::from(err)),
            ..Self::new(schema, SchemaStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub environment: String,
    pub verb: &'static str,
    pub schemas: Vec<SchemaReport>,
}

impl DeployReport {
    pub fn new(
        environment: impl Into<String>,
        verb: &'static str,
        mut schemas: Vec<SchemaReport>,
    ) -> Self {
        schemas.sort_by(|a, b| a.schema.cmp(&b.schema));
        Self {
            environment: environment.into(),
            verb,
            schemas,
        }
    }

    pub fn is_success(&self) -> bool {
        self.schemas.iter().all(|schema| schema.status.is_success())
    }

    pub fn count(&self, status: SchemaStatus) -> usize {
        self.schemas
            .iter()
            .filter(|schema| schema.status == status)
            .count()
    }

    pub fn executed_commands(&self) -> usize {
        self.schemas.iter().map(|schema| schema.commands.len()).sum()
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaReport> {
        self.schemas.iter().find(|schema| schema.schema == name)
    }
}
