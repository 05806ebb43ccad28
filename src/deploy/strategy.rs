use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::command::{ExecuteChangeCommand, LedgerAction};
use super::session::Session;
use crate::audit::{AuditLedger, AuditRecord};
use crate::error::{AppError, ErrorKind, classify_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStrategy {
    /// Run the command against the target, then record it.
    Execute,
    /// Record the command as deployed without touching the target.
    AuditOnly,
}

impl DeployStrategy {
    pub fn verb(self) -> &'static str {
        match self {
            DeployStrategy::Execute => "deploy",
            DeployStrategy::AuditOnly => "audit-only",
        }
    }

    /// Whether a checksum mismatch against existing history is tolerated.
    pub fn is_init_allowed_on_hash_exceptions(self) -> bool {
        match self {
            DeployStrategy::Execute => false,
            DeployStrategy::AuditOnly => true,
        }
    }

    pub fn executes(self) -> bool {
        self == DeployStrategy::Execute
    }

    pub async fn deploy(
        self,
        command: &ExecuteChangeCommand,
        session: Option<&mut Box<dyn Session>>,
        ledger: &dyn AuditLedger,
    ) -> Result<()> {
        if self.executes() {
            let session = session.ok_or_else(|| {
                AppError::new(
                    ErrorKind::Internal,
                    format!("No session open for {}", command.identity()),
                )
            })?;
            for sql in command.statements() {
                debug!(change = %command.identity(), "Executing statement");
                session.execute(sql).await.map_err(|err| {
                    AppError::new(
                        ErrorKind::Execution,
                        format!(
                            "Failed to execute {}: {}\nSQL:\n{}",
                            command.identity(),
                            err,
                            sql
                        ),
                    )
                })?;
            }
        }

        let recorded = match command.action() {
            LedgerAction::Record => {
                let record = AuditRecord {
                    schema: command.schema().to_string(),
                    key: command.key().clone(),
                    change_type: command.change_type(),
                    checksum: command.checksum().to_string(),
                    deployed_at: Utc::now(),
                };
                ledger.record_deployment(&record).await
            }
            LedgerAction::Remove => {
                ledger
                    .remove_deployment(command.schema(), command.change_type(), command.key())
                    .await
            }
        };
        recorded
            .map_err(ledger_error)
            .with_context(|| format!("Failed to update audit history for {}", command.identity()))
    }
}

/// Keeps the kind of a ledger failure that already has one; anything else becomes `Ledger`.
pub(crate) fn ledger_error(err: anyhow::Error) -> anyhow::Error {
    match classify_error(&err) {
        ErrorKind::Internal => AppError::ledger(err.to_string()).into(),
        _ => err,
    }
}
