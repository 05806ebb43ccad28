//! Deployment history. One record per (schema, change type, change key), superseded on redeploy.

mod memory;
mod sqlserver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::change::{ChangeKey, ChangeType};

pub use memory::MemoryLedger;
pub use sqlserver::SqlServerLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub schema: String,
    pub key: ChangeKey,
    pub change_type: ChangeType,
    pub checksum: String,
    pub deployed_at: DateTime<Utc>,
}

/// Persistence for deployment history.
///
/// Workers for different schemas call into the same ledger concurrently; implementations only
/// need to keep writes for one schema consistent with each other.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Prepares storage for a schema. Idempotent.
    async fn init_schema(&self, schema: &str) -> anyhow::Result<()>;

    /// Inserts or replaces the record for `(record.schema, record.change_type, record.key)`.
    async fn record_deployment(&self, record: &AuditRecord) -> anyhow::Result<()>;

    async fn last_checksum(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> anyhow::Result<Option<String>>;

    /// Every record of a schema, ordered by change type then key.
    async fn list_deployed(&self, schema: &str) -> anyhow::Result<Vec<AuditRecord>>;

    async fn remove_deployment(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> anyhow::Result<()>;
}
