use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{AuditLedger, AuditRecord};
use crate::change::{ChangeKey, ChangeType};
use crate::error::AppError;

type Records = BTreeMap<String, BTreeMap<(ChangeType, ChangeKey), AuditRecord>>;

/// In-process ledger, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Records>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = AuditRecord>) -> Self {
        let ledger = Self::new();
        if let Ok(mut guard) = ledger.records.write() {
            for record in records {
                guard
                    .entry(record.schema.clone())
                    .or_default()
                    .insert((record.change_type, record.key.clone()), record);
            }
        }
        ledger
    }

    /// Copy of all records across schemas.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|guard| {
                guard
                    .values()
                    .flat_map(|schema| schema.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn poisoned() -> anyhow::Error {
        AppError::ledger("In-memory audit ledger lock poisoned").into()
    }
}

#[async_trait]
impl AuditLedger for MemoryLedger {
    async fn init_schema(&self, schema: &str) -> Result<()> {
        let mut guard = self.records.write().map_err(|_| Self::poisoned())?;
        guard.entry(schema.to_string()).or_default();
        Ok(())
    }

    async fn record_deployment(&self, record: &AuditRecord) -> Result<()> {
        let mut guard = self.records.write().map_err(|_| Self::poisoned())?;
        guard
            .entry(record.schema.clone())
            .or_default()
            .insert((record.change_type, record.key.clone()), record.clone());
        Ok(())
    }

    async fn last_checksum(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> Result<Option<String>> {
        let guard = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(guard
            .get(schema)
            .and_then(|records| records.get(&(change_type, key.clone())))
            .map(|record| record.checksum.clone()))
    }

    async fn list_deployed(&self, schema: &str) -> Result<Vec<AuditRecord>> {
        let guard = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(guard
            .get(schema)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_deployment(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> Result<()> {
        let mut guard = self.records.write().map_err(|_| Self::poisoned())?;
        if let Some(records) = guard.get_mut(schema) {
            records.remove(&(change_type, key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(schema: &str, object: &str, checksum: &str) -> AuditRecord {
        typed(schema, ChangeType::View, object, checksum)
    }

    fn typed(schema: &str, change_type: ChangeType, object: &str, checksum: &str) -> AuditRecord {
        AuditRecord {
            schema: schema.to_string(),
            key: ChangeKey::new(object, object),
            change_type,
            checksum: checksum.to_string(),
            deployed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_supersedes_previous_record() {
        let ledger = MemoryLedger::new();
        ledger.record_deployment(&record("APP", "V1", "c1")).await.unwrap();
        ledger.record_deployment(&record("APP", "V1", "c2")).await.unwrap();

        let records = ledger.list_deployed("APP").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            ledger
                .last_checksum("APP", ChangeType::View, &ChangeKey::new("V1", "V1"))
                .await
                .unwrap()
                .as_deref(),
            Some("c2")
        );
    }

    #[test]
    fn init_schema_leaves_no_records() {
        let ledger = MemoryLedger::new();
        tokio_test::block_on(ledger.init_schema("APP")).unwrap();
        assert!(tokio_test::block_on(ledger.list_deployed("APP")).unwrap().is_empty());
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn schemas_are_isolated() {
        let ledger =
            MemoryLedger::with_records([record("APP", "V1", "c1"), record("OPS", "V1", "x")]);
        ledger
            .remove_deployment("OPS", ChangeType::View, &ChangeKey::new("V1", "V1"))
            .await
            .unwrap();
        assert_eq!(ledger.list_deployed("APP").await.unwrap().len(), 1);
        assert!(ledger.list_deployed("OPS").await.unwrap().is_empty());
        assert!(
            ledger
                .last_checksum("MISSING", ChangeType::View, &ChangeKey::new("V1", "V1"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn same_name_under_different_types_keeps_both_records() {
        let ledger = MemoryLedger::new();
        ledger
            .record_deployment(&typed("APP", ChangeType::Usertype, "Amount", "u1"))
            .await
            .unwrap();
        ledger
            .record_deployment(&typed("APP", ChangeType::View, "Amount", "v1"))
            .await
            .unwrap();

        assert_eq!(ledger.list_deployed("APP").await.unwrap().len(), 2);
        let key = ChangeKey::new("Amount", "Amount");
        assert_eq!(
            ledger
                .last_checksum("APP", ChangeType::Usertype, &key)
                .await
                .unwrap()
                .as_deref(),
            Some("u1")
        );

        ledger
            .remove_deployment("APP", ChangeType::View, &key)
            .await
            .unwrap();
        let remaining = ledger.list_deployed("APP").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].change_type, ChangeType::Usertype);
    }
}
