use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AuditLedger, AuditRecord};
use crate::change::{ChangeKey, ChangeType};
use crate::config::ConnectionSettings;
use crate::db::executor::{ledger_execute, ledger_query, text_column};
use crate::db::queries::{self, AUDIT_TABLE};
use crate::db::{SqlClient, connect_to};
use crate::environment::Environment;
use crate::error::{AppError, ErrorKind};

/// Ledger stored in a `DEPLOYMENT_AUDIT` table inside each physical schema.
///
/// Each logical schema gets its own connection behind its own lock, so schema workers never
/// wait on each other.
pub struct SqlServerLedger {
    settings: ConnectionSettings,
    environment: Arc<Environment>,
    connections: Mutex<HashMap<String, Arc<Mutex<SqlClient>>>>,
}

impl SqlServerLedger {
    pub fn new(settings: ConnectionSettings, environment: Arc<Environment>) -> Self {
        Self {
            settings,
            environment,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn table_name(&self, schema: &str) -> Result<(String, String)> {
        let physical = self.environment.physical_schema(schema)?;
        let owner = physical.sub_schema.as_deref().unwrap_or("dbo");
        Ok((
            physical.physical_name.clone(),
            format!("[{}].[{}].[{}]", physical.physical_name, owner, AUDIT_TABLE),
        ))
    }

    async fn connection(&self, schema: &str) -> Result<(Arc<Mutex<SqlClient>>, String)> {
        let (database, table) = self.table_name(schema)?;
        let connect = async {
            let client = connect_to(&self.settings, &database).await?;
            debug!(schema, database = %database, "Opened audit ledger connection");
            Ok::<_, anyhow::Error>(client)
        };
        let client = cached_connection(&self.connections, schema, connect).await?;
        Ok((client, table))
    }
}

/// Returns the cached client for `key`, opening one with `connect` on a miss.
///
/// The map is unlocked while connecting. When two callers race on one key the first insert wins
/// and the other client is dropped.
async fn cached_connection<T, F>(
    connections: &Mutex<HashMap<String, Arc<Mutex<T>>>>,
    key: &str,
    connect: F,
) -> Result<Arc<Mutex<T>>>
where
    F: Future<Output = Result<T>>,
{
    if let Some(existing) = connections.lock().await.get(key) {
        return Ok(existing.clone());
    }
    let client = connect.await?;
    let client = connections
        .lock()
        .await
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(client)))
        .clone();
    Ok(client)
}

fn parse_change_type(raw: &str) -> Result<ChangeType> {
    raw.parse::<ChangeType>()
        .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()).into())
}

#[async_trait]
impl AuditLedger for SqlServerLedger {
    async fn init_schema(&self, schema: &str) -> Result<()> {
        let (client, table) = self.connection(schema).await?;
        let mut client = client.lock().await;
        ledger_execute(
            &mut client,
            &queries::for_table(queries::CREATE_AUDIT_TABLE, &table),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn record_deployment(&self, record: &AuditRecord) -> Result<()> {
        let (client, table) = self.connection(&record.schema).await?;
        let mut client = client.lock().await;
        let deployed_at = record.deployed_at.naive_utc();
        let change_type = record.change_type.as_str();
        ledger_execute(
            &mut client,
            &queries::for_table(queries::UPSERT_AUDIT_RECORD, &table),
            &[
                &record.schema,
                &record.key.object_name,
                &record.key.change_name,
                &change_type,
                &record.checksum,
                &deployed_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn last_checksum(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> Result<Option<String>> {
        let (client, table) = self.connection(schema).await?;
        let mut client = client.lock().await;
        let change_type = change_type.as_str();
        let rows = ledger_query(
            &mut client,
            &queries::for_table(queries::LAST_CHECKSUM, &table),
            &[&schema, &change_type, &key.object_name, &key.change_name],
        )
        .await?;
        match rows.first() {
            Some(row) => Ok(Some(text_column(row, 0)?)),
            None => Ok(None),
        }
    }

    async fn list_deployed(&self, schema: &str) -> Result<Vec<AuditRecord>> {
        let (client, table) = self.connection(schema).await?;
        let mut client = client.lock().await;
        let rows = ledger_query(
            &mut client,
            &queries::for_table(queries::LIST_DEPLOYED, &table),
            &[&schema],
        )
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let deployed_at: Option<NaiveDateTime> = row
                .try_get(4)
                .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()))?;
            let deployed_at = deployed_at.ok_or_else(|| {
                AppError::new(ErrorKind::Ledger, "Audit record without DEPLOYED_AT")
            })?;
            records.push(AuditRecord {
                schema: schema.to_string(),
                key: ChangeKey::new(text_column(row, 0)?, text_column(row, 1)?),
                change_type: parse_change_type(&text_column(row, 2)?)?,
                checksum: text_column(row, 3)?,
                deployed_at: deployed_at.and_utc(),
            });
        }
        Ok(records)
    }

    async fn remove_deployment(
        &self,
        schema: &str,
        change_type: ChangeType,
        key: &ChangeKey,
    ) -> Result<()> {
        let (client, table) = self.connection(schema).await?;
        let mut client = client.lock().await;
        let change_type = change_type.as_str();
        ledger_execute(
            &mut client,
            &queries::for_table(queries::DELETE_AUDIT_RECORD, &table),
            &[&schema, &change_type, &key.object_name, &key.change_name],
        )
        .await?;
        Ok(())
    }
}
