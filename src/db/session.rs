use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::db::client::{SqlClient, connect_to};
use crate::db::executor::execute_batch;
use crate::deploy::{Session, SessionProvider};
use crate::environment::PhysicalSchema;

/// Opens one tiberius connection per schema batch, against the database named by the
/// physical schema.
#[derive(Debug, Clone)]
pub struct SqlServerSessionProvider {
    settings: ConnectionSettings,
}

impl SqlServerSessionProvider {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionProvider for SqlServerSessionProvider {
    async fn open(&self, schema: &PhysicalSchema) -> Result<Box<dyn Session>> {
        let client = connect_to(&self.settings, &schema.physical_name).await?;
        debug!(database = %schema.physical_name, "Opened session");
        Ok(Box::new(SqlServerSession {
            client,
            database: schema.physical_name.clone(),
        }))
    }
}

pub struct SqlServerSession {
    client: SqlClient,
    database: String,
}

#[async_trait]
impl Session for SqlServerSession {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        execute_batch(&mut self.client, sql).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!(database = %self.database, "Closing session");
        self.client.close().await?;
        Ok(())
    }
}
