use anyhow::Result;
use async_trait::async_trait;

use crate::environment::PhysicalSchema;

/// One open execution context. Owned by a single schema worker for the length of its batch.
#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens execution contexts for physical schemas.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self, schema: &PhysicalSchema) -> Result<Box<dyn Session>>;
}
