//! Platform identifiers mapped to the dialect and database context used for them.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::audit::{AuditLedger, SqlServerLedger};
use crate::config::{ConnectionSettings, ResolvedConfig};
use crate::db::SqlServerSessionProvider;
use crate::deploy::{Deployer, SessionProvider};
use crate::dialect::DialectConfig;
use crate::environment::Environment;
use crate::error::AppError;

pub const SQLSERVER: &str = "sqlserver";
pub const SYBASE_ASE: &str = "sybase-ase";
pub const SYBASE_ASE_IN_MEMORY: &str = "sybase-ase-inmemory";

/// Execution context plus ledger for one environment.
#[derive(Clone)]
pub struct DbContext {
    pub sessions: Arc<dyn SessionProvider>,
    pub ledger: Arc<dyn AuditLedger>,
}

pub type DbContextFactory = fn(&ConnectionSettings, Arc<Environment>) -> DbContext;

#[derive(Clone)]
pub struct PlatformEntry {
    dialect: Arc<DialectConfig>,
    db_context: Option<DbContextFactory>,
}

impl PlatformEntry {
    pub fn dialect(&self) -> Arc<DialectConfig> {
        self.dialect.clone()
    }

    pub fn has_driver(&self) -> bool {
        self.db_context.is_some()
    }
}

pub struct PlatformRegistry {
    entries: BTreeMap<String, PlatformEntry>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlatformRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::empty()
            .register(
                SQLSERVER,
                DialectConfig::native(SQLSERVER).with_database_sessions(),
                Some(sqlserver_context),
            )
            .register(SYBASE_ASE, DialectConfig::native(SYBASE_ASE), None)
            .register(
                SYBASE_ASE_IN_MEMORY,
                DialectConfig::ase_to_in_memory(SYBASE_ASE_IN_MEMORY),
                None,
            )
    }

    pub fn register(
        mut self,
        id: impl Into<String>,
        dialect: DialectConfig,
        db_context: Option<DbContextFactory>,
    ) -> Self {
        self.entries.insert(
            id.into(),
            PlatformEntry {
                dialect: Arc::new(dialect),
                db_context,
            },
        );
        self
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn lookup(&self, id: &str) -> Result<&PlatformEntry> {
        self.entries.get(id).ok_or_else(|| {
            AppError::config(format!(
                "Unknown platform '{}'. Known platforms: {}",
                id,
                self.ids().join(", ")
            ))
            .into()
        })
    }

    pub fn dialect(&self, id: &str) -> Result<Arc<DialectConfig>> {
        Ok(self.lookup(id)?.dialect())
    }

    /// Resolves everything a deployment against `environment` needs.
    ///
    /// The environment's default credentials replace the connection's when both are set.
    pub fn build_context(
        &self,
        resolved: &ResolvedConfig,
        environment: Arc<Environment>,
    ) -> Result<AppContext> {
        let entry = self.lookup(environment.platform())?;
        let factory = entry.db_context.ok_or_else(|| {
            AppError::config(format!(
                "Platform '{}' has no database driver; it can only be used with `translate`",
                environment.platform()
            ))
        })?;

        let mut settings = resolved.connection.clone();
        if let Some(credential) = environment.credential() {
            settings.user = Some(credential.user);
            settings.password = Some(credential.password);
        }

        let db = factory(&settings, environment.clone());
        Ok(AppContext {
            environment,
            dialect: entry.dialect(),
            sessions: db.sessions,
            ledger: db.ledger,
        })
    }
}

fn sqlserver_context(settings: &ConnectionSettings, environment: Arc<Environment>) -> DbContext {
    DbContext {
        sessions: Arc::new(SqlServerSessionProvider::new(settings.clone())),
        ledger: Arc::new(SqlServerLedger::new(settings.clone(), environment)),
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub environment: Arc<Environment>,
    pub dialect: Arc<DialectConfig>,
    pub sessions: Arc<dyn SessionProvider>,
    pub ledger: Arc<dyn AuditLedger>,
}

impl AppContext {
    pub fn deployer(&self) -> Deployer {
        Deployer::new(
            self.environment.clone(),
            self.dialect.clone(),
            self.sessions.clone(),
            self.ledger.clone(),
        )
    }
}
