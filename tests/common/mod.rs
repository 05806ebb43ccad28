#![allow(dead_code)]

use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use async_trait::async_trait;
use dbdeploy::audit::MemoryLedger;
use dbdeploy::deploy::{Deployer, Session, SessionProvider};
use dbdeploy::dialect::DialectConfig;
use dbdeploy::environment::{Environment, PhysicalSchema};

pub fn integration_enabled() -> bool {
    env::var("DBDEPLOY_INTEGRATION_TESTS")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Binary invocation isolated from the developer's config and environment.
pub fn dbdeploy(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("dbdeploy");
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("NO_COLOR", "1");
    for var in [
        "DBDEPLOY_CONFIG",
        "DBDEPLOY_ENV",
        "DBDEPLOY_SOURCE_PATH",
        "DATABASE_URL",
        "SQL_SERVER",
        "SQL_PORT",
        "SQL_DATABASE",
        "SQL_USER",
        "SQL_PASSWORD",
        "SQL_ENCRYPT",
        "SQL_TRUST_SERVER_CERTIFICATE",
        "SQL_CONNECT_TIMEOUT",
        "DB_HOST",
        "DB_PORT",
        "DB_NAME",
        "DB_USER",
        "DB_PASSWORD",
        "DB_CONNECT_TIMEOUT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, contents).expect("write");
}

#[derive(Debug, Default)]
struct Recorded {
    executed: Vec<(String, String)>,
    opened: usize,
    closed: usize,
    fail_on: Option<String>,
}

/// Session provider that records every statement instead of running it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSessionProvider {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `pattern` fail as the target would reject them.
    pub fn failing_on(pattern: &str) -> Self {
        let provider = Self::default();
        provider.inner.lock().expect("lock").fail_on = Some(pattern.to_string());
        provider
    }

    pub fn executed(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("lock").executed.clone()
    }

    pub fn statements_for(&self, database: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|(db, _)| db == database)
            .map(|(_, sql)| sql)
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.inner.lock().expect("lock").opened
    }

    pub fn closed(&self) -> usize {
        self.inner.lock().expect("lock").closed
    }

    pub fn clear(&self) {
        self.inner.lock().expect("lock").executed.clear();
    }
}

#[async_trait]
impl SessionProvider for RecordingSessionProvider {
    async fn open(&self, schema: &PhysicalSchema) -> Result<Box<dyn Session>> {
        self.inner.lock().expect("lock").opened += 1;
        Ok(Box::new(RecordingSession {
            database: schema.to_string(),
            inner: self.inner.clone(),
        }))
    }
}

struct RecordingSession {
    database: String,
    inner: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl Session for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(pattern) = &inner.fail_on {
            if sql.contains(pattern.as_str()) {
                return Err(anyhow!("Incorrect syntax near '{}'", pattern));
            }
        }
        inner.executed.push((self.database.clone(), sql.to_string()));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner.lock().expect("lock").closed += 1;
        Ok(())
    }
}

pub struct Harness {
    pub deployer: Deployer,
    pub sessions: RecordingSessionProvider,
    pub ledger: Arc<MemoryLedger>,
}

pub fn harness(
    environment: Environment,
    dialect: DialectConfig,
    sessions: RecordingSessionProvider,
) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let deployer = Deployer::new(
        Arc::new(environment),
        Arc::new(dialect),
        Arc::new(sessions.clone()),
        ledger.clone(),
    );
    Harness {
        deployer,
        sessions,
        ledger,
    }
}
