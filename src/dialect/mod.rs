//! Per-platform SQL preparation: init statements, the translator chain and disabled change types.

pub mod ase;
mod chain;
mod statement;

use std::collections::BTreeSet;

use anyhow::Result;

use crate::change::ChangeType;
use crate::environment::PhysicalSchema;

pub use chain::{Rewriter, Stage, TranslatorChain};
pub use statement::{CreateTable, StatementKind, split_batches};

/// Immutable per-platform assembly, shared read-only by every deployment to the platform.
#[derive(Debug, Clone)]
pub struct DialectConfig {
    platform: String,
    init_sqls: Vec<String>,
    schema_init_sqls: Vec<String>,
    chain: TranslatorChain,
    disabled: BTreeSet<ChangeType>,
    database_sessions: bool,
}

impl DialectConfig {
    /// Dialect that runs SQL as written.
    pub fn native(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            init_sqls: Vec::new(),
            schema_init_sqls: Vec::new(),
            chain: TranslatorChain::default(),
            disabled: BTreeSet::new(),
            database_sessions: false,
        }
    }

    /// Sybase ASE change sets executed against the in-memory engine.
    pub fn ase_to_in_memory(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            init_sqls: ase::INIT_SQLS.iter().map(|sql| sql.to_string()).collect(),
            schema_init_sqls: ase::SCHEMA_INIT_SQLS.iter().map(|sql| sql.to_string()).collect(),
            chain: ase::translator_chain(),
            disabled: BTreeSet::from([
                ChangeType::Default,
                ChangeType::Function,
                ChangeType::Rule,
                ChangeType::Sp,
                ChangeType::Trigger,
                ChangeType::TriggerIncrementalOld,
            ]),
            database_sessions: false,
        }
    }

    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sqls.push(sql.into());
        self
    }

    pub fn with_schema_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.schema_init_sqls.push(sql.into());
        self
    }

    pub fn with_chain(mut self, chain: TranslatorChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_disabled(mut self, change_type: ChangeType) -> Self {
        self.disabled.insert(change_type);
        self
    }

    /// Sessions are opened inside the schema's database, so objects are named without it.
    pub fn with_database_sessions(mut self) -> Self {
        self.database_sessions = true;
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Statements that must succeed before a schema batch runs.
    pub fn init_sqls(&self) -> &[String] {
        &self.init_sqls
    }

    /// Best-effort statements; failures are ignored.
    pub fn schema_init_sqls(&self) -> &[String] {
        &self.schema_init_sqls
    }

    pub fn chain(&self) -> &TranslatorChain {
        &self.chain
    }

    pub fn disabled_change_types(&self) -> &BTreeSet<ChangeType> {
        &self.disabled
    }

    pub fn is_disabled(&self, change_type: ChangeType) -> bool {
        self.disabled.contains(&change_type)
    }

    /// Prefix for object names in statements the tool writes itself, such as drops.
    pub fn object_qualifier(&self, physical: &PhysicalSchema) -> String {
        if !self.database_sessions {
            return physical.qualifier();
        }
        match &physical.sub_schema {
            Some(sub) => format!("{}.", sub),
            None => String::new(),
        }
    }

    /// Translates a change body into the statements submitted to the target.
    pub fn prepare(&self, script: &str) -> Result<Vec<String>> {
        self.chain.translate_script(script)
    }
}
