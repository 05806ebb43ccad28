//! Deployment target description and logical → physical schema resolution.

mod physical;
mod source;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::error::AppError;

pub use physical::PhysicalSchema;
pub use source::{FileResolver, FileSystemResolver, SearchPathResolver, SourceDirs};

/// A declared logical schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    name: String,
    read_only: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: false,
        }
    }

    pub fn read_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug)]
pub struct Environment {
    name: String,
    platform: String,
    schemas: Vec<Schema>,
    tokens: BTreeMap<String, String>,
    default_user: Option<String>,
    default_password: Option<String>,
    schema_prefix: String,
    schema_suffix: String,
    schema_overrides: HashMap<String, String>,
    rollback_detection: bool,
    clean_build_allowed: bool,
    sources: SourceDirs,
}

impl Environment {
    pub fn builder(name: impl Into<String>, platform: impl Into<String>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(name, platform)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn display_string(&self) -> String {
        format!("Environment [{}]", self.name)
    }

    /// Deployable schemas: everything declared except read-only schemas.
    pub fn schemas(&self) -> Vec<&Schema> {
        self.schemas.iter().filter(|s| !s.is_read_only()).collect()
    }

    /// Every declared schema, read-only included.
    pub fn all_schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn schema_names(&self) -> BTreeSet<String> {
        self.schemas().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.iter().any(|s| s.name() == name)
    }

    pub fn is_deployable(&self, name: &str) -> bool {
        self.schemas
            .iter()
            .any(|s| s.name() == name && !s.is_read_only())
    }

    pub fn schema_prefix(&self) -> &str {
        &self.schema_prefix
    }

    pub fn schema_suffix(&self) -> &str {
        &self.schema_suffix
    }

    pub fn schema_overrides(&self) -> &HashMap<String, String> {
        &self.schema_overrides
    }

    /// Resolves a logical schema to its physical identity.
    ///
    /// An override is used verbatim; otherwise the prefix and suffix wrap the physical name
    /// (the sub-schema qualifier, if any, is left alone).
    pub fn physical_schema(&self, name: &str) -> Result<PhysicalSchema> {
        if !self.has_schema(name) {
            let available = self
                .schemas
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(",");
            return Err(AppError::config(format!(
                "Schema does not exist in the environment. Requested schema: {}; available schemas: {}",
                name, available
            ))
            .into());
        }
        Ok(self.resolve_physical(name))
    }

    pub fn physical_schemas(&self) -> BTreeSet<PhysicalSchema> {
        self.schemas()
            .iter()
            .map(|s| self.resolve_physical(s.name()))
            .collect()
    }

    pub fn all_physical_schemas(&self) -> BTreeSet<PhysicalSchema> {
        self.schemas
            .iter()
            .map(|s| self.resolve_physical(s.name()))
            .collect()
    }

    fn resolve_physical(&self, name: &str) -> PhysicalSchema {
        if let Some(value) = self.schema_overrides.get(name) {
            return PhysicalSchema::parse(value);
        }
        let parsed = PhysicalSchema::parse(name);
        PhysicalSchema {
            physical_name: format!(
                "{}{}{}",
                self.schema_prefix, parsed.physical_name, self.schema_suffix
            ),
            sub_schema: parsed.sub_schema,
        }
    }

    pub fn tokens(&self) -> &BTreeMap<String, String> {
        &self.tokens
    }

    /// Declared tokens plus one `<SCHEMA>_physicalName` token per schema.
    /// Declared tokens win on collision.
    pub fn substitution_tokens(&self) -> BTreeMap<String, String> {
        let mut tokens = BTreeMap::new();
        for schema in &self.schemas {
            let physical = self.resolve_physical(schema.name());
            tokens.insert(
                format!("{}_physicalName", schema.name()),
                physical.to_string(),
            );
        }
        for (key, value) in &self.tokens {
            tokens.insert(key.clone(), value.clone());
        }
        tokens
    }

    pub fn credential(&self) -> Option<Credential> {
        match (&self.default_user, &self.default_password) {
            (Some(user), Some(password)) => Some(Credential {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_rollback_detection_enabled(&self) -> bool {
        self.rollback_detection
    }

    pub fn is_clean_build_allowed(&self) -> bool {
        self.clean_build_allowed
    }

    pub fn sources(&self) -> &SourceDirs {
        &self.sources
    }

    pub fn source_dirs(&self) -> Result<Vec<PathBuf>> {
        self.sources.resolve()
    }

    pub fn reset_source_dirs(&self) {
        self.sources.reset();
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

#[derive(Debug)]
pub struct EnvironmentBuilder {
    name: String,
    platform: String,
    schemas: Vec<Schema>,
    tokens: BTreeMap<String, String>,
    default_user: Option<String>,
    default_password: Option<String>,
    schema_prefix: String,
    schema_suffix: String,
    schema_overrides: HashMap<String, String>,
    rollback_detection: bool,
    clean_build_allowed: bool,
    core_source: Option<PathBuf>,
    additional_sources: Vec<String>,
    resolvers: Vec<Arc<dyn FileResolver>>,
}

impl EnvironmentBuilder {
    fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            schemas: Vec::new(),
            tokens: BTreeMap::new(),
            default_user: None,
            default_password: None,
            schema_prefix: String::new(),
            schema_suffix: String::new(),
            schema_overrides: HashMap::new(),
            rollback_detection: true,
            clean_build_allowed: false,
            core_source: None,
            additional_sources: Vec::new(),
            resolvers: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn schemas(mut self, schemas: impl IntoIterator<Item = Schema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    pub fn token(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.insert(key.into(), value.into());
        self
    }

    pub fn default_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.default_user = user;
        self.default_password = password;
        self
    }

    pub fn schema_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema_prefix = prefix.into();
        self
    }

    pub fn schema_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.schema_suffix = suffix.into();
        self
    }

    pub fn schema_override(
        mut self,
        schema: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        self.schema_overrides.insert(schema.into(), physical.into());
        self
    }

    pub fn rollback_detection(mut self, enabled: bool) -> Self {
        self.rollback_detection = enabled;
        self
    }

    pub fn clean_build_allowed(mut self, allowed: bool) -> Self {
        self.clean_build_allowed = allowed;
        self
    }

    pub fn core_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.core_source = Some(path.into());
        self
    }

    pub fn additional_source(mut self, path: impl Into<String>) -> Self {
        self.additional_sources.push(path.into());
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn FileResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn build(self) -> Result<Environment> {
        let mut seen = BTreeSet::new();
        for schema in &self.schemas {
            if schema.name().trim().is_empty() {
                return Err(AppError::config(format!(
                    "Environment [{}] declares a schema with an empty name",
                    self.name
                ))
                .into());
            }
            if !seen.insert(schema.name().to_string()) {
                return Err(AppError::config(format!(
                    "Environment [{}] declares schema {} more than once",
                    self.name,
                    schema.name()
                ))
                .into());
            }
        }
        for key in self.schema_overrides.keys() {
            if !seen.contains(key) {
                return Err(AppError::config(format!(
                    "Environment [{}] overrides undeclared schema {}",
                    self.name, key
                ))
                .into());
            }
        }

        let resolvers = if self.resolvers.is_empty() {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            vec![Arc::new(FileSystemResolver::new(cwd)) as Arc<dyn FileResolver>]
        } else {
            self.resolvers
        };

        Ok(Environment {
            name: self.name,
            platform: self.platform,
            schemas: self.schemas,
            tokens: self.tokens,
            default_user: self.default_user,
            default_password: self.default_password,
            schema_prefix: self.schema_prefix,
            schema_suffix: self.schema_suffix,
            schema_overrides: self.schema_overrides,
            rollback_detection: self.rollback_detection,
            clean_build_allowed: self.clean_build_allowed,
            sources: SourceDirs::new(self.core_source, self.additional_sources, resolvers),
        })
    }
}
