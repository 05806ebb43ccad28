use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub default_environment: Option<String>,
    pub settings: Option<Settings>,
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub max_concurrency: Option<usize>,
    pub output: Option<OutputSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    pub default_format: Option<OutputFormat>,
    pub json: Option<JsonSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JsonSettings {
    pub pretty: Option<bool>,
}

/// One deployment target as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub platform: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password_env: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub encrypt: Option<bool>,
    pub trust_cert: Option<bool>,
    pub timeout: Option<u64>,
    pub schema_prefix: Option<String>,
    pub schema_suffix: Option<String>,
    #[serde(default)]
    pub schema_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    pub source_path: Option<String>,
    #[serde(default)]
    pub additional_source_dirs: Vec<String>,
    #[serde(default)]
    pub source_search_path: Vec<String>,
    pub rollback_detection: Option<bool>,
    pub clean_build_allowed: Option<bool>,
}

/// A schema is either a bare name or `{ name, readOnly }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SchemaEntry {
    Name(String),
    Detailed(SchemaConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    pub name: String,
    #[serde(default)]
    pub read_only: bool,
}

impl SchemaEntry {
    pub fn name(&self) -> &str {
        match self {
            SchemaEntry::Name(name) => name,
            SchemaEntry::Detailed(config) => &config.name,
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            SchemaEntry::Name(_) => false,
            SchemaEntry::Detailed(config) => config.read_only,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pretty,
    Markdown,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pretty => "pretty",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_accept_names_and_objects() {
        let yaml = "schemas:\n  - APP\n  - name: LOOKUP\n    readOnly: true\n";
        let env: EnvironmentConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(env.schemas.len(), 2);
        assert_eq!(env.schemas[0].name(), "APP");
        assert!(!env.schemas[0].is_read_only());
        assert_eq!(env.schemas[1].name(), "LOOKUP");
        assert!(env.schemas[1].is_read_only());
    }
}
