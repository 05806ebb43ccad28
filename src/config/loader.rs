use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use super::env::{Env, parse_bool};
use super::schema::{ConfigFile, EnvironmentConfig, OutputFormat, OutputSettings, Settings};
use crate::environment::{Environment, FileSystemResolver, Schema, SearchPathResolver};
use crate::error::AppError;

pub const DEFAULT_PLATFORM: &str = "sqlserver";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: Option<u64>,
    pub encrypt: Option<bool>,
    pub trust_cert: Option<bool>,
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub cli: CliOverrides,
    pub cwd: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub xdg_config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub environment_name: String,
    pub environment: EnvironmentConfig,
    pub connection: ConnectionSettings,
    pub settings: SettingsResolved,
    /// Directory relative source paths are resolved against.
    pub base_dir: PathBuf,
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub encrypt: bool,
    pub trust_cert: bool,
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 1433,
            database: "master".to_string(),
            user: None,
            password: None,
            encrypt: true,
            trust_cert: true,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsResolved {
    pub max_concurrency: usize,
    pub output: OutputSettingsResolved,
}

#[derive(Debug, Clone)]
pub struct OutputSettingsResolved {
    pub default_format: OutputFormat,
    pub json: JsonSettingsResolved,
}

#[derive(Debug, Clone)]
pub struct JsonSettingsResolved {
    pub pretty: bool,
}

impl Default for SettingsResolved {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            output: OutputSettingsResolved {
                default_format: OutputFormat::Pretty,
                json: JsonSettingsResolved { pretty: true },
            },
        }
    }
}

impl ResolvedConfig {
    pub fn platform(&self) -> &str {
        self.environment
            .platform
            .as_deref()
            .unwrap_or(DEFAULT_PLATFORM)
    }

    /// Builds the deployment target. Credentials come from the resolved connection.
    pub fn build_environment(&self) -> Result<Environment> {
        let config = &self.environment;
        let mut builder = Environment::builder(&self.environment_name, self.platform())
            .default_credentials(
                self.connection.user.clone(),
                self.connection.password.clone(),
            )
            .schema_prefix(config.schema_prefix.clone().unwrap_or_default())
            .schema_suffix(config.schema_suffix.clone().unwrap_or_default())
            .rollback_detection(config.rollback_detection.unwrap_or(true))
            .clean_build_allowed(config.clean_build_allowed.unwrap_or(false))
            .resolver(Arc::new(FileSystemResolver::new(&self.base_dir)));

        if !config.source_search_path.is_empty() {
            let roots = config
                .source_search_path
                .iter()
                .map(|root| self.base_dir.join(root))
                .collect();
            builder = builder.resolver(Arc::new(SearchPathResolver::new(roots)));
        }

        for entry in &config.schemas {
            let schema = if entry.is_read_only() {
                Schema::read_only(entry.name())
            } else {
                Schema::new(entry.name())
            };
            builder = builder.schema(schema);
        }
        for (schema, physical) in &config.schema_overrides {
            builder = builder.schema_override(schema, physical);
        }
        for (key, value) in &config.tokens {
            builder = builder.token(key, value);
        }
        if let Some(source) = &self.source_path {
            builder = builder.core_source(source);
        }
        for dir in &config.additional_source_dirs {
            builder = builder.additional_source(dir);
        }

        builder.build()
    }
}

pub fn load_config(options: &LoadOptions, env: &Env) -> Result<ResolvedConfig> {
    let config_path = resolve_config_path(options, env)?;
    let config_file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let environment_name =
        resolve_environment_name(options, env, config_file.default_environment.as_deref());

    let environment = match config_file.environments.get(&environment_name) {
        Some(environment) => environment.clone(),
        None if config_file.environments.is_empty() && environment_name == "default" => {
            EnvironmentConfig::default()
        }
        None => {
            let mut available: Vec<_> = config_file.environments.keys().cloned().collect();
            available.sort();
            return Err(AppError::config(format!(
                "Environment [{}] is not declared; available environments: {}",
                environment_name,
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            ))
            .into());
        }
    };

    let base_dir = config_path
        .as_deref()
        .and_then(config_base_dir)
        .unwrap_or_else(|| options.cwd.clone());

    let mut connection = ConnectionSettings::default();
    let mut settings = SettingsResolved::default();

    if let Some(settings_cfg) = &config_file.settings {
        apply_settings(&mut settings, settings_cfg);
    }
    apply_environment(&mut connection, &environment, env);

    apply_env_overrides(&mut connection, env);
    apply_cli_overrides(&mut connection, &options.cli);

    let source_path = options
        .cli
        .source_path
        .clone()
        .map(|path| absolutize(&options.cwd, &path))
        .or_else(|| {
            env.get("DBDEPLOY_SOURCE_PATH")
                .map(|path| absolutize(&options.cwd, Path::new(&path)))
        })
        .or_else(|| {
            environment
                .source_path
                .as_deref()
                .map(|path| absolutize(&base_dir, Path::new(path)))
        });

    Ok(ResolvedConfig {
        config_path,
        environment_name,
        environment,
        connection,
        settings,
        base_dir,
        source_path,
    })
}

/// A config under `<project>/.dbdeploy/` resolves paths against `<project>`.
fn config_base_dir(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.file_name().is_some_and(|name| name == ".dbdeploy") {
        return parent.parent().map(Path::to_path_buf);
    }
    Some(parent.to_path_buf())
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn resolve_environment_name(
    options: &LoadOptions,
    env: &Env,
    default_environment: Option<&str>,
) -> String {
    if let Some(name) = options.cli.environment.as_deref() {
        return name.to_string();
    }
    if let Some(name) = env.get("DBDEPLOY_ENV") {
        return name;
    }
    if let Some(name) = default_environment {
        return name.to_string();
    }
    "default".to_string()
}

fn resolve_config_path(options: &LoadOptions, env: &Env) -> Result<Option<PathBuf>> {
    if let Some(path) = &options.cli.config_path {
        if !path.exists() {
            return Err(
                AppError::config(format!("Config file not found: {}", path.display())).into(),
            );
        }
        return Ok(Some(path.clone()));
    }

    if let Some(path) = env.get("DBDEPLOY_CONFIG") {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(
                AppError::config(format!("Config file not found: {}", path.display())).into(),
            );
        }
        return Ok(Some(path));
    }

    if let Some(path) = find_local_config(&options.cwd, options.home_dir.as_deref()) {
        return Ok(Some(path));
    }

    if let Some(path) = find_global_config(options.xdg_config_dir.as_deref()) {
        return Ok(Some(path));
    }

    Ok(None)
}

fn find_local_config(start: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let candidates = [
        ".dbdeploy/config.yaml",
        ".dbdeploy/config.yml",
        ".dbdeploy/config.json",
    ];

    for dir in start.ancestors() {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }

        if let Some(home_dir) = home {
            if dir == home_dir {
                break;
            }
        }
    }

    None
}

fn find_global_config(xdg_config: Option<&Path>) -> Option<PathBuf> {
    let base = xdg_config?;
    let candidates = [
        "dbdeploy/config.yaml",
        "dbdeploy/config.yml",
        "dbdeploy/config.json",
    ];

    for candidate in &candidates {
        let path = base.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let parsed: Result<ConfigFile> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content)
                .map_err(|err| anyhow!("Failed to parse YAML config: {}", err))
        }
        Some("json") => {
            serde_json::from_str(&content)
                .map_err(|err| anyhow!("Failed to parse JSON config: {}", err))
        }
        _ => Err(anyhow!("Unsupported config file extension")),
    };
    parsed.map_err(|err| AppError::config(format!("{} ({})", err, path.display())).into())
}

fn apply_environment(
    connection: &mut ConnectionSettings,
    environment: &EnvironmentConfig,
    env: &Env,
) {
    if let Some(server) = &environment.server {
        connection.server = server.clone();
    }
    if let Some(port) = environment.port {
        connection.port = port;
    }
    if let Some(database) = &environment.database {
        connection.database = database.clone();
    }
    if let Some(user) = &environment.user {
        connection.user = Some(user.clone());
    }
    if let Some(password) = &environment.password {
        connection.password = Some(password.clone());
    } else if let Some(env_key) = &environment.password_env {
        if let Some(value) = env.get(env_key) {
            connection.password = Some(value);
        }
    }
    if let Some(encrypt) = environment.encrypt {
        connection.encrypt = encrypt;
    }
    if let Some(trust_cert) = environment.trust_cert {
        connection.trust_cert = trust_cert;
    }
    if let Some(timeout) = environment.timeout {
        connection.timeout_ms = timeout;
    }
}

fn apply_settings(settings: &mut SettingsResolved, overrides: &Settings) {
    if let Some(max_concurrency) = overrides.max_concurrency {
        settings.max_concurrency = max_concurrency.max(1);
    }
    if let Some(output) = &overrides.output {
        apply_output_settings(&mut settings.output, output);
    }
}

fn apply_output_settings(settings: &mut OutputSettingsResolved, overrides: &OutputSettings) {
    if let Some(default_format) = overrides.default_format {
        settings.default_format = default_format;
    }
    if let Some(json) = &overrides.json {
        if let Some(pretty) = json.pretty {
            settings.json.pretty = pretty;
        }
    }
}

fn apply_env_overrides(connection: &mut ConnectionSettings, env: &Env) {
    if let Some(url) = env.get_any(&["DATABASE_URL", "DB_URL"]) {
        if let Ok(parsed) = parse_connection_url(&url) {
            if let Some(server) = parsed.server {
                connection.server = server;
            }
            if let Some(port) = parsed.port {
                connection.port = port;
            }
            if let Some(database) = parsed.database {
                connection.database = database;
            }
            if let Some(user) = parsed.user {
                connection.user = Some(user);
            }
            if let Some(password) = parsed.password {
                connection.password = Some(password);
            }
        }
    }

    if let Some(server) = env.get_any(&["SQL_SERVER", "DB_HOST"]) {
        connection.server = server;
    }
    if let Some(port) = env.get_any(&["SQL_PORT", "DB_PORT"]) {
        if let Ok(port) = port.parse::<u16>() {
            connection.port = port;
        }
    }
    if let Some(database) = env.get_any(&["SQL_DATABASE", "DB_NAME"]) {
        connection.database = database;
    }
    if let Some(user) = env.get_any(&["SQL_USER", "DB_USER"]) {
        connection.user = Some(user);
    }
    if let Some(password) = env.get_any(&["SQL_PASSWORD", "DB_PASSWORD"]) {
        connection.password = Some(password);
    }
    if let Some(encrypt) = env.get("SQL_ENCRYPT").and_then(|v| parse_bool(&v)) {
        connection.encrypt = encrypt;
    }
    if let Some(trust_cert) = env
        .get("SQL_TRUST_SERVER_CERTIFICATE")
        .and_then(|v| parse_bool(&v))
    {
        connection.trust_cert = trust_cert;
    }
    if let Some(timeout) = env.get_any(&["SQL_CONNECT_TIMEOUT", "DB_CONNECT_TIMEOUT"]) {
        if let Ok(timeout) = timeout.parse::<u64>() {
            connection.timeout_ms = timeout;
        }
    }
}

fn apply_cli_overrides(connection: &mut ConnectionSettings, cli: &CliOverrides) {
    if let Some(server) = &cli.server {
        connection.server = server.clone();
    }
    if let Some(port) = cli.port {
        connection.port = port;
    }
    if let Some(database) = &cli.database {
        connection.database = database.clone();
    }
    if let Some(user) = &cli.user {
        connection.user = Some(user.clone());
    }
    if let Some(password) = &cli.password {
        connection.password = Some(password.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        connection.timeout_ms = timeout_ms;
    }
    if let Some(encrypt) = cli.encrypt {
        connection.encrypt = encrypt;
    }
    if let Some(trust_cert) = cli.trust_cert {
        connection.trust_cert = trust_cert;
    }
}

#[derive(Debug, Default)]
struct ParsedUrl {
    server: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

fn parse_connection_url(input: &str) -> Result<ParsedUrl> {
    let remaining = match input.trim().split_once("://") {
        Some((_, rest)) => rest,
        None => input.trim(),
    };

    let (auth_part, host_part) = match remaining.rsplit_once('@') {
        Some((auth, host)) => (Some(auth), host),
        None => (None, remaining),
    };

    let (host_port, path_part) = match host_part.split_once('/') {
        Some((host, path)) => (host, Some(path)),
        None => (host_part, None),
    };

    let mut parsed = ParsedUrl::default();

    if let Some(auth) = auth_part {
        let (user, pass) = auth.split_once(':').unwrap_or((auth, ""));
        if !user.is_empty() {
            parsed.user = Some(user.to_string());
        }
        if !pass.is_empty() {
            parsed.password = Some(pass.to_string());
        }
    }

    if !host_port.is_empty() {
        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        };
        if !host.is_empty() {
            parsed.server = Some(host.to_string());
        }
        if let Some(port) = port.and_then(|port| port.parse::<u16>().ok()) {
            parsed.port = Some(port);
        }
    }

    if let Some(path) = path_part {
        let db = path.split('?').next().unwrap_or("");
        if !db.is_empty() {
            parsed.database = Some(db.to_string());
        }
    }

    if parsed.server.is_none() && parsed.database.is_none() && parsed.user.is_none() {
        return Err(anyhow!("Invalid connection URL"));
    }

    Ok(parsed)
}
