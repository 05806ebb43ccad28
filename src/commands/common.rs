use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::CliArgs;
use crate::config::OutputFormat;
use crate::config::{self, ResolvedConfig};
use crate::environment::Environment;
use crate::error::{AppError, ErrorKind, classify_error};
use crate::output;
use crate::platform::{AppContext, PlatformRegistry};

pub fn load_config(args: &CliArgs) -> Result<ResolvedConfig> {
    config::load_from_system(&args.overrides()).map_err(|err| match classify_error(&err) {
        ErrorKind::Internal => AppError::new(ErrorKind::Config, format!("{:#}", err)).into(),
        _ => err,
    })
}

pub fn output_format(args: &CliArgs, resolved: &ResolvedConfig) -> OutputFormat {
    output::select_format(&args.output, &resolved.settings)
}

pub fn json_pretty(resolved: &ResolvedConfig) -> bool {
    resolved.settings.output.json.pretty
}

/// Environment plus platform collaborators for commands that touch the target.
///
/// Refuses to run without a source path: with nothing to compare against, every deployed
/// object would look removed.
pub fn build_context(resolved: &ResolvedConfig) -> Result<AppContext> {
    if resolved.source_path.is_none() {
        return Err(AppError::config(format!(
            "No source path configured for environment '{}'. Set sourcePath, DBDEPLOY_SOURCE_PATH or --source",
            resolved.environment_name
        ))
        .into());
    }
    let environment = Arc::new(resolved.build_environment()?);
    PlatformRegistry::builtin().build_context(resolved, environment)
}

pub fn build_environment(resolved: &ResolvedConfig) -> Result<Environment> {
    resolved.build_environment()
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Token cancelled on Ctrl-C. Schemas already running finish their current batch.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; no further schemas will start");
            child.cancel();
        }
    });
    token
}
