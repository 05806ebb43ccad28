use std::io::{self, Write};

use anyhow::Result;

use crate::cli::CliArgs;
use crate::commands::common;
use crate::config;
use crate::output::{self, TableOptions, json, table};

pub fn run(args: &CliArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let environment = common::build_environment(&resolved)?;
    let format = output::select_format(&args.output, &resolved.settings);

    if args.quiet {
        return Ok(());
    }

    match format {
        config::OutputFormat::Json => {
            let payload = json::config_to_json(&resolved, &environment);
            let body = json::emit_json_value(&payload, resolved.settings.output.json.pretty)?;
            println!("{}", body);
        }
        _ => {
            let mut rows = vec![
                (
                    "configPath".to_string(),
                    resolved
                        .config_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(none)".to_string()),
                ),
                ("environment".to_string(), resolved.environment_name.clone()),
                ("platform".to_string(), resolved.platform().to_string()),
                (
                    "sourcePath".to_string(),
                    resolved
                        .source_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(none)".to_string()),
                ),
                ("server".to_string(), resolved.connection.server.clone()),
                ("port".to_string(), resolved.connection.port.to_string()),
                ("database".to_string(), resolved.connection.database.clone()),
            ];
            if let Some(user) = &resolved.connection.user {
                rows.push(("user".to_string(), user.clone()));
            }
            rows.extend([
                (
                    "encrypt".to_string(),
                    resolved.connection.encrypt.to_string(),
                ),
                (
                    "trustCert".to_string(),
                    resolved.connection.trust_cert.to_string(),
                ),
                (
                    "timeoutMs".to_string(),
                    resolved.connection.timeout_ms.to_string(),
                ),
                (
                    "rollbackDetection".to_string(),
                    environment.is_rollback_detection_enabled().to_string(),
                ),
                (
                    "cleanBuildAllowed".to_string(),
                    environment.is_clean_build_allowed().to_string(),
                ),
                (
                    "maxConcurrency".to_string(),
                    resolved.settings.max_concurrency.to_string(),
                ),
            ]);
            for schema in environment.all_schemas() {
                let physical = environment
                    .physical_schema(schema.name())
                    .map(|physical| physical.to_string())
                    .unwrap_or_default();
                let value = if schema.is_read_only() {
                    format!("{} (read-only)", physical)
                } else {
                    physical
                };
                rows.push((format!("schema {}", schema.name()), value));
            }

            let rendered =
                table::render_key_value_table("Config", &rows, format, &TableOptions::default());
            writeln!(io::stdout(), "{}", rendered)?;
        }
    }

    Ok(())
}
