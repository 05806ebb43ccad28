use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::cli::{CliArgs, InitArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::output::{self, json as json_out};

pub fn run(args: &CliArgs, cmd: &InitArgs) -> Result<()> {
    // The environment being initialised usually isn't declared anywhere yet.
    let settings = common::load_config(args)
        .map(|resolved| resolved.settings)
        .unwrap_or_default();
    let format = output::select_format(&args.output, &settings);

    let environment_name = args.environment.as_deref().unwrap_or("default");
    let target = resolve_target_path(cmd.path.as_ref());

    if target.exists() && !cmd.force {
        return Err(anyhow!("Config already exists: {}", target.display()));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let template = render_config_template(environment_name);
    fs::write(&target, template)?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "path": target.display().to_string(),
            "created": true,
            "overwritten": cmd.force,
        });
        let body = json_out::emit_json_value(&payload, settings.output.json.pretty)?;
        println!("{}", body);
    } else {
        println!("Wrote config to {}", target.display());
    }

    Ok(())
}

fn resolve_target_path(path: Option<&PathBuf>) -> PathBuf {
    match path {
        Some(path)
            if path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json")) =>
        {
            path.clone()
        }
        Some(path) => path.join(".dbdeploy").join("config.yaml"),
        None => Path::new(".dbdeploy").join("config.yaml"),
    }
}

fn render_config_template(environment: &str) -> String {
    format!(
        r#"# dbdeploy configuration

defaultEnvironment: {environment}
settings:
  # Schemas deployed at the same time.
  maxConcurrency: 4
  output:
    # Values: pretty | markdown | json
    defaultFormat: pretty
    json:
      pretty: true

environments:
  {environment}:
    # sqlserver | sybase-ase | sybase-ase-inmemory
    platform: sqlserver
    server: localhost
    port: 1433
    database: master
    user: sa
    passwordEnv: SQL_PASSWORD
    encrypt: true
    trustCert: true
    timeout: 30000
    # Change files live in <sourcePath>/<SCHEMA>/<type>/<OBJECT>.sql
    sourcePath: db
    schemaPrefix: ""
    schemaSuffix: ""
    schemas:
      - name: APP
    tokens: {{}}
    rollbackDetection: true
"#
    )
}
