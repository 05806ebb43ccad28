use std::io::{self, Write};

use anyhow::Result;

use crate::cli::{CliArgs, DeployArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::deploy::{DeployOptions, DeployStrategy};
use crate::error::{AppError, ErrorKind};
use crate::output::{TableOptions, json as json_out, table};

pub fn run(args: &CliArgs, cmd: &DeployArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let context = common::build_context(&resolved)?;
    let deployer = context.deployer();

    let options = DeployOptions {
        strategy: if cmd.audit_only {
            DeployStrategy::AuditOnly
        } else {
            DeployStrategy::Execute
        },
        max_concurrency: cmd
            .max_concurrency
            .unwrap_or(resolved.settings.max_concurrency)
            .max(1),
    };

    let changes = deployer.load_changes()?;
    let report = common::runtime()?.block_on(async {
        let cancel = common::cancel_on_ctrl_c();
        deployer.deploy(changes, options, cancel).await
    })?;

    if !args.quiet {
        match format {
            OutputFormat::Json => {
                let payload = json_out::report_to_json(&report);
                let body = json_out::emit_json_value(&payload, common::json_pretty(&resolved))?;
                println!("{}", body);
            }
            _ => {
                let rendered = table::render_report(&report, format, &TableOptions::default());
                writeln!(io::stdout(), "{}", rendered)?;
            }
        }
    }

    if report.is_success() {
        return Ok(());
    }

    let failed = report
        .schemas
        .iter()
        .filter(|schema| !schema.status.is_success())
        .map(|schema| format!("{} ({})", schema.schema, schema.status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let kind = report
        .schemas
        .iter()
        .find_map(|schema| schema.error.as_ref().map(|error| error.kind))
        .unwrap_or(ErrorKind::Execution);
    Err(AppError::new(kind, format!("Deployment did not complete for: {}", failed)).into())
}
