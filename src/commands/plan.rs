use std::io::{self, Write};

use anyhow::Result;

use crate::cli::{CliArgs, PlanArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::output::{TableOptions, json as json_out, table};

pub fn run(args: &CliArgs, _cmd: &PlanArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let context = common::build_context(&resolved)?;
    let deployer = context.deployer();

    let changes = deployer.load_changes()?;
    let plans = common::runtime()?.block_on(deployer.plan(changes))?;

    if args.quiet {
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let payload = json_out::plans_to_json(&context.environment, &plans);
            let body = json_out::emit_json_value(&payload, common::json_pretty(&resolved))?;
            println!("{}", body);
        }
        _ => {
            let rendered = table::render_plans(&plans, format, &TableOptions::default());
            writeln!(io::stdout(), "{}", rendered)?;
        }
    }
    Ok(())
}
