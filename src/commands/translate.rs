use std::fs;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use similar::TextDiff;

use crate::cli::{CliArgs, TranslateArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::output::json as json_out;
use crate::platform::PlatformRegistry;

pub fn run(args: &CliArgs, cmd: &TranslateArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);

    let input = match (&cmd.sql, &cmd.file) {
        (Some(_), Some(_)) => return Err(anyhow!("Provide SQL text or --file, not both")),
        (None, None) => return Err(anyhow!("Provide SQL text or --file")),
        (Some(text), None) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
    };

    let dialect = PlatformRegistry::builtin().dialect(&cmd.platform)?;
    let statements = dialect.prepare(&input)?;
    let translated = render_script(&statements);

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "platform": dialect.platform(),
            "statements": statements,
            "changed": normalized(&input) != normalized(&translated),
        });
        let body = json_out::emit_json_value(&payload, common::json_pretty(&resolved))?;
        println!("{}", body);
        return Ok(());
    }

    if cmd.diff {
        let diff = TextDiff::from_lines(&normalized(&input), &normalized(&translated))
            .unified_diff()
            .context_radius(3)
            .header("input", dialect.platform())
            .to_string();
        if diff.is_empty() {
            println!("No changes");
        } else {
            print!("{}", diff);
        }
    } else {
        print!("{}", translated);
    }
    Ok(())
}

/// One statement per batch, separated by `GO` lines.
fn render_script(statements: &[String]) -> String {
    let mut out = String::new();
    for (idx, statement) in statements.iter().enumerate() {
        if idx > 0 {
            out.push_str("GO\n");
        }
        out.push_str(statement);
        out.push('\n');
    }
    out
}

fn normalized(script: &str) -> String {
    let mut text = script.replace("\r\n", "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
