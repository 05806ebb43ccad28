use comfy_table::{ContentArrangement, Table, presets};

use crate::config::OutputFormat;
use crate::deploy::{CommandSummary, DeployReport, SchemaPlan, SchemaReport};

const NONE_DISPLAY: &str = "—";
const ELLIPSIS: &str = "…";
const DEFAULT_MAX_CELL_WIDTH: usize = 140;
const DEFAULT_MAX_OUTPUT_CHARS: usize = 25_000;

#[derive(Debug, Clone)]
pub struct TableOptions {
    pub max_cell_width: usize,
    pub max_output_chars: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            max_cell_width: DEFAULT_MAX_CELL_WIDTH,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

fn new_table(format: OutputFormat) -> Table {
    let mut table = Table::new();
    match format {
        OutputFormat::Markdown => {
            table.load_preset(presets::ASCII_MARKDOWN);
        }
        _ => {
            table.load_preset(presets::UTF8_FULL);
        }
    }
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Per-schema outcome followed by the commands each schema ran.
pub fn render_report(
    report: &DeployReport,
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let mut table = new_table(format);
    table.set_header(vec!["Schema", "Physical", "Status", "Executed", "Current", "Error"]);
    for schema in &report.schemas {
        table.add_row(vec![
            schema.schema.clone(),
            physical_cell(schema),
            schema.status.as_str().to_string(),
            schema.commands.len().to_string(),
            schema.current.to_string(),
            schema
                .error
                .as_ref()
                .map(|error| truncate_string(&first_line(&error.message), options.max_cell_width))
                .unwrap_or_else(|| NONE_DISPLAY.to_string()),
        ]);
    }

    let mut output = format!(
        "{} {} ({})\n{}",
        capitalize(report.verb),
        report.environment,
        if report.is_success() { "ok" } else { "failed" },
        table
    );

    for schema in report.schemas.iter().filter(|s| !s.commands.is_empty()) {
        output.push_str(&format!("\n\n{} commands\n", schema.schema));
        output.push_str(&commands_table(&schema.commands, format, options));
    }
    for schema in report.schemas.iter().filter(|s| !s.rollback_candidates.is_empty()) {
        output.push_str(&format!("\n\n{} rollback candidates\n", schema.schema));
        for candidate in &schema.rollback_candidates {
            output.push_str(&format!("- {}\n", candidate.describe()));
        }
    }

    truncate_output(output, options.max_output_chars)
}

pub fn render_plans(plans: &[SchemaPlan], format: OutputFormat, options: &TableOptions) -> String {
    let mut output = String::new();
    for plan in plans {
        if !output.is_empty() {
            output.push_str("\n\n");
        }
        output.push_str(&format!(
            "{} ({}): {} to run, {} current",
            plan.schema,
            plan.physical,
            plan.commands.len(),
            plan.current
        ));
        if !plan.commands.is_empty() {
            let summaries = plan
                .commands
                .iter()
                .map(CommandSummary::from)
                .collect::<Vec<_>>();
            output.push('\n');
            output.push_str(&commands_table(&summaries, format, options));
        }
        for candidate in &plan.candidates {
            output.push_str(&format!("\nrollback: {}", candidate.describe()));
        }
    }
    if output.is_empty() {
        output.push_str("No deployable schemas");
    }
    truncate_output(output, options.max_output_chars)
}

fn commands_table(
    commands: &[CommandSummary],
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let mut table = new_table(format);
    table.set_header(vec!["#", "Type", "Change", "Order", "Drop", "Checksum"]);
    for (idx, command) in commands.iter().enumerate() {
        table.add_row(vec![
            (idx + 1).to_string(),
            command.change_type.to_string(),
            truncate_string(&command.key.to_string(), options.max_cell_width),
            command.order.to_string(),
            if command.drop { "yes" } else { "" }.to_string(),
            command.checksum.chars().take(12).collect(),
        ]);
    }
    table.to_string()
}

pub fn render_key_value_table(
    title: &str,
    rows: &[(String, String)],
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let mut table = new_table(format);
    table.set_header(vec![title.to_string(), "Value".to_string()]);

    for (key, value) in rows {
        let key = truncate_string(key, options.max_cell_width);
        let value = truncate_string(value, options.max_cell_width);
        table.add_row(vec![key, value]);
    }

    truncate_output(table.to_string(), options.max_output_chars)
}

fn physical_cell(schema: &SchemaReport) -> String {
    schema
        .physical_schema
        .as_ref()
        .map(|physical| physical.to_string())
        .unwrap_or_else(|| NONE_DISPLAY.to_string())
}

fn first_line(input: &str) -> String {
    input.lines().next().unwrap_or_default().to_string()
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_string(input: &str, max_len: usize) -> String {
    let len = input.chars().count();
    if len <= max_len {
        return input.to_string();
    }
    if max_len <= 1 {
        return ELLIPSIS.to_string();
    }
    let truncated: String = input.chars().take(max_len - 1).collect();
    format!("{}{}", truncated, ELLIPSIS)
}

fn truncate_output(output: String, max_len: usize) -> String {
    if output.len() <= max_len {
        return output;
    }
    let mut truncated = output.chars().take(max_len).collect::<String>();
    truncated.push_str("\n[output truncated]");
    truncated
}
