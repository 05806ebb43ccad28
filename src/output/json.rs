use serde::Serialize;
use serde_json::json;

use crate::config::ResolvedConfig;
use crate::deploy::{CommandSummary, DeployReport, SchemaPlan};
use crate::environment::Environment;

pub fn emit_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

pub fn emit_json_value(value: &serde_json::Value, pretty: bool) -> anyhow::Result<String> {
    emit_json(value, pretty)
}

pub fn error_json(message: &str, kind: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "kind": kind,
        }
    })
}

pub fn report_to_json(report: &DeployReport) -> serde_json::Value {
    let mut value = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.insert("success".to_string(), json!(report.is_success()));
    }
    value
}

pub fn plans_to_json(environment: &Environment, plans: &[SchemaPlan]) -> serde_json::Value {
    let schemas = plans
        .iter()
        .map(|plan| {
            let commands = plan
                .commands
                .iter()
                .map(CommandSummary::from)
                .collect::<Vec<_>>();
            json!({
                "schema": plan.schema,
                "physicalSchema": plan.physical.to_string(),
                "commands": commands,
                "current": plan.current,
                "rollbackCandidates": plan.candidates,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "environment": environment.name(),
        "platform": environment.platform(),
        "schemas": schemas,
    })
}

pub fn config_to_json(resolved: &ResolvedConfig, environment: &Environment) -> serde_json::Value {
    let schemas = environment
        .all_schemas()
        .iter()
        .map(|schema| {
            json!({
                "name": schema.name(),
                "readOnly": schema.is_read_only(),
                "physicalSchema": environment
                    .physical_schema(schema.name())
                    .map(|physical| physical.to_string())
                    .ok(),
            })
        })
        .collect::<Vec<_>>();
    json!({
        "configPath": resolved.config_path.as_ref().map(|p| p.display().to_string()),
        "environment": resolved.environment_name,
        "platform": resolved.platform(),
        "sourcePath": resolved.source_path.as_ref().map(|p| p.display().to_string()),
        "connection": resolved.connection,
        "schemas": schemas,
        "tokens": environment.tokens(),
        "rollbackDetection": environment.is_rollback_detection_enabled(),
        "cleanBuildAllowed": environment.is_clean_build_allowed(),
        "settings": {
            "maxConcurrency": resolved.settings.max_concurrency,
            "output": {
                "defaultFormat": resolved.settings.output.default_format.as_str(),
                "json": {
                    "pretty": resolved.settings.output.json.pretty,
                },
            }
        }
    })
}
