use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use super::{Change, ChangeType};
use crate::error::AppError;

const METADATA_MARKER: &str = "//// METADATA";
const CHANGE_MARKER: &str = "//// CHANGE";

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)(?:\s*=\s*(?:"([^"]*)"|(\S+)))?"#)
            .expect("valid regex")
    })
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("valid regex"))
}

/// Parses the attributes of a `//// METADATA` line. Flags without a value map to an empty string.
///
/// Returns `None` for any other line.
pub fn parse_metadata(line: &str) -> Option<BTreeMap<String, String>> {
    let rest = line.trim().strip_prefix(METADATA_MARKER)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(parse_attributes(rest))
}

fn parse_change_marker(line: &str) -> Option<BTreeMap<String, String>> {
    let rest = line.trim().strip_prefix(CHANGE_MARKER)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(parse_attributes(rest))
}

fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for caps in attribute_regex().captures_iter(text) {
        let key = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        attrs.insert(key, value);
    }
    attrs
}

fn order_attribute(attrs: &BTreeMap<String, String>, origin: &str) -> Result<Option<i32>> {
    match attrs.get("order") {
        Some(raw) => raw.parse::<i32>().map(Some).map_err(|_| {
            AppError::config(format!("Invalid order '{}' in {}", raw, origin)).into()
        }),
        None => Ok(None),
    }
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map(|idx| idx + 1)
        .unwrap_or(start);
    lines[start..end.max(start)].join("\n")
}

/// Turns the text of one source file into its changes.
///
/// Rerunnable types yield a single change named after the object. Incremental types are split on
/// `//// CHANGE name="..."` markers; `DROP_TABLE` on a marker makes that change a drop.
pub fn parse_change_file(
    schema: &str,
    change_type: ChangeType,
    object_name: &str,
    text: &str,
    origin: &str,
) -> Result<Vec<Change>> {
    let mut file_metadata = BTreeMap::new();

    if change_type.is_rerunnable() {
        let mut body = Vec::new();
        for line in text.lines() {
            if let Some(attrs) = parse_metadata(line) {
                file_metadata.extend(attrs);
            } else {
                body.push(line);
            }
        }
        let order = order_attribute(&file_metadata, origin)?;
        let mut change =
            Change::rerunnable(schema, change_type, object_name, trim_blank_lines(&body))
                .with_metadata(file_metadata);
        if let Some(order) = order {
            change = change.with_order(order);
        }
        return Ok(vec![change]);
    }

    let mut changes = Vec::new();
    let mut current: Option<(BTreeMap<String, String>, Vec<&str>)> = None;
    let mut seen = HashSet::new();

    let mut finish = |attrs: BTreeMap<String, String>,
                      lines: Vec<&str>,
                      file_metadata: &BTreeMap<String, String>|
     -> Result<()> {
        let name = attrs
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned()
            .ok_or_else(|| {
                AppError::config(format!("//// CHANGE line without a name in {}", origin))
            })?;
        if !seen.insert(name.clone()) {
            return Err(AppError::config(format!(
                "Change {} is declared more than once in {}",
                name, origin
            ))
            .into());
        }
        let order = order_attribute(&attrs, origin)?.or(order_attribute(file_metadata, origin)?);
        let drop = attrs.contains_key("DROP_TABLE");
        let mut metadata = file_metadata.clone();
        metadata.extend(attrs.into_iter().filter(|(key, _)| key != "name"));
        let mut change = Change::new(
            schema,
            change_type,
            object_name,
            name,
            trim_blank_lines(&lines),
        )
        .with_drop(drop)
        .with_metadata(metadata);
        if let Some(order) = order {
            change = change.with_order(order);
        }
        changes.push(change);
        Ok(())
    };

    for line in text.lines() {
        if let Some(attrs) = parse_change_marker(line) {
            if let Some((prev_attrs, prev_lines)) = current.take() {
                finish(prev_attrs, prev_lines, &file_metadata)?;
            }
            current = Some((attrs, Vec::new()));
            continue;
        }
        match current.as_mut() {
            Some((_, lines)) => lines.push(line),
            None => {
                if let Some(attrs) = parse_metadata(line) {
                    file_metadata.extend(attrs);
                } else if !line.trim().is_empty() {
                    return Err(AppError::config(format!(
                        "Content found before the first //// CHANGE line in {}",
                        origin
                    ))
                    .into());
                }
            }
        }
    }
    if let Some((attrs, lines)) = current.take() {
        finish(attrs, lines, &file_metadata)?;
    }

    Ok(changes)
}

/// Reads every change under the given source directories.
///
/// Layout is `<dir>/<SCHEMA>/<type>/<OBJECT>.sql`. Directories and files are visited in name
/// order and each change gets its declaration position as `seq`.
pub fn read_changes(dirs: &[PathBuf]) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    let mut seen = HashSet::new();

    for dir in dirs {
        for schema_dir in sorted_entries(dir, |path| path.is_dir())? {
            let schema = file_name(&schema_dir);
            for type_dir in sorted_entries(&schema_dir, |path| path.is_dir())? {
                let type_name = file_name(&type_dir);
                let change_type = match type_name.parse::<ChangeType>() {
                    Ok(change_type) => change_type,
                    Err(_) => {
                        warn!(path = %type_dir.display(), "Skipping unknown change type directory");
                        continue;
                    }
                };
                let files = sorted_entries(&type_dir, |path| {
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
                })?;
                for file in files {
                    let object_name = file
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().to_string())
                        .unwrap_or_default();
                    if !seen.insert((schema.clone(), change_type, object_name.clone())) {
                        return Err(AppError::config(format!(
                            "Object {}.{}.{} is declared in more than one source directory ({})",
                            schema,
                            change_type,
                            object_name,
                            file.display()
                        ))
                        .into());
                    }
                    let text = fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let origin = file.display().to_string();
                    for change in
                        parse_change_file(&schema, change_type, &object_name, &text, &origin)?
                    {
                        let seq = changes.len();
                        changes.push(change.with_seq(seq));
                    }
                }
            }
        }
    }

    debug!(count = changes.len(), "Read changes from source");
    Ok(changes)
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list source directory {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if keep(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Replaces `${key}` tokens. Unknown tokens are left as written.
pub fn substitute_tokens(sql: &str, tokens: &BTreeMap<String, String>) -> String {
    if tokens.is_empty() || !sql.contains("${") {
        return sql.to_string();
    }
    token_regex()
        .replace_all(sql, |caps: &regex::Captures| match tokens.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
