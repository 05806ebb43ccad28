//! Sybase ASE → in-memory engine translation rules.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};

use super::chain::{Rewriter, Stage, TranslatorChain};
use super::statement::rewrite_code;
use crate::error::AppError;

pub const INIT_SQLS: &[&str] = &["SET DATABASE SQL SYNTAX MSS TRUE"];

pub const SCHEMA_INIT_SQLS: &[&str] = &[
    "CREATE DOMAIN TEXT AS LONGVARCHAR",
    "CREATE DOMAIN SMALLDATETIME AS DATETIME",
    "CREATE DOMAIN XML AS BLOB",
    "CREATE DOMAIN MONEY AS NUMERIC(30,2)",
];

const DATETIME_FORMATS: &[&str] = &["%b %d %Y %I:%M%p", "%b %d %Y %I:%M:%S%p", "%b %d %Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%b %d %Y", "%m/%d/%Y"];

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("valid regex"))
        }
    };
}

regex!(
    column_type_regex,
    r#"(?i)^(\s*(?:\[[^\]]+\]|"[^"]+"|\w+)\s+)(longsysname|sysname|univarchar|unichar|unitext|image)\b"#
);
regex!(clustered_regex, r"(?i)\s+(?:non)?clustered\b");
regex!(lock_regex, r"(?i)\s+lock\s+(?:datarows|allpages|datapages)\b");
regex!(
    table_option_regex,
    r"(?i)\s+with\s+(?:identity_gap|max_rows_per_page|exp_row_size|reservepagegap)\s*=\s*\d+(?:\s*,\s*(?:identity_gap|max_rows_per_page|exp_row_size|reservepagegap)\s*=\s*\d+)*"
);
regex!(
    create_index_regex,
    r"(?i)\bcreate\s+(unique\s+)?(?:non)?clustered\s+index\b"
);
regex!(string_literal_regex, r"'([^']*)'");
regex!(getdate_regex, r"(?i)\bgetdate\s*\(\s*\)");
regex!(holdlock_regex, r"(?i)\s+(?:no)?holdlock\b");
regex!(
    addtype_regex,
    r#"(?im)^(\s*)(?:exec(?:ute)?\s+)?sp_addtype\s+["']?(\w+)["']?\s*,\s*["']([^"']+)["'](?:\s*,\s*["']?([^"'\r\n]+?)["']?)?\s*;?\s*$"#
);
regex!(
    rename_call_regex,
    r#"(?im)^(\s*)(?:exec(?:ute)?\s+)?sp_rename\b([^\r\n]*)$"#
);
regex!(
    rename_args_regex,
    r#"^\s*["']([^"']+)["']\s*,\s*["']([^"']+)["'](?:\s*,\s*["']?(\w+)["']?)?\s*;?\s*$"#
);

/// Maps ASE-only column types to the in-memory engine's equivalents.
pub fn map_column_types(column: &str) -> String {
    column_type_regex()
        .replace(column, |caps: &Captures| {
            let target = match caps[2].to_ascii_lowercase().as_str() {
                "sysname" => "varchar(30)",
                "longsysname" => "varchar(255)",
                "unichar" => "char",
                "univarchar" => "varchar",
                "unitext" => "clob",
                "image" => "blob",
                other => return format!("{}{}", &caps[1], other),
            };
            format!("{}{}", &caps[1], target)
        })
        .into_owned()
}

pub fn strip_constraint_clustering(clause: &str) -> String {
    rewrite_code(clause, |code| clustered_regex().replace_all(code, "").into_owned())
}

pub fn strip_table_options(sql: &str) -> String {
    rewrite_code(sql, |code| {
        let without_lock = lock_regex().replace_all(code, "");
        table_option_regex().replace_all(&without_lock, "").into_owned()
    })
}

pub fn strip_index_clustering(sql: &str) -> String {
    rewrite_code(sql, |code| {
        create_index_regex()
            .replace_all(code, |caps: &Captures| match caps.get(1) {
                Some(_) => "CREATE UNIQUE INDEX".to_string(),
                None => "CREATE INDEX".to_string(),
            })
            .into_owned()
    })
}

/// Rewrites string literals holding an accepted ASE date format to ISO form.
pub fn reformat_dates(sql: &str) -> String {
    string_literal_regex()
        .replace_all(sql, |caps: &Captures| match parse_ase_date(&caps[1]) {
            Some(iso) => format!("'{}'", iso),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn parse_ase_date(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return Some(parsed.format("%Y-%m-%d").to_string());
        }
    }
    None
}

pub fn replace_getdate(sql: &str) -> String {
    rewrite_code(sql, |code| {
        getdate_regex()
            .replace_all(code, "CURRENT_TIMESTAMP")
            .into_owned()
    })
}

pub fn strip_holdlock(sql: &str) -> String {
    rewrite_code(sql, |code| holdlock_regex().replace_all(code, "").into_owned())
}

/// `sp_addtype name, 'type'` → `CREATE DOMAIN name AS type`.
pub fn addtype_to_domain(sql: &str) -> String {
    addtype_regex()
        .replace_all(sql, |caps: &Captures| {
            format!("{}CREATE DOMAIN {} AS {}", &caps[1], &caps[2], caps[3].trim())
        })
        .into_owned()
}

/// `sp_rename 'T.old', 'new'` → column rename, `sp_rename 'T', 'T2'` → table rename.
pub fn rename_to_alter(sql: &str) -> anyhow::Result<String> {
    if !rename_call_regex().is_match(sql) {
        return Ok(sql.to_string());
    }
    let mut failure = None;
    let rewritten = rename_call_regex().replace_all(sql, |caps: &Captures| {
        let Some(args) = rename_args_regex().captures(&caps[2]) else {
            failure.get_or_insert_with(|| caps[0].trim().to_string());
            return caps[0].to_string();
        };
        let target = &args[1];
        let new_name = &args[2];
        match target.rsplit_once('.') {
            Some((table, column)) => format!(
                "{}ALTER TABLE {} ALTER COLUMN {} RENAME TO {}",
                &caps[1], table, column, new_name
            ),
            None => format!("{}ALTER TABLE {} RENAME TO {}", &caps[1], target, new_name),
        }
    });
    if let Some(call) = failure {
        return Err(AppError::translation(format!(
            "sp_rename requires two quoted arguments: {}",
            call
        ))
        .into());
    }
    Ok(rewritten.into_owned())
}

pub fn translator_chain() -> TranslatorChain {
    TranslatorChain::new()
        .with(Stage::Column, Rewriter::infallible("ase-column-types", map_column_types))
        .with(
            Stage::PostColumn,
            Rewriter::infallible("ase-constraint-clustering", strip_constraint_clustering),
        )
        .with(Stage::PostParsed, Rewriter::infallible("ase-table-options", strip_table_options))
        .with(
            Stage::PostParsed,
            Rewriter::infallible("ase-index-clustering", strip_index_clustering),
        )
        .with(Stage::PostParsed, Rewriter::infallible("ase-date-formats", reformat_dates))
        .with(Stage::Unparsed, Rewriter::infallible("ase-getdate", replace_getdate))
        .with(Stage::Unparsed, Rewriter::infallible("ase-holdlock", strip_holdlock))
        .with(Stage::Unparsed, Rewriter::infallible("ase-addtype", addtype_to_domain))
        .with(Stage::Unparsed, Rewriter::new("ase-rename", rename_to_alter))
}
