//! Coarse statement model: batch splitting, classification and a lossless `CREATE TABLE` split.
//! This is not a SQL parser; anything it does not recognise is left to the text-level stages.

use std::sync::OnceLock;

use regex::Regex;

/// Splits a script into batches on lines that consist solely of `GO`.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = Vec::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("GO") {
            if !current.is_empty() {
                push_batch(&mut batches, &current);
                current.clear();
            }
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        push_batch(&mut batches, &current);
    }

    batches
}

fn push_batch(batches: &mut Vec<String>, lines: &[&str]) {
    let batch = lines.join("\n").trim().to_string();
    if !batch.is_empty() {
        batches.push(batch);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    AlterTable,
    CreateIndex,
    CreateView,
    Insert,
    Update,
    Delete,
    Other,
}

fn leading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*(?:(?:--[^\n]*\n|/\*.*?\*/)\s*)*(create\s+table|alter\s+table|create\s+(?:unique\s+)?(?:(?:non)?clustered\s+)?index|create\s+view|insert|update|delete)\b",
        )
        .expect("valid regex")
    })
}

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let Some(caps) = leading_regex().captures(sql) else {
            return StatementKind::Other;
        };
        let lead = caps[1].to_ascii_lowercase();
        let words: Vec<&str> = lead.split_whitespace().collect();
        match (words.first().copied(), words.last().copied()) {
            (Some("create"), Some("table")) => StatementKind::CreateTable,
            (Some("alter"), _) => StatementKind::AlterTable,
            (Some("create"), Some("index")) => StatementKind::CreateIndex,
            (Some("create"), Some("view")) => StatementKind::CreateView,
            (Some("insert"), _) => StatementKind::Insert,
            (Some("update"), _) => StatementKind::Update,
            (Some("delete"), _) => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    pub fn is_parsed(self) -> bool {
        self != StatementKind::Other
    }
}

/// `CREATE TABLE` statement split into the text up to and including the opening parenthesis,
/// the top-level comma separated column pieces, and everything from the closing parenthesis on.
///
/// `head + columns.join(",") + tail` reproduces the statement exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub head: String,
    pub columns: Vec<String>,
    pub tail: String,
}

impl CreateTable {
    pub fn parse(sql: &str) -> Option<Self> {
        if StatementKind::classify(sql) != StatementKind::CreateTable {
            return None;
        }
        let open = find_top_level(sql, 0, b'(')?;
        let bytes = sql.as_bytes();
        let mut depth = 0usize;
        let mut columns = Vec::new();
        let mut piece_start = open + 1;
        let mut idx = open;

        while idx < bytes.len() {
            match bytes[idx] {
                b'\'' | b'"' => idx = skip_quoted(bytes, idx, bytes[idx]),
                b'[' => idx = skip_quoted(bytes, idx, b']'),
                b'-' if bytes.get(idx + 1) == Some(&b'-') => idx = skip_line_comment(bytes, idx),
                b'/' if bytes.get(idx + 1) == Some(&b'*') => idx = skip_block_comment(bytes, idx),
                b'(' => {
                    depth += 1;
                    idx += 1;
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        columns.push(sql[piece_start..idx].to_string());
                        return Some(Self {
                            head: sql[..=open].to_string(),
                            columns,
                            tail: sql[idx..].to_string(),
                        });
                    }
                    idx += 1;
                }
                b',' if depth == 1 => {
                    columns.push(sql[piece_start..idx].to_string());
                    piece_start = idx + 1;
                    idx += 1;
                }
                _ => idx += 1,
            }
        }
        None
    }

    pub fn column_clause(&self) -> String {
        self.columns.join(",")
    }

    pub fn render(&self) -> String {
        format!("{}{}{}", self.head, self.column_clause(), self.tail)
    }
}

fn find_top_level(sql: &str, from: usize, target: u8) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut idx = from;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\'' | b'"' => idx = skip_quoted(bytes, idx, bytes[idx]),
            b'[' => idx = skip_quoted(bytes, idx, b']'),
            b'-' if bytes.get(idx + 1) == Some(&b'-') => idx = skip_line_comment(bytes, idx),
            b'/' if bytes.get(idx + 1) == Some(&b'*') => idx = skip_block_comment(bytes, idx),
            b if b == target => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

/// Applies `rewrite` to each run of text between quoted strings and quoted identifiers.
/// The quoted spans themselves are copied through unchanged.
pub fn rewrite_code(sql: &str, rewrite: impl Fn(&str) -> String) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let close = match bytes[idx] {
            b'\'' | b'"' => bytes[idx],
            b'[' => b']',
            _ => {
                idx += 1;
                continue;
            }
        };
        let end = skip_quoted(bytes, idx, close);
        out.push_str(&rewrite(&sql[start..idx]));
        out.push_str(&sql[idx..end]);
        start = end;
        idx = end;
    }
    out.push_str(&rewrite(&sql[start..]));
    out
}

/// Index just past the closing delimiter; doubled delimiters are escapes.
fn skip_quoted(bytes: &[u8], start: usize, close: u8) -> usize {
    let mut idx = start + 1;
    while idx < bytes.len() {
        if bytes[idx] == close {
            if bytes.get(idx + 1) == Some(&close) {
                idx += 2;
                continue;
            }
            return idx + 1;
        }
        idx += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx] != b'\n' {
        idx += 1;
    }
    idx
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut idx = start + 2;
    while idx + 1 < bytes.len() {
        if bytes[idx] == b'*' && bytes[idx + 1] == b'/' {
            return idx + 2;
        }
        idx += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_batches_on_go() {
        let script = "SELECT 1\nGO\nSELECT 2\n  go  \nSELECT 3";
        let batches = split_batches(script);
        assert_eq!(batches, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn empty_batches_are_dropped() {
        assert_eq!(split_batches("GO\n\nGO\nSELECT 1\nGO\n"), vec!["SELECT 1"]);
    }

    #[test]
    fn classifies_statements() {
        assert_eq!(StatementKind::classify("create table T (ID int)"), StatementKind::CreateTable);
        assert_eq!(
            StatementKind::classify("-- header\nCREATE NONCLUSTERED INDEX IX ON T(ID)"),
            StatementKind::CreateIndex
        );
        assert_eq!(StatementKind::classify("ALTER TABLE T ADD C int"), StatementKind::AlterTable);
        assert_eq!(StatementKind::classify("insert into T values (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::classify("exec sp_rename 'a', 'b'"), StatementKind::Other);
        assert_eq!(StatementKind::classify("updated_stats"), StatementKind::Other);
    }

    #[test]
    fn create_table_split_is_lossless() {
        let sql = "CREATE TABLE T (\n  ID int NOT NULL,\n  AMT numeric(10, 2) DEFAULT 0,\n  NOTE varchar(20) DEFAULT 'a,b',\n  PRIMARY KEY CLUSTERED (ID)\n) lock datarows";
        let table = CreateTable::parse(sql).expect("create table");
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.head, "CREATE TABLE T (");
        assert_eq!(table.tail, ") lock datarows");
        assert_eq!(table.columns[1], "\n  AMT numeric(10, 2) DEFAULT 0");
        assert_eq!(table.render(), sql);
    }

    #[test]
    fn unbalanced_create_table_is_not_split() {
        assert!(CreateTable::parse("CREATE TABLE T (ID int").is_none());
        assert!(CreateTable::parse("SELECT (1)").is_none());
    }

    #[test]
    fn rewrite_code_leaves_quoted_spans_alone() {
        let sql = "SELECT x, 'x''s x', [x], \"x\" FROM x";
        let rewritten = rewrite_code(sql, |code| code.replace('x', "y"));
        assert_eq!(rewritten, "SELECT y, 'x''s x', [x], \"x\" FROM y");
    }

    #[test]
    fn rewrite_code_handles_unterminated_literal() {
        let rewritten = rewrite_code("SELECT a, 'a", |code| code.to_uppercase());
        assert_eq!(rewritten, "SELECT A, 'a");
    }
}
