use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::statement::{CreateTable, StatementKind, split_batches};

type RewriteFn = dyn Fn(&str) -> Result<String> + Send + Sync;

/// A named `rewrite(input) -> output` step.
#[derive(Clone)]
pub struct Rewriter {
    name: &'static str,
    rewrite: Arc<RewriteFn>,
}

impl Rewriter {
    pub fn new<F>(name: &'static str, rewrite: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name,
            rewrite: Arc::new(rewrite),
        }
    }

    /// Rewriter that cannot reject its input.
    pub fn infallible<F>(name: &'static str, rewrite: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(name, move |input| Ok(rewrite(input)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, input: &str) -> Result<String> {
        (self.rewrite)(input)
    }
}

impl fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewriter").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Column,
    PostColumn,
    PostParsed,
    Unparsed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Column => "column",
            Stage::PostColumn => "post-column",
            Stage::PostParsed => "post-parsed",
            Stage::Unparsed => "unparsed",
        }
    }
}

/// Four ordered rewriter lists applied column → post-column → post-parsed → unparsed.
///
/// Column rewriters see one column definition of a `CREATE TABLE` at a time, post-column
/// rewriters see the reassembled column clause, post-parsed rewriters see any statement the
/// coarse model recognises and unparsed rewriters see every statement.
#[derive(Debug, Clone, Default)]
pub struct TranslatorChain {
    column: Vec<Rewriter>,
    post_column: Vec<Rewriter>,
    post_parsed: Vec<Rewriter>,
    unparsed: Vec<Rewriter>,
}

impl TranslatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Stage, rewriter: Rewriter) -> Self {
        self.stage_mut(stage).push(rewriter);
        self
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut Vec<Rewriter> {
        match stage {
            Stage::Column => &mut self.column,
            Stage::PostColumn => &mut self.post_column,
            Stage::PostParsed => &mut self.post_parsed,
            Stage::Unparsed => &mut self.unparsed,
        }
    }

    pub fn rewriters(&self, stage: Stage) -> &[Rewriter] {
        match stage {
            Stage::Column => &self.column,
            Stage::PostColumn => &self.post_column,
            Stage::PostParsed => &self.post_parsed,
            Stage::Unparsed => &self.unparsed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
            && self.post_column.is_empty()
            && self.post_parsed.is_empty()
            && self.unparsed.is_empty()
    }

    /// Translates a single statement.
    pub fn translate(&self, sql: &str) -> Result<String> {
        if self.is_empty() {
            return Ok(sql.to_string());
        }

        let kind = StatementKind::classify(sql);
        let mut text = sql.to_string();

        if kind == StatementKind::CreateTable
            && !(self.column.is_empty() && self.post_column.is_empty())
        {
            if let Some(mut table) = CreateTable::parse(&text) {
                for column in table.columns.iter_mut() {
                    *column = run_stage(Stage::Column, &self.column, column)?;
                }
                let clause =
                    run_stage(Stage::PostColumn, &self.post_column, &table.column_clause())?;
                text = format!("{}{}{}", table.head, clause, table.tail);
            }
        }

        if kind.is_parsed() {
            text = run_stage(Stage::PostParsed, &self.post_parsed, &text)?;
        }

        run_stage(Stage::Unparsed, &self.unparsed, &text)
    }

    /// Splits a script on `GO` and translates every batch.
    pub fn translate_script(&self, script: &str) -> Result<Vec<String>> {
        split_batches(script)
            .iter()
            .map(|batch| self.translate(batch))
            .collect()
    }
}

fn run_stage(stage: Stage, rewriters: &[Rewriter], input: &str) -> Result<String> {
    let mut text = input.to_string();
    for rewriter in rewriters {
        text = rewriter.apply(&text).with_context(|| {
            format!(
                "{} rewriter '{}' rejected the statement",
                stage.as_str(),
                rewriter.name()
            )
        })?;
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorKind, classify_error};

    fn tagging(tag: &'static str) -> Rewriter {
        Rewriter::infallible(tag, move |input| format!("{}[{}]", input, tag))
    }

    #[test]
    fn rewriters_compose_in_registration_order() {
        let chain = TranslatorChain::new()
            .with(Stage::Unparsed, tagging("a"))
            .with(Stage::Unparsed, tagging("b"));
        assert_eq!(chain.translate("SELECT 1").unwrap(), "SELECT 1[a][b]");
    }

    #[test]
    fn stages_apply_in_fixed_order() {
        let chain = TranslatorChain::new()
            .with(Stage::Unparsed, tagging("u"))
            .with(Stage::PostParsed, tagging("p"))
            .with(Stage::PostColumn, tagging("pc"))
            .with(Stage::Column, tagging("c"));
        let out = chain.translate("CREATE TABLE T (A int, B int)").unwrap();
        assert_eq!(out, "CREATE TABLE T (A int[c], B int[c][pc])[p][u]");
    }

    #[test]
    fn post_parsed_skips_unrecognised_statements() {
        let chain = TranslatorChain::new()
            .with(Stage::PostParsed, tagging("p"))
            .with(Stage::Unparsed, tagging("u"));
        assert_eq!(chain.translate("EXEC sp_who").unwrap(), "EXEC sp_who[u]");
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = TranslatorChain::default();
        assert_eq!(chain.translate("anything at all ").unwrap(), "anything at all ");
    }

    #[test]
    fn rejection_keeps_error_kind() {
        let chain = TranslatorChain::new().with(
            Stage::Unparsed,
            Rewriter::new("reject", |_| Err(AppError::translation("malformed").into())),
        );
        let err = chain.translate("SELECT 1").unwrap_err();
        assert_eq!(classify_error(&err), ErrorKind::Translation);
        assert!(err.to_string().contains("unparsed rewriter 'reject'"));
    }

    #[test]
    fn translates_each_batch() {
        let chain = TranslatorChain::new().with(Stage::Unparsed, tagging("u"));
        let out = chain.translate_script("SELECT 1\nGO\nSELECT 2").unwrap();
        assert_eq!(out, vec!["SELECT 1[u]", "SELECT 2[u]"]);
    }
}
