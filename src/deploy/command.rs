use std::cmp::Reverse;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::change::{Change, ChangeKey, ChangeType};

/// What a successful command does to the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Record,
    Remove,
}

/// One change bound to an execution intent.
///
/// Identity (equality, hashing, logging) is the wrapped change's identity. The drop flag only
/// affects ordering; the command's statements run either way.
#[derive(Debug, Clone)]
pub struct ExecuteChangeCommand {
    change: Arc<Change>,
    drop: bool,
    action: LedgerAction,
    statements: Vec<String>,
}

impl ExecuteChangeCommand {
    pub fn new(change: Arc<Change>) -> Self {
        let drop = change.is_drop();
        Self {
            change,
            drop,
            action: LedgerAction::Record,
            statements: Vec::new(),
        }
    }

    /// Drop of a deployed object that left the source; success removes its record.
    pub fn removal(change: Arc<Change>) -> Self {
        Self {
            change,
            drop: true,
            action: LedgerAction::Remove,
            statements: Vec::new(),
        }
    }

    pub fn with_drop(self, drop: bool) -> Self {
        Self { drop, ..self }
    }

    pub fn with_statements(self, statements: Vec<String>) -> Self {
        Self { statements, ..self }
    }

    pub fn is_drop(&self) -> bool {
        self.drop
    }

    pub fn action(&self) -> LedgerAction {
        self.action
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn schema(&self) -> &str {
        self.change.schema()
    }

    pub fn change_type(&self) -> ChangeType {
        self.change.change_type()
    }

    pub fn key(&self) -> &ChangeKey {
        self.change.key()
    }

    pub fn checksum(&self) -> &str {
        self.change.checksum()
    }

    /// Statements prepared for the target. Empty until the dialect has translated the change.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn identity(&self) -> String {
        self.change.identity()
    }

    fn sort_key(&self) -> (i32, usize) {
        (self.change.order(), self.change.seq())
    }
}

impl PartialEq for ExecuteChangeCommand {
    fn eq(&self, other: &Self) -> bool {
        self.schema() == other.schema()
            && self.change_type() == other.change_type()
            && self.key() == other.key()
    }
}

impl Eq for ExecuteChangeCommand {}

impl Hash for ExecuteChangeCommand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema().hash(state);
        self.change_type().hash(state);
        self.key().hash(state);
    }
}

/// Drops first in reverse `(order, seq)`, then everything else in ascending `(order, seq)`.
pub fn order_commands(commands: Vec<ExecuteChangeCommand>) -> Vec<ExecuteChangeCommand> {
    let (mut drops, mut others): (Vec<_>, Vec<_>) =
        commands.into_iter().partition(|command| command.is_drop());
    drops.sort_by_key(|command| Reverse(command.sort_key()));
    others.sort_by_key(ExecuteChangeCommand::sort_key);
    drops.extend(others);
    drops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(object: &str, order: i32, drop: bool) -> ExecuteChangeCommand {
        let change = Change::rerunnable("APP", ChangeType::View, object, format!("-- {}", object))
            .with_order(order);
        ExecuteChangeCommand::new(Arc::new(change)).with_drop(drop)
    }

    fn names(commands: &[ExecuteChangeCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|command| command.key().object_name.clone())
            .collect()
    }

    #[test]
    fn drops_run_first_in_reverse_order() {
        let ordered = order_commands(vec![
            command("C2", 7, false),
            command("D", 5, true),
            command("C1", 3, false),
        ]);
        assert_eq!(names(&ordered), vec!["D", "C1", "C2"]);
    }

    #[test]
    fn drops_are_fully_reversed() {
        let ordered = order_commands(vec![
            command("D1", 1, true),
            command("D3", 3, true),
            command("D2", 2, true),
        ]);
        assert_eq!(names(&ordered), vec!["D3", "D2", "D1"]);
    }

    #[test]
    fn ties_break_on_declaration_order() {
        let first = Change::rerunnable("APP", ChangeType::View, "B", "x").with_seq(0);
        let second = Change::rerunnable("APP", ChangeType::View, "A", "y").with_seq(1);
        let ordered = order_commands(vec![
            ExecuteChangeCommand::new(Arc::new(second)),
            ExecuteChangeCommand::new(Arc::new(first)),
        ]);
        assert_eq!(names(&ordered), vec!["B", "A"]);
    }

    #[test]
    fn identity_ignores_drop_flag_and_statements() {
        let plain = command("V1", 70, false);
        let dropped = plain.clone().with_drop(true).with_statements(vec!["DROP VIEW V1".into()]);
        assert_eq!(plain, dropped);
        assert!(dropped.is_drop());
        assert!(!plain.is_drop());
    }

    #[test]
    fn drop_flag_defaults_from_change() {
        let change =
            Change::new("APP", ChangeType::Table, "T", "retire", "DROP TABLE T").with_drop(true);
        let command = ExecuteChangeCommand::new(Arc::new(change));
        assert!(command.is_drop());
        assert_eq!(command.action(), LedgerAction::Record);
    }
}
