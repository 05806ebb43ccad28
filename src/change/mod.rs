//! Versioned schema-object changes and the source files they are read from.

mod checksum;
mod reader;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AppError;

pub use checksum::{checksum, normalize};
pub use reader::{parse_change_file, parse_metadata, read_changes, substitute_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    Usertype,
    Default,
    Rule,
    Sequence,
    Table,
    Function,
    View,
    Sp,
    Trigger,
    TriggerIncrementalOld,
    Migration,
}

impl ChangeType {
    pub const ALL: [ChangeType; 11] = [
        ChangeType::Usertype,
        ChangeType::Default,
        ChangeType::Rule,
        ChangeType::Sequence,
        ChangeType::Table,
        ChangeType::Function,
        ChangeType::View,
        ChangeType::Sp,
        ChangeType::Trigger,
        ChangeType::TriggerIncrementalOld,
        ChangeType::Migration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Usertype => "USERTYPE",
            ChangeType::Default => "DEFAULT",
            ChangeType::Rule => "RULE",
            ChangeType::Sequence => "SEQUENCE",
            ChangeType::Table => "TABLE",
            ChangeType::Function => "FUNCTION",
            ChangeType::View => "VIEW",
            ChangeType::Sp => "SP",
            ChangeType::Trigger => "TRIGGER",
            ChangeType::TriggerIncrementalOld => "TRIGGER_INCREMENTAL_OLD",
            ChangeType::Migration => "MIGRATION",
        }
    }

    pub fn default_order(self) -> i32 {
        match self {
            ChangeType::Usertype => 10,
            ChangeType::Default => 20,
            ChangeType::Rule => 30,
            ChangeType::Sequence => 40,
            ChangeType::Table => 50,
            ChangeType::Function => 60,
            ChangeType::View => 70,
            ChangeType::Sp => 80,
            ChangeType::Trigger => 90,
            ChangeType::TriggerIncrementalOld => 100,
            ChangeType::Migration => 110,
        }
    }

    /// Rerunnable objects are redeployed whole whenever their content changes; incremental
    /// types hold many named changes that apply exactly once.
    pub fn is_rerunnable(self) -> bool {
        !matches!(
            self,
            ChangeType::Table | ChangeType::TriggerIncrementalOld | ChangeType::Migration
        )
    }

    /// Object kind used in a synthesized `DROP` statement.
    pub fn drop_keyword(self) -> Option<&'static str> {
        match self {
            ChangeType::Usertype => Some("TYPE"),
            ChangeType::Default => Some("DEFAULT"),
            ChangeType::Rule => Some("RULE"),
            ChangeType::Sequence => Some("SEQUENCE"),
            ChangeType::Table => Some("TABLE"),
            ChangeType::Function => Some("FUNCTION"),
            ChangeType::View => Some("VIEW"),
            ChangeType::Sp => Some("PROCEDURE"),
            ChangeType::Trigger | ChangeType::TriggerIncrementalOld => Some("TRIGGER"),
            ChangeType::Migration => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ChangeType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| AppError::config(format!("Unknown change type '{}'", s)))
    }
}

impl Serialize for ChangeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Identity of a change within its schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeKey {
    pub object_name: String,
    pub change_name: String,
}

impl ChangeKey {
    pub fn new(object_name: impl Into<String>, change_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            change_name: change_name.into(),
        }
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.object_name == self.change_name {
            write!(f, "{}", self.object_name)
        } else {
            write!(f, "{}.{}", self.object_name, self.change_name)
        }
    }
}

/// One versioned mutation of a schema object.
///
/// The checksum is computed from the body when the change is constructed and never changes;
/// the `with_*` methods only adjust ordering and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    schema: String,
    change_type: ChangeType,
    key: ChangeKey,
    order: i32,
    seq: usize,
    content: String,
    checksum: String,
    drop: bool,
    metadata: BTreeMap<String, String>,
}

impl Change {
    pub fn new(
        schema: impl Into<String>,
        change_type: ChangeType,
        object_name: impl Into<String>,
        change_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let checksum = checksum(&content);
        Self {
            schema: schema.into(),
            change_type,
            key: ChangeKey::new(object_name, change_name),
            order: change_type.default_order(),
            seq: 0,
            content,
            checksum,
            drop: false,
            metadata: BTreeMap::new(),
        }
    }

    /// A rerunnable object: one change named after the object itself.
    pub fn rerunnable(
        schema: impl Into<String>,
        change_type: ChangeType,
        object_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let object_name = object_name.into();
        Self::new(schema, change_type, object_name.clone(), object_name, content)
    }

    /// Drop for a deployed rerunnable object that no longer exists in source.
    ///
    /// Carries the recorded checksum so the drop itself never looks like drift. `qualifier` is
    /// prepended to the object name as is, e.g. `dbo.` or empty.
    pub fn synthesized_drop(
        schema: impl Into<String>,
        change_type: ChangeType,
        key: ChangeKey,
        qualifier: &str,
        recorded_checksum: impl Into<String>,
    ) -> Self {
        let keyword = change_type.drop_keyword().unwrap_or("OBJECT");
        let content = format!("DROP {} {}{}", keyword, qualifier, key.object_name);
        Self {
            schema: schema.into(),
            change_type,
            key,
            order: change_type.default_order(),
            seq: 0,
            content,
            checksum: recorded_checksum.into(),
            drop: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_seq(mut self, seq: usize) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_drop(mut self, drop: bool) -> Self {
        self.drop = drop;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn key(&self) -> &ChangeKey {
        &self.key
    }

    pub fn object_name(&self) -> &str {
        &self.key.object_name
    }

    pub fn change_name(&self) -> &str {
        &self.key.change_name
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Declaration position, the tie-break after `order`.
    pub fn seq(&self) -> usize {
        self.seq
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn is_drop(&self) -> bool {
        self.drop
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn identity(&self) -> String {
        format!("{}.{}.{}", self.schema, self.change_type, self.key)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_puts_tables_before_views_before_procs() {
        assert!(ChangeType::Table.default_order() < ChangeType::View.default_order());
        assert!(ChangeType::View.default_order() < ChangeType::Sp.default_order());
    }

    #[test]
    fn incremental_types() {
        let incremental: Vec<_> = ChangeType::ALL
            .iter()
            .filter(|kind| !kind.is_rerunnable())
            .collect();
        assert_eq!(
            incremental,
            vec![
                &ChangeType::Table,
                &ChangeType::TriggerIncrementalOld,
                &ChangeType::Migration
            ]
        );
    }

    #[test]
    fn parses_change_type_names() {
        assert_eq!("sp".parse::<ChangeType>().unwrap(), ChangeType::Sp);
        assert_eq!(
            "trigger_incremental_old".parse::<ChangeType>().unwrap(),
            ChangeType::TriggerIncrementalOld
        );
        assert!("package".parse::<ChangeType>().is_err());
    }

    #[test]
    fn checksum_is_fixed_at_construction() {
        let change = Change::rerunnable("APP", ChangeType::View, "V1", "CREATE VIEW V1 AS SELECT 1")
            .with_order(5)
            .with_seq(3);
        assert_eq!(change.checksum(), checksum("CREATE VIEW V1 AS SELECT 1"));
        assert_eq!(change.order(), 5);
        assert_eq!(change.change_name(), "V1");
        assert_eq!(change.identity(), "APP.VIEW.V1");
    }

    #[test]
    fn synthesized_drop_uses_given_qualifier() {
        let change = Change::synthesized_drop(
            "APP",
            ChangeType::Sp,
            ChangeKey::new("SP1", "SP1"),
            "dbo.",
            "abc",
        );
        assert!(change.is_drop());
        assert_eq!(change.content(), "DROP PROCEDURE dbo.SP1");
        assert_eq!(change.checksum(), "abc");
    }

    #[test]
    fn incremental_key_display_includes_change_name() {
        assert_eq!(ChangeKey::new("ORDERS", "add_col").to_string(), "ORDERS.add_col");
        assert_eq!(ChangeKey::new("V1", "V1").to_string(), "V1");
    }
}
