use std::fmt;

use serde::Serialize;

/// Database-visible identity of a logical schema.
///
/// `sub_schema` is set when the resolved string has the `name.sub` form, e.g. a SQL Server
/// database plus owner (`appdb.dbo`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalSchema {
    pub physical_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_schema: Option<String>,
}

impl PhysicalSchema {
    pub fn new(physical_name: impl Into<String>) -> Self {
        Self {
            physical_name: physical_name.into(),
            sub_schema: None,
        }
    }

    pub fn with_sub_schema(
        physical_name: impl Into<String>,
        sub_schema: impl Into<String>,
    ) -> Self {
        Self {
            physical_name: physical_name.into(),
            sub_schema: Some(sub_schema.into()),
        }
    }

    /// Splits on the first `.`; an empty qualifier is treated as absent.
    pub fn parse(input: &str) -> Self {
        match input.split_once('.') {
            Some((name, sub)) if !sub.is_empty() => Self::with_sub_schema(name, sub),
            Some((name, _)) => Self::new(name),
            None => Self::new(input),
        }
    }

    /// Name usable as an object qualifier, e.g. `appdb.dbo.` or `t_APP.`.
    pub fn qualifier(&self) -> String {
        match &self.sub_schema {
            Some(sub) => format!("{}.{}.", self.physical_name, sub),
            None => format!("{}.", self.physical_name),
        }
    }
}

impl fmt::Display for PhysicalSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_schema {
            Some(sub) => write!(f, "{}.{}", self.physical_name, sub),
            None => write!(f, "{}", self.physical_name),
        }
    }
}
