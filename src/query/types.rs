use std::fmt;

use compact_str::CompactString;
use serde::Serialize;

/// Parsed SQL statement with the metadata the pipeline cares about
#[derive(Debug, Clone, Serialize)]
pub struct SqlInspection {
    /// Statement re-rendered by the parser
    pub raw:    String,
    pub kind:   StatementKind,
    /// Relations referenced anywhere in the statement, in first-seen order
    pub tables: Vec<CompactString>
}

/// Type of SQL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum StatementKind {
    Select,
    SelectInto,
    Insert,
    Update,
    Delete,
    Truncate,
    Drop,
    Create,
    Other(CompactString)
}

impl StatementKind {
    /// Only plain queries may run against the warehouse.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::SelectInto => write!(f, "SELECT INTO"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Drop => write!(f, "DROP"),
            Self::Create => write!(f, "CREATE"),
            Self::Other(keyword) => write!(f, "{}", keyword)
        }
    }
}
