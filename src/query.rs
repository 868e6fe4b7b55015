//! SQL inspection for generated and hand-written check queries.
//!
//! Generated SQL is untrusted text. Before it reaches the warehouse it is
//! parsed with [`sqlparser`] and every statement is classified; only a single
//! read statement (`SELECT`, optionally with CTEs) is allowed through.
//!
//! # Example
//!
//! ```
//! use analytics_sentinel::query::{SqlDialect, StatementKind, ensure_read_only};
//!
//! let ok = ensure_read_only("SELECT event_date, COUNT(*) FROM events GROUP BY 1", SqlDialect::BigQuery)
//!     .unwrap();
//! assert_eq!(ok.kind, StatementKind::Select);
//!
//! assert!(ensure_read_only("DELETE FROM events WHERE 1 = 1", SqlDialect::BigQuery).is_err());
//! ```

mod types;

use std::ops::ControlFlow;

use compact_str::CompactString;
use indexmap::IndexSet;
use sqlparser::{
    ast::{SetExpr, Statement, visit_relations},
    dialect::{
        BigQueryDialect, ClickHouseDialect, Dialect, GenericDialect, MySqlDialect,
        PostgreSqlDialect, SQLiteDialect
    },
    parser::Parser
};
pub use types::{SqlInspection, StatementKind};

use crate::error::SynthesisError;

/// SQL dialect for parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum SqlDialect {
    #[default]
    BigQuery,
    Generic,
    MySQL,
    PostgreSQL,
    SQLite,
    ClickHouse
}

impl SqlDialect {
    /// Convert to sqlparser dialect for parsing
    pub fn into_parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::BigQuery => Box::new(BigQueryDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
            Self::MySQL => Box::new(MySqlDialect {}),
            Self::PostgreSQL => Box::new(PostgreSqlDialect {}),
            Self::SQLite => Box::new(SQLiteDialect {}),
            Self::ClickHouse => Box::new(ClickHouseDialect {})
        }
    }
}

/// Parse SQL text and describe every statement in it.
pub fn inspect_sql(sql: &str, dialect: SqlDialect) -> Result<Vec<SqlInspection>, SynthesisError> {
    let parser_dialect = dialect.into_parser_dialect();
    let statements = Parser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|e| SynthesisError::Malformed(e.to_string()))?;
    Ok(statements.iter().map(inspect_statement).collect())
}

/// Accept exactly one read-only statement.
///
/// Any write or DDL statement is a [`SynthesisError::PolicyViolation`], even
/// when it is accompanied by a valid `SELECT`.
pub fn ensure_read_only(sql: &str, dialect: SqlDialect) -> Result<SqlInspection, SynthesisError> {
    let mut inspected = inspect_sql(sql, dialect)?;
    if let Some(bad) = inspected.iter().find(|s| !s.kind.is_read_only()) {
        return Err(SynthesisError::PolicyViolation(format!(
            "{} statements are not allowed, only read queries",
            bad.kind
        )));
    }
    match inspected.len() {
        0 => Err(SynthesisError::Malformed("no SQL statement found".to_string())),
        1 => Ok(inspected.remove(0)),
        n => Err(SynthesisError::Malformed(format!(
            "expected a single statement, found {}",
            n
        )))
    }
}

fn inspect_statement(stmt: &Statement) -> SqlInspection {
    let raw = stmt.to_string();
    let kind = statement_kind(stmt, &raw);
    let mut tables: IndexSet<CompactString> = IndexSet::new();
    let _ = visit_relations(stmt, |relation| {
        tables.insert(relation.to_string().into());
        ControlFlow::<()>::Continue(())
    });
    SqlInspection {
        raw,
        kind,
        tables: tables.into_iter().collect()
    }
}

fn statement_kind(stmt: &Statement, raw: &str) -> StatementKind {
    match stmt {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) if select.into.is_some() => StatementKind::SelectInto,
            SetExpr::Select(_)
            | SetExpr::Query(_)
            | SetExpr::SetOperation {
                ..
            }
            | SetExpr::Values(_)
            | SetExpr::Table(_) => StatementKind::Select,
            SetExpr::Insert(_) => StatementKind::Insert,
            SetExpr::Update(_) => StatementKind::Update,
            _ => StatementKind::Other(leading_keyword(raw))
        },
        Statement::Insert(_) => StatementKind::Insert,
        Statement::Update {
            ..
        } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,
        Statement::Truncate {
            ..
        } => StatementKind::Truncate,
        Statement::Drop {
            ..
        } => StatementKind::Drop,
        Statement::CreateTable(_) => StatementKind::Create,
        _ => StatementKind::Other(leading_keyword(raw))
    }
}

fn leading_keyword(raw: &str) -> CompactString {
    raw.split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_ascii_uppercase()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_keyword_upper_cases() {
        assert_eq!(leading_keyword("merge into t using s"), "MERGE");
        assert_eq!(leading_keyword("   "), "UNKNOWN");
    }
}
