use crate::errors::{CatalogError, ExecError};
use crate::model::{BindValue, RowCountMode};
use async_trait::async_trait;

pub mod postgres;

pub use postgres::PgExecutor;

/// Outcome of one executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub returned_rows: u64,
}

/// The database collaborator as seen by the runner: one session, one
/// statement at a time.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Execution, ExecError>;

    /// Run the plan-capturing variant of `sql` and return the JSON plan document.
    async fn explain(&self, sql: &str, params: &[BindValue])
        -> Result<serde_json::Value, ExecError>;

    /// Row count of `table`, or `None` when the mode is off or the table is unknown.
    async fn row_count(&self, table: &str, mode: RowCountMode) -> Result<Option<i64>, ExecError>;

    /// Ask the server to cancel whatever statement is running on this session.
    async fn cancel(&self) -> Result<(), ExecError>;

    /// Wait until the session is idle again after a cancel.
    async fn settle(&self) -> Result<(), ExecError>;

    fn is_closed(&self) -> bool;
}

/// Double-quote a table name, optionally schema-qualified (`schema.table`).
///
/// Identifiers cannot be bound as parameters, so anything outside
/// `[A-Za-z_][A-Za-z0-9_$]*` per part is rejected instead of escaped.
pub fn quote_ident(name: &str) -> Result<String, CatalogError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    }

    let mut quoted = Vec::with_capacity(parts.len());
    for p in parts {
        let mut chars = p.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !valid_start || !valid_rest || p.len() > 63 {
            return Err(CatalogError::InvalidIdentifier(name.to_string()));
        }
        quoted.push(format!("\"{}\"", p));
    }
    Ok(quoted.join("."))
}
