//! Error taxonomy for a benchmark run.
//!
//! Only two kinds end a run early: [`CatalogError`] (before anything executes)
//! and [`ExecError::ConnectionLost`] (mid-battery). A plain
//! [`ExecError::Query`] is recorded as a failed result and the battery moves on.

/// The query catalog could not be read, parsed or validated.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported catalog version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown fields in catalog {path}: {fields:?}")]
    UnknownFields { path: String, fields: Vec<String> },

    #[error("invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("catalog has no queries")]
    Empty,

    #[error("duplicate query name '{0}'")]
    DuplicateName(String),

    #[error("invalid table identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Failure talking to the database collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    /// The session is gone. Fatal for the remaining battery.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A single statement failed (syntax, lock conflict, cancellation, ...).
    #[error("{message}")]
    Query {
        message: String,
        sqlstate: Option<String>,
    },

    /// The per-query time budget ran out.
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

impl ExecError {
    pub fn query(message: impl Into<String>) -> Self {
        ExecError::Query {
            message: message.into(),
            sqlstate: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecError::ConnectionLost(_))
    }

    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            ExecError::Query { sqlstate, .. } => sqlstate.as_deref(),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for ExecError {
    fn from(e: tokio_postgres::Error) -> Self {
        let io_failure = std::error::Error::source(&e)
            .map(|s| s.is::<std::io::Error>())
            .unwrap_or(false);
        if e.is_closed() || io_failure {
            return ExecError::ConnectionLost(e.to_string());
        }
        match e.as_db_error() {
            Some(db) => {
                let code = db.code();
                // class 57P: operator intervention terminated the backend
                if code.code().starts_with("57P") {
                    return ExecError::ConnectionLost(db.message().to_string());
                }
                ExecError::Query {
                    message: db.message().to_string(),
                    sqlstate: Some(code.code().to_string()),
                }
            }
            None => ExecError::query(e.to_string()),
        }
    }
}

/// Errors that stop a run before or outside the battery itself.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("cannot connect to database: {0}")]
    Connect(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_loss_is_fatal() {
        assert!(ExecError::ConnectionLost("eof".into()).is_fatal());
        assert!(!ExecError::query("syntax error at or near \"SELEC\"").is_fatal());
        assert!(!ExecError::Timeout(500).is_fatal());
    }

    #[test]
    fn timeout_message_names_budget() {
        assert_eq!(ExecError::Timeout(250).to_string(), "timed out after 250 ms");
    }

    #[test]
    fn sqlstate_exposed_for_query_errors() {
        let e = ExecError::Query {
            message: "relation \"nope\" does not exist".into(),
            sqlstate: Some("42P01".into()),
        };
        assert_eq!(e.sqlstate(), Some("42P01"));
        assert_eq!(e.to_string(), "relation \"nope\" does not exist");
    }
}
