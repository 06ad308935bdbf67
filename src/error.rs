//! Error types surfaced by the gateway.

use crate::domain::operation::Action;
use thiserror::Error;

/// Boxed error carried from opaque collaborators (driver connect, custom executors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised once every start-up connection attempt has failed. Fatal: the caller is
/// expected to abort start-up.
#[derive(Debug, Error)]
#[error("database connection failed after {attempts} attempt(s): {source}")]
pub struct ConnectionError {
    pub attempts: u32,
    #[source]
    pub source: BoxError,
}

/// Failure reported by the execution collaborator. The pipeline never retries or
/// rewraps these; callers see exactly what the executor produced.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("action '{0}' is not supported by this executor")]
    Unsupported(Action),

    #[error("unsupported filter on '{0}': only scalar equality is supported")]
    UnsupportedFilter(String),

    #[error("{0} requires a non-empty where")]
    MissingWhere(Action),

    #[error("{0}")]
    Execution(String),
}

impl QueryError {
    /// True when the request itself was rejected before touching the database.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidIdentifier(_)
                | QueryError::Unsupported(_)
                | QueryError::UnsupportedFilter(_)
                | QueryError::MissingWhere(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}
