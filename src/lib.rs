pub mod app;
pub mod domain;
pub mod error;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{DatabaseService, Pipeline, QueryExecutor};
pub use domain::{Action, FieldPolicy, OperationRequest, OperationResult, OperationRewriter, ResultNormalizer, Value};
pub use error::{ConnectionError, QueryError};
pub use infra::{ConnectionConfig, ConnectionManager, LogVerbosity, RetryPolicy};
pub use storage::SqlExecutor;
