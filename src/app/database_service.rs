//! The database service wired for production.
//!
//! Owns the single pool handle opened at start-up and the pipeline every request goes
//! through:
//! 1.  Connects with bounded exponential backoff (fatal when exhausted).
//! 2.  Rewrites operations on soft-delete models.
//! 3.  Executes them through the sqlx-backed executor.
//! 4.  Converts timestamp fields in results to epoch milliseconds.

use crate::app::pipeline::Pipeline;
use crate::domain::operation::OperationRequest;
use crate::domain::policy::FieldPolicy;
use crate::domain::result::OperationResult;
use crate::error::{ConnectionError, QueryError};
use crate::infra::connection::{ConnectionConfig, ConnectionManager};
use crate::storage::sql::SqlExecutor;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct DatabaseService {
    pool: PgPool,
    pipeline: Pipeline,
}

impl DatabaseService {
    /// Connects using the default retry policy (5 attempts, 2s/4s/8s/16s).
    pub async fn connect(config: ConnectionConfig, policy: Arc<FieldPolicy>) -> Result<Self, ConnectionError> {
        Self::connect_with(ConnectionManager::new(config), policy).await
    }

    pub async fn connect_with(
        manager: ConnectionManager,
        policy: Arc<FieldPolicy>,
    ) -> Result<Self, ConnectionError> {
        let log_queries = manager.config().log_verbosity().query;
        let pool = manager.connect().await?;
        Ok(Self::from_pool(pool, policy).with_query_logging(log_queries))
    }

    /// Wraps an already-open pool.
    pub fn from_pool(pool: PgPool, policy: Arc<FieldPolicy>) -> Self {
        let executor = Arc::new(SqlExecutor::new(pool.clone(), policy.clone()));
        Self { pool, pipeline: Pipeline::new(policy, executor) }
    }

    fn with_query_logging(mut self, enabled: bool) -> Self {
        self.pipeline = self.pipeline.with_query_logging(enabled);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn execute(&self, request: OperationRequest) -> Result<OperationResult, QueryError> {
        self.pipeline.execute(request).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
