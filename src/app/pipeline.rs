//! The query pipeline: rewrite, execute, normalize.

use crate::domain::normalize::ResultNormalizer;
use crate::domain::operation::OperationRequest;
use crate::domain::policy::FieldPolicy;
use crate::domain::result::OperationResult;
use crate::domain::rewrite::OperationRewriter;
use crate::error::QueryError;
use async_trait::async_trait;
use std::sync::Arc;

/// The execution collaborator the pipeline delegates to.
///
/// Implementations receive requests that have already been rewritten and must not
/// retry on their own account.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationResult, QueryError>;

    /// Reachability check used by the health endpoint.
    async fn ping(&self) -> Result<(), QueryError> {
        Ok(())
    }
}

/// Entry point for callers once the connection is established. Cloning is cheap and
/// every clone shares the same policy and executor.
#[derive(Clone)]
pub struct Pipeline {
    policy: Arc<FieldPolicy>,
    rewriter: OperationRewriter,
    normalizer: ResultNormalizer,
    executor: Arc<dyn QueryExecutor>,
    log_queries: bool,
}

impl Pipeline {
    pub fn new(policy: Arc<FieldPolicy>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            rewriter: OperationRewriter::new(policy.clone()),
            normalizer: ResultNormalizer::new(policy.clone()),
            policy,
            executor,
            log_queries: false,
        }
    }

    /// Emit a debug line per call with the rewritten action.
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    /// Executor errors are returned as-is. If this future is dropped mid-flight the
    /// executor call is dropped with it and nothing is normalized.
    pub async fn execute(&self, request: OperationRequest) -> Result<OperationResult, QueryError> {
        let original = self.log_queries.then(|| request.action.clone());
        let request = self.rewriter.rewrite(request);

        if let Some(original) = original {
            tracing::debug!(
                model = %request.model_name,
                action = %original,
                rewritten = %request.action,
                "executing operation"
            );
        }

        let raw = self.executor.execute(&request).await?;
        Ok(self.normalizer.normalize(raw))
    }

    pub async fn ping(&self) -> Result<(), QueryError> {
        self.executor.ping().await
    }
}
