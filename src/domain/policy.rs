//! Field policy: which models are soft-deleted and which fields carry timestamps.
//!
//! Built once at start-up and shared read-only (`Arc<FieldPolicy>`) by the rewriter,
//! the normalizer and the pipeline. Nothing mutates it afterwards, so no locking.

use std::collections::HashSet;

/// Timestamp fields recognized when no explicit list is configured.
pub const DEFAULT_TEMPORAL_FIELDS: [&str; 4] = ["createTime", "updateTime", "lastLogin", "publishTime"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    soft_delete_models: HashSet<String>,
    temporal_fields: HashSet<String>,
}

impl FieldPolicy {
    pub fn new<M, F>(soft_delete_models: M, temporal_fields: F) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            soft_delete_models: soft_delete_models.into_iter().map(Into::into).collect(),
            temporal_fields: temporal_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Enrolls `models` in soft delete and keeps the default temporal fields.
    pub fn with_soft_delete_models<M>(models: M) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self::new(models, DEFAULT_TEMPORAL_FIELDS)
    }

    pub fn is_soft_delete(&self, model_name: &str) -> bool {
        self.soft_delete_models.contains(model_name)
    }

    pub fn is_temporal(&self, field: &str) -> bool {
        self.temporal_fields.contains(field)
    }

    pub fn soft_delete_models(&self) -> impl Iterator<Item = &str> {
        self.soft_delete_models.iter().map(String::as_str)
    }

    pub fn temporal_fields(&self) -> impl Iterator<Item = &str> {
        self.temporal_fields.iter().map(String::as_str)
    }
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), DEFAULT_TEMPORAL_FIELDS)
    }
}
