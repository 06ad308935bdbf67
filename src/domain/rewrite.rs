//! Soft-delete rewriting of operation requests.
//!
//! For models enrolled in the [`FieldPolicy`], physical deletes become flag updates and
//! reads/aggregates/bulk updates only see rows whose `delFlag` is false. Rules are keyed
//! by the action the caller sent; actions without a rule pass through untouched.

use crate::domain::operation::{Action, JsonMap, OperationRequest};
use crate::domain::policy::FieldPolicy;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Column holding the soft-delete marker.
pub const DEL_FLAG: &str = "delFlag";

/// Key whose presence in `where` suppresses the injected `delFlag = false` for the
/// guarded actions. Note this is not [`DEL_FLAG`].
pub const DELETED_GUARD: &str = "deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// `data = { delFlag: true }`, discarding any caller data.
    ReplaceData,
    /// `data.delFlag = true`, keeping other data keys.
    MergeData,
    /// `where.delFlag = false`, unconditionally.
    PinWhere,
    /// `where.delFlag = false` unless `where.deleted` is present.
    GuardWhere,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Replacement action, or `None` to keep the caller's action.
    pub rewrite_to: Option<Action>,
    pub mutation: Mutation,
}

/// The rule table.
///
/// | original                               | new action   | mutation      |
/// |----------------------------------------|--------------|---------------|
/// | delete                                 | update       | ReplaceData   |
/// | deleteMany                             | updateMany   | MergeData     |
/// | findUnique                             | findFirst    | PinWhere      |
/// | update                                 | updateMany   | PinWhere      |
/// | count, aggregate, updateMany, findMany | (unchanged)  | GuardWhere    |
pub fn rule_for(action: &Action) -> Option<RewriteRule> {
    let (rewrite_to, mutation) = match action {
        Action::Delete => (Some(Action::Update), Mutation::ReplaceData),
        Action::DeleteMany => (Some(Action::UpdateMany), Mutation::MergeData),
        Action::FindUnique => (Some(Action::FindFirst), Mutation::PinWhere),
        Action::Update => (Some(Action::UpdateMany), Mutation::PinWhere),
        Action::Count | Action::Aggregate | Action::UpdateMany | Action::FindMany => {
            (None, Mutation::GuardWhere)
        }
        _ => return None,
    };
    Some(RewriteRule { rewrite_to, mutation })
}

/// Applies soft-delete rules for one policy. Pure: no I/O, no shared state.
#[derive(Debug, Clone)]
pub struct OperationRewriter {
    policy: Arc<FieldPolicy>,
}

impl OperationRewriter {
    pub fn new(policy: Arc<FieldPolicy>) -> Self {
        Self { policy }
    }

    pub fn rewrite(&self, request: OperationRequest) -> OperationRequest {
        rewrite(request, &self.policy)
    }
}

/// Rewrites `request` if its model is enrolled; otherwise returns it unchanged.
/// Running it again on its own output is a no-op.
pub fn rewrite(mut request: OperationRequest, policy: &FieldPolicy) -> OperationRequest {
    if request.soft_delete_applied || !policy.is_soft_delete(&request.model_name) {
        return request;
    }
    request.soft_delete_applied = true;

    let Some(rule) = rule_for(&request.action) else {
        return request;
    };

    let args = &mut request.args;
    match rule.mutation {
        Mutation::ReplaceData => {
            args.data = Some(flag_map(true));
        }
        Mutation::MergeData => {
            args.data
                .get_or_insert_with(JsonMap::new)
                .insert(DEL_FLAG.to_string(), JsonValue::Bool(true));
        }
        Mutation::PinWhere => {
            args.r#where
                .get_or_insert_with(JsonMap::new)
                .insert(DEL_FLAG.to_string(), JsonValue::Bool(false));
        }
        Mutation::GuardWhere => match args.r#where.as_mut() {
            None => args.r#where = Some(flag_map(false)),
            Some(filter) if !filter.contains_key(DELETED_GUARD) => {
                filter.insert(DEL_FLAG.to_string(), JsonValue::Bool(false));
            }
            Some(_) => {}
        },
    }

    if let Some(action) = rule.rewrite_to {
        request.action = action;
    }
    request
}

fn flag_map(value: bool) -> JsonMap {
    let mut map = JsonMap::new();
    map.insert(DEL_FLAG.to_string(), JsonValue::Bool(value));
    map
}
