//! Operation requests: one data-access call against one model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

pub type JsonMap = Map<String, JsonValue>;

/// ORM action names. Anything not listed is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Create,
    CreateMany,
    Delete,
    DeleteMany,
    FindUnique,
    FindFirst,
    FindMany,
    Update,
    UpdateMany,
    Upsert,
    Count,
    Aggregate,
    GroupBy,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "create",
            Action::CreateMany => "createMany",
            Action::Delete => "delete",
            Action::DeleteMany => "deleteMany",
            Action::FindUnique => "findUnique",
            Action::FindFirst => "findFirst",
            Action::FindMany => "findMany",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Upsert => "upsert",
            Action::Count => "count",
            Action::Aggregate => "aggregate",
            Action::GroupBy => "groupBy",
            Action::Other(name) => name,
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "create" => Action::Create,
            "createMany" => Action::CreateMany,
            "delete" => Action::Delete,
            "deleteMany" => Action::DeleteMany,
            "findUnique" => Action::FindUnique,
            "findFirst" => Action::FindFirst,
            "findMany" => Action::FindMany,
            "update" => Action::Update,
            "updateMany" => Action::UpdateMany,
            "upsert" => Action::Upsert,
            "count" => Action::Count,
            "aggregate" => Action::Aggregate,
            "groupBy" => Action::GroupBy,
            other => Action::Other(other.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::from(name.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of an operation. `where` and `data` are the only keys the gateway
/// inspects; everything else (`orderBy`, `take`, `select`, ...) rides along in `rest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationArgs {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub r#where: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonMap>,
    #[serde(flatten)]
    pub rest: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub model_name: String,
    pub action: Action,
    #[serde(default)]
    pub args: OperationArgs,
    /// Set once the soft-delete rules have run, so a second pass leaves the request alone.
    #[serde(skip)]
    pub(crate) soft_delete_applied: bool,
}

impl OperationRequest {
    pub fn new(model_name: impl Into<String>, action: impl Into<Action>) -> Self {
        Self {
            model_name: model_name.into(),
            action: action.into(),
            args: OperationArgs::default(),
            soft_delete_applied: false,
        }
    }

    /// Sets `args.where`. Non-object values clear it.
    pub fn with_where(mut self, filter: JsonValue) -> Self {
        self.args.r#where = into_map(filter);
        self
    }

    /// Sets `args.data`. Non-object values clear it.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.args.data = into_map(data);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.args.rest.insert(key.into(), value);
        self
    }

    pub fn is_soft_delete_applied(&self) -> bool {
        self.soft_delete_applied
    }
}

fn into_map(value: JsonValue) -> Option<JsonMap> {
    match value {
        JsonValue::Object(map) => Some(map),
        _ => None,
    }
}
