//! Postgres-backed execution of operation requests.
//!
//! Supports the subset of ORM operations the gateway issues: equality filters on
//! top-level fields, `orderBy`/`take`/`skip` for reads, and flat `data` maps for writes.
//! Model names map directly to table names.
//!
//! Single-record actions (`findUnique`, `update`, `delete`) need a non-empty `where`
//! and touch at most one row.

use crate::app::pipeline::QueryExecutor;
use crate::domain::operation::{Action, JsonMap, OperationArgs, OperationRequest};
use crate::domain::policy::FieldPolicy;
use crate::domain::result::{OperationResult, Record, Value};
use crate::error::QueryError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Postgres, QueryBuilder, Row, TypeInfo};
use std::sync::Arc;

/// Executes requests against one shared pool.
#[derive(Clone)]
pub struct SqlExecutor {
    pool: PgPool,
    policy: Arc<FieldPolicy>,
}

impl SqlExecutor {
    /// `policy` decides which fields bind date-time strings as `timestamptz`.
    pub fn new(pool: PgPool, policy: Arc<FieldPolicy>) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_records(&self, mut qb: QueryBuilder<'_, Postgres>) -> Result<Vec<Record>, QueryError> {
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn affected(&self, mut qb: QueryBuilder<'_, Postgres>) -> Result<OperationResult, QueryError> {
        let done = qb.build().execute(&self.pool).await?;
        Ok(count_record(done.rows_affected()))
    }
}

#[async_trait]
impl QueryExecutor for SqlExecutor {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationResult, QueryError> {
        let table = quote_ident(&request.model_name)?;
        let args = &request.args;
        let policy = self.policy.as_ref();

        match &request.action {
            Action::FindMany => {
                let qb = build_find_many(&table, args, policy)?;
                Ok(OperationResult::records(self.fetch_records(qb).await?))
            }
            action @ (Action::FindFirst | Action::FindUnique) => {
                let qb = build_find_one(action, &table, args, policy)?;
                Ok(first_or_null(self.fetch_records(qb).await?))
            }
            Action::Count => {
                let mut qb = build_count(&table, args, policy)?;
                let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
                Ok(OperationResult::Scalar(Value::Int(count)))
            }
            Action::Create => {
                let qb = build_create(&table, args, policy)?;
                Ok(first_or_null(self.fetch_records(qb).await?))
            }
            Action::Update => {
                let qb = build_update(&Action::Update, &table, args, policy)?;
                Ok(first_or_null(self.fetch_records(qb).await?))
            }
            Action::UpdateMany => self.affected(build_update(&Action::UpdateMany, &table, args, policy)?).await,
            Action::Delete => {
                let qb = build_delete(&Action::Delete, &table, args, policy)?;
                Ok(first_or_null(self.fetch_records(qb).await?))
            }
            Action::DeleteMany => self.affected(build_delete(&Action::DeleteMany, &table, args, policy)?).await,
            other => Err(QueryError::Unsupported(other.clone())),
        }
    }

    async fn ping(&self) -> Result<(), QueryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quotes an identifier so camelCase names survive Postgres case folding.
pub fn quote_ident(ident: &str) -> Result<String, QueryError> {
    if !validate_ident(ident) {
        return Err(QueryError::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{}\"", ident))
}

pub fn build_find_many(
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb = select(table, args.r#where.as_ref(), policy)?;
    push_order_and_paging(&mut qb, &args.rest, None)?;
    Ok(qb)
}

/// `findFirst` or `findUnique`; the latter rejects a missing `where`.
pub fn build_find_one(
    action: &Action,
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    if *action == Action::FindUnique {
        require_where(action, args)?;
    }
    let mut qb = select(table, args.r#where.as_ref(), policy)?;
    push_order_and_paging(&mut qb, &args.rest, Some(1))?;
    Ok(qb)
}

pub fn build_count(
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM ");
    qb.push(table);
    push_where(&mut qb, args.r#where.as_ref(), policy)?;
    Ok(qb)
}

pub fn build_create(
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO ");
    qb.push(table);
    match args.data.as_ref().filter(|d| !d.is_empty()) {
        None => {
            qb.push(" DEFAULT VALUES");
        }
        Some(data) => {
            let columns = data.keys().map(|k| quote_ident(k)).collect::<Result<Vec<_>, _>>()?;
            qb.push(" (").push(columns.join(", ")).push(") VALUES (");
            for (idx, (field, value)) in data.iter().enumerate() {
                if idx > 0 {
                    qb.push(", ");
                }
                push_bind(&mut qb, to_bind(field, value, policy));
            }
            qb.push(")");
        }
    }
    qb.push(" RETURNING *");
    Ok(qb)
}

/// `update` changes at most one matching row and returns it; `updateMany` changes every
/// matching row.
pub fn build_update(
    action: &Action,
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let data = args
        .data
        .as_ref()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| QueryError::Execution(format!("{} requires non-empty data", action)))?;

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE ");
    qb.push(table).push(" SET ");
    for (idx, (field, value)) in data.iter().enumerate() {
        if idx > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(field)?).push(" = ");
        push_bind(&mut qb, to_bind(field, value, policy));
    }

    if *action == Action::Update {
        let filter = require_where(action, args)?;
        push_single_row_target(&mut qb, table, filter, policy)?;
        qb.push(" RETURNING *");
    } else {
        push_where(&mut qb, args.r#where.as_ref(), policy)?;
    }
    Ok(qb)
}

/// `delete` removes at most one matching row and returns it; `deleteMany` removes every
/// matching row.
pub fn build_delete(
    action: &Action,
    table: &str,
    args: &OperationArgs,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("DELETE FROM ");
    qb.push(table);
    if *action == Action::Delete {
        let filter = require_where(action, args)?;
        push_single_row_target(&mut qb, table, filter, policy)?;
        qb.push(" RETURNING *");
    } else {
        push_where(&mut qb, args.r#where.as_ref(), policy)?;
    }
    Ok(qb)
}

fn require_where<'a>(action: &Action, args: &'a OperationArgs) -> Result<&'a JsonMap, QueryError> {
    args.r#where
        .as_ref()
        .filter(|w| !w.is_empty())
        .ok_or_else(|| QueryError::MissingWhere(action.clone()))
}

/// ` WHERE ctid = (SELECT ctid FROM <table> WHERE ... LIMIT 1)`
fn push_single_row_target(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    filter: &JsonMap,
    policy: &FieldPolicy,
) -> Result<(), QueryError> {
    qb.push(" WHERE ctid = (SELECT ctid FROM ").push(table);
    push_where(qb, Some(filter), policy)?;
    qb.push(" LIMIT 1)");
    Ok(())
}

fn select(
    table: &str,
    filter: Option<&JsonMap>,
    policy: &FieldPolicy,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM ");
    qb.push(table);
    push_where(&mut qb, filter, policy)?;
    Ok(qb)
}

fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: Option<&JsonMap>,
    policy: &FieldPolicy,
) -> Result<(), QueryError> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return Ok(());
    };

    qb.push(" WHERE ");
    for (idx, (field, value)) in filter.iter().enumerate() {
        if idx > 0 {
            qb.push(" AND ");
        }
        if value.is_object() || value.is_array() {
            return Err(QueryError::UnsupportedFilter(field.clone()));
        }
        qb.push(quote_ident(field)?);
        if value.is_null() {
            qb.push(" IS NULL");
        } else {
            qb.push(" = ");
            push_bind(qb, to_bind(field, value, policy));
        }
    }
    Ok(())
}

/// `orderBy: {field: "asc"|"desc"}` (or a list of those), `take`, `skip`.
fn push_order_and_paging(
    qb: &mut QueryBuilder<'_, Postgres>,
    rest: &JsonMap,
    limit_override: Option<i64>,
) -> Result<(), QueryError> {
    let orderings: Vec<&JsonMap> = match rest.get("orderBy") {
        Some(JsonValue::Object(one)) => vec![one],
        Some(JsonValue::Array(many)) => many.iter().filter_map(JsonValue::as_object).collect(),
        _ => Vec::new(),
    };

    let mut first = true;
    for ordering in orderings {
        for (field, direction) in ordering {
            qb.push(if first { " ORDER BY " } else { ", " });
            first = false;
            let direction = match direction.as_str().map(str::to_lowercase).as_deref() {
                Some("desc") => "DESC",
                _ => "ASC",
            };
            qb.push(quote_ident(field)?).push(" ").push(direction);
        }
    }

    let take = limit_override.or_else(|| rest.get("take").and_then(JsonValue::as_i64));
    if let Some(take) = take {
        qb.push(" LIMIT ").push_bind(take.max(0));
    }
    if let Some(skip) = rest.get("skip").and_then(JsonValue::as_i64) {
        qb.push(" OFFSET ").push_bind(skip.max(0));
    }
    Ok(())
}

/// How one JSON value is sent to Postgres.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

/// RFC 3339 strings become `timestamptz` only for temporal fields; every other string
/// is sent as text, unchanged.
pub fn to_bind(field: &str, value: &JsonValue, policy: &FieldPolicy) -> Bind {
    match value {
        JsonValue::Null => Bind::Null,
        JsonValue::Bool(b) => Bind::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bind::Int(i)
            } else if let Some(f) = n.as_f64() {
                Bind::Float(f)
            } else {
                Bind::Text(n.to_string())
            }
        }
        JsonValue::String(s) if policy.is_temporal(field) => match DateTime::parse_from_rfc3339(s) {
            Ok(at) => Bind::Timestamp(at.with_timezone(&Utc)),
            Err(_) => Bind::Text(s.clone()),
        },
        JsonValue::String(s) => Bind::Text(s.clone()),
        other => Bind::Json(other.clone()),
    }
}

fn push_bind(qb: &mut QueryBuilder<'_, Postgres>, bind: Bind) {
    match bind {
        Bind::Null => {
            qb.push("NULL");
        }
        Bind::Bool(b) => {
            qb.push_bind(b);
        }
        Bind::Int(i) => {
            qb.push_bind(i);
        }
        Bind::Float(f) => {
            qb.push_bind(f);
        }
        Bind::Text(s) => {
            qb.push_bind(s);
        }
        Bind::Timestamp(at) => {
            qb.push_bind(at);
        }
        Bind::Json(v) => {
            qb.push_bind(v);
        }
    }
}

fn first_or_null(records: Vec<Record>) -> OperationResult {
    records
        .into_iter()
        .next()
        .map(OperationResult::Record)
        .unwrap_or_else(OperationResult::null)
}

fn count_record(count: u64) -> OperationResult {
    let mut record = Record::new();
    record.insert("count".to_string(), Value::Int(i64::try_from(count).unwrap_or(i64::MAX)));
    OperationResult::Record(record)
}

fn decode_row(row: &PgRow) -> Result<Record, QueryError> {
    let mut record = Record::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

/// Decodes by Postgres type name so date-time columns keep their type for normalization.
/// Types without a mapping are read as text when the driver allows it, else null.
fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| Value::Int(v.into())),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(idx)?.map(Value::DateTime),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|v| Value::DateTime(v.and_utc())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|v| Value::DateTime(v.and_utc())),
        "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(idx)?.map(Value::from),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
        other => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map(Value::Text),
            Err(err) => {
                tracing::debug!(column = idx, type_name = other, error = %err, "undecodable column, returning null");
                None
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const TABLE: &str = "\"Article\"";

    fn map(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn policy() -> FieldPolicy {
        FieldPolicy::default()
    }

    fn args(filter: Option<JsonValue>, data: Option<JsonValue>) -> OperationArgs {
        OperationArgs { r#where: filter.map(map), data: data.map(map), ..Default::default() }
    }

    #[test]
    fn identifiers_are_validated_and_quoted() {
        assert_eq!(quote_ident("delFlag").unwrap(), "\"delFlag\"");
        assert_eq!(quote_ident("_private1").unwrap(), "\"_private1\"");
        for bad in ["", "1abc", "a-b", "x\"; DROP TABLE t; --", "with space"] {
            assert!(matches!(quote_ident(bad), Err(QueryError::InvalidIdentifier(_))), "{bad}");
        }
    }

    #[test]
    fn where_clause_uses_binds_and_is_null() {
        let filter = json!({ "authorId": 3, "delFlag": false, "slug": null });
        let qb = build_find_many(TABLE, &args(Some(filter), None), &policy()).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"Article\" WHERE \"authorId\" = $1 AND \"delFlag\" = $2 AND \"slug\" IS NULL"
        );
    }

    #[test]
    fn nested_filters_are_rejected() {
        let filter = json!({ "id": { "in": [1, 2] } });
        let err = build_find_many(TABLE, &args(Some(filter), None), &policy()).err().unwrap();
        assert!(matches!(err, QueryError::UnsupportedFilter(ref f) if f == "id"));
    }

    #[test]
    fn ordering_and_paging_are_appended() {
        let mut request = args(None, None);
        request.rest = map(json!({ "orderBy": [{ "createTime": "desc" }, { "id": "asc" }], "take": 10, "skip": 20 }));
        let qb = build_find_many(TABLE, &request, &policy()).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"Article\" ORDER BY \"createTime\" DESC, \"id\" ASC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn single_row_lookups_force_limit_one() {
        let mut request = args(Some(json!({ "id": 1 })), None);
        request.rest = map(json!({ "take": 50 }));
        let qb = build_find_one(&Action::FindUnique, TABLE, &request, &policy()).unwrap();
        assert_eq!(qb.sql(), "SELECT * FROM \"Article\" WHERE \"id\" = $1 LIMIT $2");

        let qb = build_find_one(&Action::FindFirst, TABLE, &args(None, None), &policy()).unwrap();
        assert_eq!(qb.sql(), "SELECT * FROM \"Article\" LIMIT $1");
    }

    #[test]
    fn single_record_actions_require_where() {
        for filter in [None, Some(json!({}))] {
            let err = build_find_one(&Action::FindUnique, TABLE, &args(filter.clone(), None), &policy())
                .err()
                .unwrap();
            assert!(matches!(err, QueryError::MissingWhere(Action::FindUnique)));

            let request = args(filter.clone(), Some(json!({ "delFlag": true })));
            let err = build_update(&Action::Update, TABLE, &request, &policy()).err().unwrap();
            assert!(matches!(err, QueryError::MissingWhere(Action::Update)));
            assert!(err.is_request_error());

            let err = build_delete(&Action::Delete, TABLE, &args(filter, None), &policy()).err().unwrap();
            assert!(matches!(err, QueryError::MissingWhere(Action::Delete)));
        }
    }

    #[test]
    fn update_targets_a_single_row() {
        let request = args(Some(json!({ "authorId": 2 })), Some(json!({ "title": "new" })));
        let qb = build_update(&Action::Update, TABLE, &request, &policy()).unwrap();
        assert_eq!(
            qb.sql(),
            "UPDATE \"Article\" SET \"title\" = $1 \
             WHERE ctid = (SELECT ctid FROM \"Article\" WHERE \"authorId\" = $2 LIMIT 1) RETURNING *"
        );
    }

    #[test]
    fn update_many_targets_every_match() {
        let request = args(Some(json!({ "delFlag": false })), Some(json!({ "delFlag": true })));
        let qb = build_update(&Action::UpdateMany, TABLE, &request, &policy()).unwrap();
        assert_eq!(qb.sql(), "UPDATE \"Article\" SET \"delFlag\" = $1 WHERE \"delFlag\" = $2");

        let request = args(None, Some(json!({ "delFlag": true })));
        let qb = build_update(&Action::UpdateMany, TABLE, &request, &policy()).unwrap();
        assert_eq!(qb.sql(), "UPDATE \"Article\" SET \"delFlag\" = $1");
    }

    #[test]
    fn update_without_data_is_rejected() {
        let request = args(Some(json!({ "id": 1 })), None);
        let err = build_update(&Action::UpdateMany, TABLE, &request, &policy()).err().unwrap();
        assert!(matches!(err, QueryError::Execution(ref m) if m == "updateMany requires non-empty data"));
    }

    #[test]
    fn delete_targets_a_single_row() {
        let qb = build_delete(&Action::Delete, TABLE, &args(Some(json!({ "id": 7 })), None), &policy()).unwrap();
        assert_eq!(
            qb.sql(),
            "DELETE FROM \"Article\" WHERE ctid = (SELECT ctid FROM \"Article\" WHERE \"id\" = $1 LIMIT 1) RETURNING *"
        );
    }

    #[test]
    fn delete_many_targets_every_match() {
        let request = args(Some(json!({ "authorId": 2 })), None);
        let qb = build_delete(&Action::DeleteMany, TABLE, &request, &policy()).unwrap();
        assert_eq!(qb.sql(), "DELETE FROM \"Article\" WHERE \"authorId\" = $1");
    }

    #[test]
    fn create_inserts_data_columns() {
        let request = args(None, Some(json!({ "title": "hello", "delFlag": false })));
        let qb = build_create(TABLE, &request, &policy()).unwrap();
        assert_eq!(qb.sql(), "INSERT INTO \"Article\" (\"delFlag\", \"title\") VALUES ($1, $2) RETURNING *");

        let qb = build_create(TABLE, &args(None, Some(json!({}))), &policy()).unwrap();
        assert_eq!(qb.sql(), "INSERT INTO \"Article\" DEFAULT VALUES RETURNING *");
    }

    #[test]
    fn create_rejects_bad_column_names() {
        let request = args(None, Some(json!({ "title; --": "x" })));
        let err = build_create(TABLE, &request, &policy()).err().unwrap();
        assert!(matches!(err, QueryError::InvalidIdentifier(_)));
    }

    #[test]
    fn count_applies_filter() {
        let qb = build_count(TABLE, &args(Some(json!({ "delFlag": false })), None), &policy()).unwrap();
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM \"Article\" WHERE \"delFlag\" = $1");
    }

    #[test]
    fn date_strings_bind_as_timestamps_only_for_temporal_fields() {
        let stamp = json!("2024-01-01T00:00:00Z");
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(to_bind("createTime", &stamp, &policy()), Bind::Timestamp(expected));
        assert_eq!(to_bind("slug", &stamp, &policy()), Bind::Text("2024-01-01T00:00:00Z".into()));
        assert_eq!(to_bind("createTime", &json!("yesterday"), &policy()), Bind::Text("yesterday".into()));
    }

    #[test]
    fn scalar_binds_follow_json_type() {
        assert_eq!(to_bind("id", &json!(3), &policy()), Bind::Int(3));
        assert_eq!(to_bind("score", &json!(1.5), &policy()), Bind::Float(1.5));
        assert_eq!(to_bind("delFlag", &json!(true), &policy()), Bind::Bool(true));
        assert_eq!(to_bind("slug", &JsonValue::Null, &policy()), Bind::Null);
        assert_eq!(to_bind("tags", &json!(["a"]), &policy()), Bind::Json(json!(["a"])));
    }

    #[test]
    fn count_results_are_records() {
        let OperationResult::Record(record) = count_record(4) else {
            panic!("expected record");
        };
        assert_eq!(record["count"], Value::Int(4));
        assert_eq!(first_or_null(Vec::new()), OperationResult::null());
    }
}
