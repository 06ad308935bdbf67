//! In-memory executor shared by the integration tests.
//!
//! Behaves like a tiny ORM backend: rows per model, equality filters, physical deletes.
//! It also records every request so tests can assert on what reached the backend.

#![allow(dead_code)]

use async_trait::async_trait;
use softgate::domain::{JsonMap, Record};
use softgate::{Action, OperationRequest, OperationResult, QueryError, QueryExecutor, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryExecutor {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    seen: Mutex<Vec<OperationRequest>>,
    fail_with: Mutex<Option<String>>,
}

impl InMemoryExecutor {
    pub fn seed(&self, model: &str, rows: Vec<Record>) {
        self.tables.lock().unwrap().insert(model.to_string(), rows);
    }

    pub fn rows(&self, model: &str) -> Vec<Record> {
        self.tables.lock().unwrap().get(model).cloned().unwrap_or_default()
    }

    pub fn seen(&self) -> Vec<OperationRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

fn matches(row: &Record, filter: Option<&JsonMap>) -> bool {
    filter.map_or(true, |f| {
        f.iter().all(|(k, v)| row.get(k).cloned().unwrap_or(Value::Null) == Value::from(v.clone()))
    })
}

fn apply(row: &mut Record, data: Option<&JsonMap>) {
    for (k, v) in data.into_iter().flatten() {
        row.insert(k.clone(), Value::from(v.clone()));
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationResult, QueryError> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(message) = self.fail_with.lock().unwrap().take() {
            return Err(QueryError::Execution(message));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(request.model_name.clone()).or_default();
        let filter = request.args.r#where.as_ref();
        let data = request.args.data.as_ref();

        let result = match &request.action {
            Action::FindMany => OperationResult::records(rows.iter().filter(|r| matches(r, filter)).cloned()),
            Action::FindFirst | Action::FindUnique => rows
                .iter()
                .find(|r| matches(r, filter))
                .cloned()
                .map(OperationResult::Record)
                .unwrap_or_else(OperationResult::null),
            Action::Count => OperationResult::Scalar(Value::Int(rows.iter().filter(|r| matches(r, filter)).count() as i64)),
            Action::Create => {
                let mut row = Record::new();
                apply(&mut row, data);
                rows.push(row.clone());
                OperationResult::Record(row)
            }
            Action::Update => match rows.iter_mut().find(|r| matches(r, filter)) {
                Some(row) => {
                    apply(row, data);
                    OperationResult::Record(row.clone())
                }
                None => OperationResult::null(),
            },
            Action::UpdateMany => {
                let mut count = 0;
                for row in rows.iter_mut().filter(|r| matches(r, filter)) {
                    apply(row, data);
                    count += 1;
                }
                OperationResult::Record([("count".to_string(), Value::Int(count))].into_iter().collect())
            }
            Action::Delete => match rows.iter().position(|r| matches(r, filter)) {
                Some(idx) => OperationResult::Record(rows.remove(idx)),
                None => OperationResult::null(),
            },
            Action::DeleteMany => {
                let before = rows.len();
                rows.retain(|r| !matches(r, filter));
                OperationResult::Record([("count".to_string(), Value::Int((before - rows.len()) as i64))].into_iter().collect())
            }
            other => return Err(QueryError::Unsupported(other.clone())),
        };
        Ok(result)
    }
}
