//! Converts temporal fields in results to epoch milliseconds.

use crate::domain::policy::FieldPolicy;
use crate::domain::result::{OperationResult, Record, Value};
use std::sync::Arc;

/// Nesting below this depth is returned as-is.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct ResultNormalizer {
    policy: Arc<FieldPolicy>,
}

impl ResultNormalizer {
    pub fn new(policy: Arc<FieldPolicy>) -> Self {
        Self { policy }
    }

    /// Walks `result`, replacing date-time values under temporal keys with their
    /// millisecond epoch. Scalars are returned unchanged. Idempotent.
    pub fn normalize(&self, result: OperationResult) -> OperationResult {
        match result {
            OperationResult::Record(record) => OperationResult::Record(self.record(record, 0)),
            OperationResult::Sequence(items) => {
                OperationResult::Sequence(items.into_iter().map(|v| self.value(v, 0)).collect())
            }
            scalar @ OperationResult::Scalar(_) => scalar,
        }
    }

    fn record(&self, record: Record, depth: usize) -> Record {
        record
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::DateTime(at) if self.policy.is_temporal(&key) => {
                        Value::Int(at.timestamp_millis())
                    }
                    other => self.value(other, depth + 1),
                };
                (key, value)
            })
            .collect()
    }

    fn value(&self, value: Value, depth: usize) -> Value {
        if depth >= MAX_DEPTH && value.is_container() {
            tracing::debug!(depth, "result nesting too deep, leaving substructure as-is");
            return value;
        }
        match value {
            Value::Record(record) => Value::Record(self.record(record, depth)),
            Value::Sequence(items) => {
                Value::Sequence(items.into_iter().map(|v| self.value(v, depth + 1)).collect())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn normalizer() -> ResultNormalizer {
        ResultNormalizer::new(Arc::new(FieldPolicy::default()))
    }

    fn record<const N: usize>(fields: [(&str, Value); N]) -> Record {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn new_year() -> Value {
        Value::DateTime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn create_time_becomes_epoch_millis() {
        let input = OperationResult::Record(record([("id", Value::Int(1)), ("createTime", new_year())]));
        let expected =
            OperationResult::Record(record([("id", Value::Int(1)), ("createTime", Value::Int(1_704_067_200_000))]));
        assert_eq!(normalizer().normalize(input), expected);
    }

    #[test]
    fn dates_under_other_keys_are_kept() {
        let input = OperationResult::Record(record([("deadline", new_year())]));
        assert_eq!(normalizer().normalize(input.clone()), input);
    }

    #[test]
    fn non_date_values_under_temporal_keys_are_kept() {
        let input = OperationResult::Record(record([
            ("updateTime", Value::Text("2024-01-01".into())),
            ("lastLogin", Value::Null),
        ]));
        assert_eq!(normalizer().normalize(input.clone()), input);
    }

    #[test]
    fn sequences_normalize_each_element() {
        let input = OperationResult::Sequence(vec![
            Value::Record(record([("publishTime", new_year())])),
            Value::Record(record([("title", Value::Text("draft".into()))])),
            Value::Int(5),
        ]);
        let expected = OperationResult::Sequence(vec![
            Value::Record(record([("publishTime", Value::Int(1_704_067_200_000))])),
            Value::Record(record([("title", Value::Text("draft".into()))])),
            Value::Int(5),
        ]);
        assert_eq!(normalizer().normalize(input), expected);
    }

    #[test]
    fn nested_relations_are_walked() {
        let author = Value::Record(record([("lastLogin", new_year())]));
        let comments = Value::Sequence(vec![Value::Record(record([("createTime", new_year())]))]);
        let input = OperationResult::Record(record([("author", author), ("comments", comments)]));

        let OperationResult::Record(out) = normalizer().normalize(input) else {
            panic!("expected record");
        };
        assert_eq!(out["author"], Value::Record(record([("lastLogin", Value::Int(1_704_067_200_000))])));
        assert_eq!(
            out["comments"],
            Value::Sequence(vec![Value::Record(record([("createTime", Value::Int(1_704_067_200_000))]))])
        );
    }

    #[test]
    fn scalars_pass_through() {
        let count = OperationResult::Scalar(Value::Int(42));
        assert_eq!(normalizer().normalize(count.clone()), count);
        assert_eq!(normalizer().normalize(OperationResult::null()), OperationResult::null());
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let input = OperationResult::Sequence(vec![Value::Record(record([
            ("createTime", new_year()),
            ("meta", Value::Record(record([("updateTime", new_year())]))),
        ]))]);
        let once = normalizer().normalize(input);
        assert_eq!(normalizer().normalize(once.clone()), once);
    }

    #[test]
    fn respects_custom_temporal_fields() {
        let policy = FieldPolicy::new(Vec::<String>::new(), ["closedAt"]);
        let normalizer = ResultNormalizer::new(Arc::new(policy));
        let input = OperationResult::Record(record([("closedAt", new_year()), ("createTime", new_year())]));
        let OperationResult::Record(out) = normalizer.normalize(input) else {
            panic!("expected record");
        };
        assert_eq!(out["closedAt"], Value::Int(1_704_067_200_000));
        assert_eq!(out["createTime"], new_year());
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut value = Value::Record(record([("createTime", new_year())]));
        for _ in 0..(MAX_DEPTH * 2) {
            value = Value::Sequence(vec![value]);
        }
        let input = OperationResult::Sequence(vec![value]);
        // must terminate; the innermost record sits past the bound and is left untouched
        assert_eq!(normalizer().normalize(input.clone()), input);
    }
}
