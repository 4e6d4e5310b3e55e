//! The document-store contract.
//!
//! Records are JSON objects grouped into named collections. Queries are a
//! conjunction of simple conditions evaluated against the stored body, so
//! every backend shares one matcher and only differs in where bytes live.

use std::cmp::Ordering;
use std::future::Future;

use kinship_common::error::KinshipResult;
use serde_json::Value;

pub type Document = serde_json::Map<String, Value>;

/// One predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Top-level field equals the value.
    Eq(String, Value),
    /// Top-level string field equals the value, ignoring ASCII case.
    EqIgnoreCase(String, String),
    /// Top-level string field contains the needle, ignoring case.
    ContainsIgnoreCase(String, String),
    /// Some element of an array field has `field == value`.
    ElemEq {
        array: String,
        field: String,
        value: Value,
    },
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq(field, value) => doc.get(field) == Some(value),
            Self::EqIgnoreCase(field, value) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case(value)),
            Self::ContainsIgnoreCase(field, needle) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Self::ElemEq {
                array,
                field,
                value,
            } => doc
                .get(array)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| item.get(field) == Some(value))),
        }
    }
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn eq_ignore_case(mut self, field: &str, value: &str) -> Self {
        self.conditions
            .push(Condition::EqIgnoreCase(field.to_string(), value.to_string()));
        self
    }

    pub fn contains_ignore_case(mut self, field: &str, needle: &str) -> Self {
        self.conditions.push(Condition::ContainsIgnoreCase(
            field.to_string(),
            needle.to_string(),
        ));
        self
    }

    pub fn elem_eq(mut self, array: &str, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::ElemEq {
            array: array.to_string(),
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(field: &str, order: SortOrder) -> Self {
        Self {
            sort: Some((field.to_string(), order)),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort and truncate matches in place. Documents keep insertion order
    /// when sort keys tie.
    pub fn apply(&self, docs: &mut Vec<Document>) {
        if let Some((field, order)) = &self.sort {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

/// Missing < numbers < strings; other types compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(_)), Some(Value::String(_))) => Ordering::Less,
        (Some(Value::String(_)), Some(Value::Number(_))) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Persistence collaborator used by every store.
///
/// `insert_unique` is the only conditional write: it succeeds at most once
/// per `(collection, key)` while a document holding that key exists.
/// Deleting the document frees the key.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, collection: &str, doc: Document)
    -> impl Future<Output = KinshipResult<()>> + Send;

    /// Insert unless `key` is already held in `collection`. Returns whether
    /// the document was written.
    fn insert_unique(
        &self,
        collection: &str,
        key: &str,
        doc: Document,
    ) -> impl Future<Output = KinshipResult<bool>> + Send;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> impl Future<Output = KinshipResult<Vec<Document>>> + Send;

    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = KinshipResult<Option<Document>>> + Send {
        async move {
            let mut docs = self
                .find(collection, filter, FindOptions::default().limit(1))
                .await?;
            Ok(docs.pop())
        }
    }

    /// Overwrite the listed top-level fields of the first match. Returns
    /// whether a document matched.
    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: Document,
    ) -> impl Future<Output = KinshipResult<bool>> + Send;

    fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = KinshipResult<bool>> + Send;

    fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = KinshipResult<u64>> + Send;

    fn count(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = KinshipResult<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn element_conditions_look_inside_arrays() {
        let group = doc(json!({
            "groupName": "Night Owls",
            "members": [{"playerId": "a"}, {"playerId": "b"}],
        }));
        assert!(Filter::new().elem_eq("members", "playerId", "b").matches(&group));
        assert!(!Filter::new().elem_eq("members", "playerId", "c").matches(&group));
        assert!(Filter::new().eq_ignore_case("groupName", "night owls").matches(&group));
        assert!(Filter::new().contains_ignore_case("groupName", "OWL").matches(&group));
    }

    #[test]
    fn sort_descending_then_limit() {
        let mut docs = vec![
            doc(json!({"timestamp": 1})),
            doc(json!({"timestamp": 3})),
            doc(json!({"timestamp": 2})),
        ];
        FindOptions::sorted("timestamp", SortOrder::Descending)
            .limit(2)
            .apply(&mut docs);
        let ts: Vec<_> = docs.iter().map(|d| d["timestamp"].as_i64().unwrap()).collect();
        assert_eq!(ts, vec![3, 2]);
    }
}
