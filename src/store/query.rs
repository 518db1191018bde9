//! Query predicates for the document store.
//!
//! Semantics follow the hosted document database the application was built
//! against: a document that lacks the field used by an inequality filter or by
//! the ordering clause is excluded from the result.

use super::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field != value` (field must exist)
    Ne { field: String, value: Value },
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Builder for collection queries.
///
/// ## Example:
/// ```rust,ignore
/// let query = Query::new()
///     .where_eq("finalized", true)
///     .where_ne("userId", "u1")
///     .order_by("createdAt", Direction::Desc)
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the filters (and order-by field presence) against one document body.
    pub fn matches(&self, data: &Value) -> bool {
        let filters_pass = self.filters.iter().all(|filter| match filter {
            Filter::Eq { field, value } => data.get(field) == Some(value),
            Filter::Ne { field, value } => match data.get(field) {
                Some(actual) => actual != value,
                None => false,
            },
        });

        let has_order_field = match &self.order_by {
            Some((field, _)) => data.get(field).map_or(false, |v| !v.is_null()),
            None => true,
        };

        filters_pass && has_order_field
    }

    /// Filter, order and truncate a set of documents.
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.data))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = compare_values(&a.data[field.as_str()], &b.data[field.as_str()]);
                let ordering = match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                // Ties resolve by id so results are deterministic
                ordering.then_with(|| a.id.cmp(&b.id))
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

/// Total order over JSON scalars: null < bool < number < string < other.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        Document {
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn test_inequality_excludes_missing_field() {
        let query = Query::new().where_ne("userId", "u1");
        assert!(query.matches(&json!({"userId": "u2"})));
        assert!(!query.matches(&json!({"userId": "u1"})));
        assert!(!query.matches(&json!({"role": "dev"})));
    }

    #[test]
    fn test_order_desc_and_limit() {
        let docs = vec![
            doc("a", json!({"createdAt": "2025-01-01T00:00:00Z"})),
            doc("b", json!({"createdAt": "2025-03-01T00:00:00Z"})),
            doc("c", json!({"createdAt": "2025-02-01T00:00:00Z"})),
            doc("d", json!({"role": "no timestamp"})),
        ];
        let result = Query::new()
            .order_by("createdAt", Direction::Desc)
            .limit(2)
            .apply(docs);
        let ids: Vec<_> = result.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_combined_filters() {
        let docs = vec![
            doc("mine", json!({"userId": "u1", "finalized": true, "createdAt": "3"})),
            doc("draft", json!({"userId": "u2", "finalized": false, "createdAt": "2"})),
            doc("other", json!({"userId": "u2", "finalized": true, "createdAt": "1"})),
        ];
        let result = Query::new()
            .where_eq("finalized", true)
            .where_ne("userId", "u1")
            .order_by("createdAt", Direction::Desc)
            .apply(docs);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "other");
    }

    #[test]
    fn test_numeric_ordering() {
        let docs = vec![
            doc("low", json!({"totalScore": 9})),
            doc("high", json!({"totalScore": 80})),
        ];
        let result = Query::new().order_by("totalScore", Direction::Asc).apply(docs);
        assert_eq!(result[0].id, "low");
    }
}
