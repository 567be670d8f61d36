//! Declarative queries: collection, composable field predicates, ordering.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    /// Field value is one of the values in the given array.
    In,
    /// Field is an array containing the given value.
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field {
        field: String,
        op: FieldOp,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Eq, value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Ne, value.into())
    }

    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::field(field, FieldOp::In, Value::Array(values))
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::ArrayContains, value.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    fn field(field: &str, op: FieldOp, value: Value) -> Self {
        Self::Field {
            field: field.to_string(),
            op,
            value,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Field { field, op, value } => {
                let actual = doc.field(field);
                match op {
                    FieldOp::Eq => actual == Some(value),
                    // A missing field never matches `!=`, as with hosted document stores.
                    FieldOp::Ne => actual.is_some_and(|a| a != value),
                    FieldOp::In => match (actual, value) {
                        (Some(a), Value::Array(options)) => options.contains(a),
                        _ => false,
                    },
                    FieldOp::ArrayContains => match actual {
                        Some(Value::Array(items)) => items.contains(value),
                        _ => false,
                    },
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order: Option<OrderBy>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filter: None,
            order: None,
        }
    }

    /// Add a predicate. Repeated calls are combined with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            None => filter,
            Some(Filter::And(mut existing)) => {
                existing.push(filter);
                Filter::And(existing)
            }
            Some(existing) => Filter::And(vec![existing, filter]),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(doc))
    }

    /// Filter and order `docs` the way the backend would.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare_values(a.field(&order.field), b.field(&order.field));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        out
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
