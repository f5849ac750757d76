//! Collection queries: filter + order.
//!
//! Semantics follow what a hosted document store answers:
//!
//! - `In` over an empty value list is not a valid query.
//! - When ordering by a field, documents lacking that field are excluded.
//! - Ties on the order field are broken by document id (ascending) so
//!   results are deterministic.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{Document, Fields};
use crate::error::StoreError;

/// Which documents of a collection match.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All,
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field IN values`
    In { field: String, values: Vec<Value> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Collection + filter + order.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Filter,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Every document of `collection`, unordered (by id).
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: Filter::All,
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Filter::Eq {
            field: field.into(),
            value: value.into(),
        };
        self
    }

    pub fn where_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter = Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Reject queries the store cannot answer.
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Filter::In { field, values } = &self.filter {
            if values.is_empty() {
                return Err(StoreError::InvalidQuery(format!(
                    "'{field} in []' on {} has no values",
                    self.collection
                )));
            }
        }
        Ok(())
    }

    /// Whether a document body satisfies the filter (and has the order field).
    pub fn matches(&self, fields: &Fields) -> bool {
        if let Some(order) = &self.order_by {
            if !fields.contains_key(&order.field) {
                return false;
            }
        }
        match &self.filter {
            Filter::All => true,
            Filter::Eq { field, value } => fields.get(field) == Some(value),
            Filter::In { field, values } => {
                fields.get(field).is_some_and(|v| values.contains(v))
            }
        }
    }

    /// Order a matched result set in place.
    pub fn sort(&self, docs: &mut [Document]) {
        match &self.order_by {
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
            Some(order) => docs.sort_by(|a, b| {
                let by_field = compare_values(a.get(&order.field), b.get(&order.field));
                let by_field = match order.direction {
                    Direction::Ascending => by_field,
                    Direction::Descending => by_field.reverse(),
                };
                by_field.then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// Total order over JSON values: null < bool < number < string < other.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
