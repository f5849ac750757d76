//! Documents, document addresses and field patches.
//!
//! A document is a loosely-typed JSON object. Typed views are obtained with
//! [`Document::decode`], which is where schema validation happens; the store
//! itself never interprets field contents beyond what patches and queries
//! need.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

/// Document body.
pub type Fields = serde_json::Map<String, Value>;

/// Address of a single document: `collection/id`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document read from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decode the body into a typed view.
    ///
    /// The id is not part of the body; callers attach it themselves.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Encode a typed value as a document body. Non-object values are rejected.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "document body must be an object, got {other}"
        ))),
    }
}

/// A single field transformation.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldOp {
    /// Replace the field.
    Set(Value),
    /// Append each value not already present. Non-array fields are replaced.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value. Non-array fields become `[]`.
    ArrayRemove(Vec<Value>),
    /// Stamp the store's clock (Unix ms) at commit time.
    ServerTimestamp,
}

/// An ordered set of field transformations applied to one document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldPatch {
    ops: Vec<(String, FieldOp)>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch that sets every field of `fields`.
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            ops: fields.into_iter().map(|(k, v)| (k, FieldOp::Set(v))).collect(),
        }
    }

    pub fn op(mut self, field: impl Into<String>, op: FieldOp) -> Self {
        self.ops.push((field.into(), op));
        self
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::Set(value.into()))
    }

    pub fn array_union(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::ArrayUnion(vec![value.into()]))
    }

    pub fn array_remove(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::ArrayRemove(vec![value.into()]))
    }

    pub fn server_timestamp(self, field: impl Into<String>) -> Self {
        self.op(field, FieldOp::ServerTimestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    /// Apply the patch in order. `now` is the value used for server timestamps.
    pub fn apply(&self, fields: &mut Fields, now: u64) {
        for (field, op) in &self.ops {
            match op {
                FieldOp::Set(v) => {
                    fields.insert(field.clone(), v.clone());
                }
                FieldOp::ServerTimestamp => {
                    fields.insert(field.clone(), Value::from(now));
                }
                FieldOp::ArrayUnion(values) => {
                    let mut arr = take_array(fields, field);
                    for v in values {
                        if !arr.contains(v) {
                            arr.push(v.clone());
                        }
                    }
                    fields.insert(field.clone(), Value::Array(arr));
                }
                FieldOp::ArrayRemove(values) => {
                    let mut arr = take_array(fields, field);
                    arr.retain(|existing| !values.contains(existing));
                    fields.insert(field.clone(), Value::Array(arr));
                }
            }
        }
    }
}

/// Remove `field`, treating missing or non-array values as `[]`.
fn take_array(fields: &mut Fields, field: &str) -> Vec<Value> {
    match fields.remove(field) {
        Some(Value::Array(arr)) => arr,
        _ => Vec::new(),
    }
}
