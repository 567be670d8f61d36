//! Raw documents as exchanged with the backend.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

pub type Fields = Map<String, Value>;

/// A document: backend-assigned id plus its field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Look up a (possibly dotted) field path.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.data.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Decode into a typed model. The document id is injected as `id`
    /// unless the data already carries one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut data = self.data.clone();
        data.entry("id".to_string())
            .or_insert_with(|| Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(data)).map_err(StoreError::from)
    }
}

/// Serialize a model into a field map suitable for create/set.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(serde::de::Error::custom(format!(
            "expected an object, got {other}"
        )))),
    }
}

/// Build a field map from `json!({...})`. Non-object values yield an empty map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
