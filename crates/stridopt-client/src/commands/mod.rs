//! Write operations.
//!
//! Each command takes the backend and the acting identity explicitly and
//! mutates documents directly; live feeds observe the result. Nothing is
//! cached optimistically.

pub mod chat;
pub mod events;
pub mod friends;
pub mod notifications;
pub mod tasks;

use chrono::Utc;
use serde_json::{json, Value};

use stridopt_shared::Identity;
use stridopt_store::Document;

use crate::error::{ClientError, Result};

/// Current time as stored in RFC 3339 timestamp fields.
pub(crate) fn now_value() -> Value {
    json!(Utc::now())
}

/// Decode a fetched document or report it missing.
pub(crate) fn require_doc<T: serde::de::DeserializeOwned>(
    doc: Option<Document>,
    kind: &'static str,
    id: &str,
) -> Result<T> {
    let doc = doc.ok_or_else(|| ClientError::not_found(kind, id))?;
    Ok(doc.decode()?)
}

/// Decode a `users/{uid}` document. Profiles written without a `uid` field
/// take it from the document id.
pub(crate) fn decode_identity(doc: &Document) -> Result<Identity> {
    let mut data = doc.data.clone();
    data.entry("uid".to_string())
        .or_insert_with(|| Value::String(doc.id.clone()));
    Ok(Document::new(doc.id.clone(), data).decode()?)
}
