//! The backend-as-a-service boundary.
//!
//! The application never talks to the hosted platform directly; every call
//! goes through one of these traits. All of them are object safe so the
//! client can hold `Arc<dyn DocumentStore>` and friends.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use stridopt_shared::UserId;

use crate::document::{Document, Fields};
use crate::error::Result;
use crate::query::Query;

/// Push-based result sets. Each item is the complete, ordered result of the
/// query at that point in time. The stream ends (or yields an error) when
/// the backend drops the subscription; dropping the stream unsubscribes.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Document>>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create a document with a backend-generated id and return that id.
    async fn create(&self, collection: &str, data: Fields) -> Result<String>;

    /// Create or fully replace the document at `id`.
    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<()>;

    /// Merge `patch` into the existing document's top-level fields.
    /// Fails with `NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Open a live subscription.
    async fn listen(&self, query: &Query) -> Result<SnapshotStream>;
}

/// The raw credential-level user, as opposed to the profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;

    async fn sign_out(&self) -> Result<()>;

    fn current(&self) -> Option<AuthUser>;

    /// Identity-changed notifications. The receiver always holds the latest
    /// signed-in user, or `None`.
    fn watch(&self) -> watch::Receiver<Option<AuthUser>>;

    async fn update_display_name(&self, name: &str) -> Result<()>;

    async fn update_email(&self, email: &str) -> Result<()>;

    async fn update_password(&self, password: &str) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path` and return a durable retrieval URL.
    async fn put(&self, path: &str, bytes: Bytes) -> Result<String>;
}

/// Small local string store used to cache the session across restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
