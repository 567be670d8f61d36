//! # stridopt-store
//!
//! The boundary to the hosted backend: document store, identity provider,
//! blob storage and the local key-value cache, expressed as traits. Ships an
//! in-memory backend implementing all of them plus SQLite and filesystem
//! implementations of the local pieces.

pub mod backend;
pub mod document;
pub mod fs_blobs;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod query;

mod error;

pub use backend::{AuthProvider, AuthUser, BlobStore, DocumentStore, KeyValueStore, SnapshotStream};
pub use document::{fields, to_fields, Document, Fields};
pub use error::{AuthErrorCode, Result, StoreError};
pub use fs_blobs::FsBlobStore;
pub use kv::SqliteKeyValue;
pub use memory::MemoryBackend;
pub use query::{Direction, FieldOp, Filter, OrderBy, Query};
