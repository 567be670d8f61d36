//! Backend bundle and top-level application state.

use std::sync::Arc;

use anyhow::Context;
use stridopt_store::{
    AuthProvider, BlobStore, DocumentStore, FsBlobStore, KeyValueStore, MemoryBackend, SqliteKeyValue,
};
use stridopt_shared::constants::APP_NAME;
use stridopt_sync::RetryPolicy;

use crate::config::ClientConfig;
use crate::session::Session;

/// Handles to every external collaborator.
#[derive(Clone)]
pub struct Backend {
    pub docs: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub blobs: Arc<dyn BlobStore>,
    pub kv: Arc<dyn KeyValueStore>,
}

impl Backend {
    /// Every role served by one in-process backend.
    pub fn in_memory(backend: &MemoryBackend) -> Self {
        Self {
            docs: Arc::new(backend.clone()),
            auth: Arc::new(backend.clone()),
            blobs: Arc::new(backend.clone()),
            kv: Arc::new(backend.clone()),
        }
    }
}

/// Central application state: configuration, backend and the session.
pub struct AppState {
    pub config: ClientConfig,
    pub backend: Backend,
    pub session: Session,
}

impl AppState {
    pub async fn new(config: ClientConfig, backend: Backend) -> crate::Result<Self> {
        let session = Session::start(backend.clone(), config.theme).await?;
        Ok(Self {
            config,
            backend,
            session,
        })
    }

    /// Bootstrap from the environment: in-process documents and auth, the
    /// SQLite session cache and filesystem blobs.
    pub async fn open_default() -> anyhow::Result<Self> {
        crate::logging::init();
        let config = ClientConfig::from_env();
        let memory = MemoryBackend::new();

        let kv = SqliteKeyValue::open_default(config.data_dir.as_deref())
            .context("failed to open session cache")?;
        let blobs = FsBlobStore::new(config.blob_dir.clone())
            .await
            .context("failed to initialise blob store")?;

        let backend = Backend {
            docs: Arc::new(memory.clone()),
            auth: Arc::new(memory),
            blobs: Arc::new(blobs),
            kv: Arc::new(kv),
        };

        tracing::info!(app = APP_NAME, theme = ?config.theme, "starting client");
        Ok(Self::new(config, backend).await?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_starts_signed_out() {
        let memory = MemoryBackend::new();
        let state = AppState::new(ClientConfig::default(), Backend::in_memory(&memory))
            .await
            .unwrap();
        assert!(state.session.current().is_none());
        assert_eq!(state.retry_policy(), RetryPolicy::default());
    }
}
