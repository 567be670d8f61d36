//! Filesystem [`BlobStore`] used when no hosted object storage is wired in.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};

use crate::backend::BlobStore;
use crate::error::{Result, StoreError};

/// Join `relative` onto `base`, rejecting anything that would escape it.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf> {
    if relative.is_empty() {
        return Err(StoreError::InvalidPath(relative.to_string()));
    }
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => return Err(StoreError::InvalidPath(relative.to_string())),
        }
    }
    if !resolved.starts_with(base) || resolved == base {
        return Err(StoreError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::Blob(format!(
                "failed to create blob directory '{}': {e}",
                base_path.display()
            ))
        })?;
        let base_path = base_path.canonicalize().unwrap_or(base_path);
        info!(path = %base_path.display(), "blob store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<String> {
        let target = ensure_within(&self.base_path, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes)
            .await
            .map_err(|e| StoreError::Blob(format!("failed to write {path}: {e}")))?;

        debug!(path, size = bytes.len(), "stored blob");
        Ok(format!("file://{}", target.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal() {
        let base = Path::new("/data/blobs");
        assert!(ensure_within(base, "../secret").is_err());
        assert!(ensure_within(base, "a/../../b").is_err());
        assert!(ensure_within(base, "/etc/passwd").is_err());
        assert!(ensure_within(base, "").is_err());
        assert_eq!(
            ensure_within(base, "chat_images/c1/42").unwrap(),
            PathBuf::from("/data/blobs/chat_images/c1/42")
        );
    }

    #[tokio::test]
    async fn put_writes_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs")).await.unwrap();
        let url = store
            .put("profile_images/u1/1700", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        let written = std::fs::read(store.base_path().join("profile_images/u1/1700")).unwrap();
        assert_eq!(written, b"png");
    }
}
