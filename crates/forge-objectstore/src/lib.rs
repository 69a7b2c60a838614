// forge-objectstore/src/lib.rs
// ============================================================================
// Crate: forge-objectstore
// Description: Filesystem-backed implementation of forge_core's ObjectStore.
// Purpose: Give local and small-deployment runs a working blob store without
//          an external bucket provider (§6.3).
// Dependencies: tokio, async-trait, forge-core
// ============================================================================

//! ## Overview
//! Each `(bucket, key)` pair maps to `base_dir/bucket/key`. Keys are not
//! trusted to be filesystem-safe: [`FilesystemObjectStore::resolve`] rejects
//! any key containing `..` or an absolute-path component before it is joined
//! onto `base_dir`, so a caller cannot escape the store root (§5 object
//! storage is an idempotent-overwrite content store, not a general
//! filesystem proxy).

#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "test assertions favor directness over production error discipline"
    )
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::ObjectStoreError;

// ============================================================================
// SECTION: FilesystemObjectStore
// ============================================================================

/// A directory-tree-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    base_dir: PathBuf,
}

impl FilesystemObjectStore {
    /// Opens (creating if needed) a filesystem object store rooted at
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Io`] when `base_dir` cannot be created.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|error| ObjectStoreError::Io(error.to_string()))?;
        Ok(Self { base_dir })
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if bucket.is_empty() || bucket.contains("..") || bucket.contains('/') {
            return Err(ObjectStoreError::Io(format!("invalid bucket name {bucket:?}")));
        }
        if key.is_empty() || key.split('/').any(|segment| segment == ".." || segment.is_empty()) {
            return Err(ObjectStoreError::Io(format!("invalid object key {key:?}")));
        }
        if Path::new(key).is_absolute() {
            return Err(ObjectStoreError::Io(format!("object key must be relative: {key:?}")));
        }
        Ok(self.base_dir.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let path = self.resolve(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| ObjectStoreError::Io(error.to_string()))?;
        }
        let temp_path = path.with_extension("tmp-upload");
        tokio::fs::write(&temp_path, &data)
            .await
            .map_err(|error| ObjectStoreError::Io(error.to_string()))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|error| ObjectStoreError::Io(error.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.resolve(bucket, key)?;
        tokio::fs::read(&path).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                ObjectStoreError::Io(error.to_string())
            }
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.resolve(bucket, key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (FilesystemObjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (store, _dir) = store().await;
        store.put_object("raw", "org/asset.pdf", b"hello".to_vec(), "application/pdf").await.unwrap();
        let data = store.get_object("raw", "org/asset.pdf").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn overwrite_replaces_contents() {
        let (store, _dir) = store().await;
        store.put_object("raw", "key", b"first".to_vec(), "text/plain").await.unwrap();
        store.put_object("raw", "key", b"second".to_vec(), "text/plain").await.unwrap();
        let data = store.get_object("raw", "key").await.unwrap();
        assert_eq!(data, b"second");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (store, _dir) = store().await;
        let result = store.get_object("raw", "missing").await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn exists_reflects_presence() {
        let (store, _dir) = store().await;
        assert!(!store.exists("raw", "key").await.unwrap());
        store.put_object("raw", "key", b"data".to_vec(), "text/plain").await.unwrap();
        assert!(store.exists("raw", "key").await.unwrap());
    }

    #[tokio::test]
    async fn path_traversal_key_is_rejected() {
        let (store, _dir) = store().await;
        let result = store.put_object("raw", "../escape", b"data".to_vec(), "text/plain").await;
        assert!(matches!(result, Err(ObjectStoreError::Io(_))));
    }
}
