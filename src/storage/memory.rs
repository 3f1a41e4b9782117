//! In-Memory Blob Store
//!
//! Backs the log engine in tests and dev mode. Data is lost when the
//! service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{BlobStore, StorageResult};

/// Thread-safe in-memory blob store
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store holds no blobs
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Remove a blob. Used by crash-recovery tests to simulate torn state.
    pub async fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.write().await.remove(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let blobs = self.blobs.read().await;
        let mut keys: Vec<String> = blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
