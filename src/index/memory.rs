//! In-Memory Metadata Index
//!
//! Used by tests and dev mode. Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{EntryMetadata, IndexError, IndexResult, MetadataIndex};

/// Thread-safe in-memory metadata index
#[derive(Clone, Default)]
pub struct MemoryMetadataIndex {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, EntryMetadata>,
    tree_size: u64,
}

impl MemoryMetadataIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataIndex for MemoryMetadataIndex {
    async fn record(&self, meta: &EntryMetadata) -> IndexResult<()> {
        let mut inner = self.inner.write().await;
        if inner.entries.contains_key(&meta.entry_index) {
            return Err(IndexError::Duplicate(meta.entry_index));
        }
        inner.entries.insert(meta.entry_index, meta.clone());
        inner.tree_size = inner.tree_size.max(meta.tree_size_at_registration);
        Ok(())
    }

    async fn get(&self, entry_index: u64) -> IndexResult<Option<EntryMetadata>> {
        Ok(self.inner.read().await.entries.get(&entry_index).cloned())
    }

    async fn tree_size(&self) -> IndexResult<u64> {
        Ok(self.inner.read().await.tree_size)
    }

    async fn count(&self) -> IndexResult<u64> {
        Ok(self.inner.read().await.entries.len() as u64)
    }
}
