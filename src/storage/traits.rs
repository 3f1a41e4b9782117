//! Storage Trait Definitions
//!
//! Defines the abstract blob store the log engine writes through.
//! Implementations can use the filesystem (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Content-addressed blob store interface
///
/// Keys are slash-delimited path strings; values are opaque bytes.
/// `put` must be atomic per key: readers never observe a half-written
/// object. No ordering or cross-key atomicity is assumed; all log-level
/// consistency is rebuilt from the persisted tree state.
///
/// Implementations:
/// - `FsBlobStore` - Production storage on the filesystem
/// - `MemoryBlobStore` - In-memory storage for testing
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob. None when the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically write a blob, replacing any previous value.
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Whether a blob exists under the key.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys with the given prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
