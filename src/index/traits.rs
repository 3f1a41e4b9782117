//! Metadata Index Trait Definitions
//!
//! Abstract interface over the per-entry metadata table and the tree-size
//! singleton. Implementations can use SQLite (production) or in-memory
//! (testing).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("duplicate entry index: {0}")]
    Duplicate(u64),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Metadata recorded for every registered statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Entry index in the log
    pub entry_index: u64,
    /// SHA-256 of the statement bytes, lowercase hex
    pub statement_hash: String,
    /// Issuer claim
    pub iss: String,
    /// Subject claim
    pub sub: String,
    /// Content type header, when present
    pub cty: Option<String>,
    /// Hash-envelope payload hash algorithm (258), when present
    pub payload_hash_alg: Option<i64>,
    /// Hash-envelope payload hash, lowercase hex, when present
    pub payload_hash: Option<String>,
    /// Tree size immediately after this entry was appended
    pub tree_size_at_registration: u64,
    /// Blob key of the entry tile holding this leaf
    pub entry_tile_key: String,
    /// Offset of the leaf within its tile
    pub entry_tile_offset: u64,
    /// Registration time, unix seconds
    pub registered_at: u64,
}

/// Metadata index interface
///
/// Implementations:
/// - `SqliteMetadataIndex` - Production storage with SQLite
/// - `MemoryMetadataIndex` - In-memory storage for testing
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Record one entry's metadata and advance the tree-size singleton,
    /// atomically where the backend allows.
    async fn record(&self, meta: &EntryMetadata) -> IndexResult<()>;

    /// Look up metadata by entry index.
    async fn get(&self, entry_index: u64) -> IndexResult<Option<EntryMetadata>>;

    /// The tree size recorded by the most recent registration.
    async fn tree_size(&self) -> IndexResult<u64>;

    /// Number of recorded entries.
    async fn count(&self) -> IndexResult<u64>;
}
