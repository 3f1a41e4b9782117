//! Tile-Log Engine
//!
//! Owns the tree size and compact range, writes leaves and hash tiles
//! through to the blob store, and persists `.tree-state` atomically after
//! every append. Proofs over historical tree sizes walk the stored entry
//! tiles.
//!
//! Durability invariant: tree state persisted implies every leaf below
//! `size` is present in its entry tile. A crash between the leaf write
//! and the state write leaves a trailing leaf that `load()` ignores and
//! the next append overwrites.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::entries::EntryStore;
use super::path::{hash_tile_key, hash_tile_partial_key, TILE_WIDTH};
use super::TlogError;
use crate::merkle::{
    self, leaf_hash, subtree_hash, CompactRange, Hash, HASH_SIZE,
};
use crate::storage::BlobStore;

/// Blob key of the persisted tree state.
pub const TREE_STATE_KEY: &str = ".tree-state";

/// A tree size together with its root hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHead {
    pub size: u64,
    pub root: Hash,
}

/// Persisted form of the tree state.
#[derive(Serialize, Deserialize)]
struct TreeState {
    size: u64,
    root: String,
    hashes: Vec<String>,
}

/// The append-only tile log.
///
/// Single writer: callers serialize `append` externally (the service holds
/// it behind a `tokio::sync::RwLock`, appends under the write guard).
pub struct TileLog {
    store: Arc<dyn BlobStore>,
    entries: EntryStore,
    range: CompactRange,
}

impl TileLog {
    /// Load the log from the blob store, or initialize an empty one.
    pub async fn load(store: Arc<dyn BlobStore>) -> Result<Self, TlogError> {
        let entries = EntryStore::new(store.clone());
        let range = match store.get(TREE_STATE_KEY).await? {
            None => CompactRange::new(),
            Some(bytes) => {
                let state: TreeState = serde_json::from_slice(&bytes)
                    .map_err(|e| TlogError::Corrupt(format!("tree state: {e}")))?;
                let mut hashes = Vec::with_capacity(state.hashes.len());
                for h in &state.hashes {
                    hashes.push(decode_hash(h)?);
                }
                let range = CompactRange::from_parts(state.size, &hashes).ok_or_else(|| {
                    TlogError::Corrupt(format!(
                        "{} compact-range hashes for size {}",
                        state.hashes.len(),
                        state.size
                    ))
                })?;
                if state.size > 0 {
                    let expected = decode_hash(&state.root)?;
                    if range.root() != Some(expected) {
                        return Err(TlogError::Corrupt(
                            "compact range does not reproduce persisted root".to_string(),
                        ));
                    }
                }
                range
            }
        };
        Ok(Self {
            store,
            entries,
            range,
        })
    }

    /// Current tree size.
    pub fn size(&self) -> u64 {
        self.range.size()
    }

    /// Current tree head. Fails on the empty tree.
    pub fn head(&self) -> Result<TreeHead, TlogError> {
        Ok(TreeHead {
            size: self.size(),
            root: self.root()?,
        })
    }

    /// Current RFC 6962 root. Fails on the empty tree.
    pub fn root(&self) -> Result<Hash, TlogError> {
        self.range.root().ok_or(TlogError::EmptyTree)
    }

    /// Append one record hash; returns its entry index.
    pub async fn append(&mut self, record: Hash) -> Result<u64, TlogError> {
        let index = self.range.size();
        self.entries.append_record(index, &record).await?;
        self.write_hash_tiles(index, &record).await?;
        self.range.push_record(&record);
        self.persist_state().await?;
        Ok(index)
    }

    /// Record hash of the entry at `index`.
    pub async fn get_leaf(&self, index: u64) -> Result<Hash, TlogError> {
        self.entries.read_record(index, self.size()).await
    }

    /// RFC 6962 root of the first `size` leaves.
    pub async fn root_at(&self, size: u64) -> Result<Hash, TlogError> {
        if size == 0 {
            return Err(TlogError::EmptyTree);
        }
        if size == self.size() {
            return self.root();
        }
        if size > self.size() {
            return Err(TlogError::NotFound {
                index: size,
                size: self.size(),
            });
        }
        let records = self.entries.read_records(size).await?;
        Ok(subtree_hash(&records, 0, size))
    }

    /// Audit path for leaf `index` in the tree of `size` leaves.
    pub async fn inclusion_proof(&self, index: u64, size: u64) -> Result<Vec<Hash>, TlogError> {
        if size > self.size() {
            return Err(TlogError::NotFound {
                index,
                size: self.size(),
            });
        }
        let records = self.entries.read_records(size).await?;
        Ok(merkle::inclusion_proof(&records, index, size)?)
    }

    /// Consistency proof between two historical tree sizes.
    pub async fn consistency_proof(
        &self,
        old_size: u64,
        new_size: u64,
    ) -> Result<Vec<Hash>, TlogError> {
        if new_size > self.size() {
            return Err(TlogError::NotFound {
                index: new_size,
                size: self.size(),
            });
        }
        let records = self.entries.read_records(new_size).await?;
        Ok(merkle::consistency_proof(&records, old_size, new_size)?)
    }

    /// Write-through of hash tiles for the append at `index`.
    ///
    /// Level 0 always receives the leaf hash. Each higher level receives
    /// one hash whenever the append completes a 256^l-aligned subtree,
    /// recomputed by walking the stored entries.
    async fn write_hash_tiles(&self, index: u64, record: &Hash) -> Result<(), TlogError> {
        self.append_hash_at_level(0, index, leaf_hash(record)).await?;

        let next = index + 1;
        let mut level = 1u32;
        loop {
            let span = match 256u64.checked_pow(level) {
                Some(span) if span <= next => span,
                _ => break,
            };
            if next % span != 0 {
                break;
            }
            let records = self.entries.read_records(next).await?;
            let hash = subtree_hash(&records, next - span, next);
            self.append_hash_at_level(level as u64, next / span - 1, hash)
                .await?;
            level += 1;
        }
        Ok(())
    }

    /// Extend the level-`level` hash tile with the hash at `position`.
    async fn append_hash_at_level(
        &self,
        level: u64,
        position: u64,
        hash: Hash,
    ) -> Result<(), TlogError> {
        let tile = position / TILE_WIDTH;
        let offset = position % TILE_WIDTH;

        let mut bytes = if offset == 0 {
            Vec::with_capacity(HASH_SIZE)
        } else {
            match self
                .store
                .get(&hash_tile_partial_key(level, tile, offset))
                .await?
            {
                Some(bytes) => bytes,
                None => {
                    return Err(TlogError::Corrupt(format!(
                        "missing hash tile {}/{} at width {}",
                        level, tile, offset
                    )))
                }
            }
        };
        bytes.truncate((offset as usize) * HASH_SIZE);
        bytes.extend_from_slice(&hash);

        let width = offset + 1;
        let key = if width == TILE_WIDTH {
            hash_tile_key(level, tile)
        } else {
            hash_tile_partial_key(level, tile, width)
        };
        self.store.put(&key, &bytes).await?;
        Ok(())
    }

    /// Persist `.tree-state` (size, root, compact-range hashes) atomically.
    async fn persist_state(&self) -> Result<(), TlogError> {
        let state = TreeState {
            size: self.range.size(),
            root: self
                .range
                .root()
                .map(|r| hex::encode(r))
                .unwrap_or_default(),
            hashes: self.range.hashes().iter().map(hex::encode).collect(),
        };
        let bytes = serde_json::to_vec(&state)
            .map_err(|e| TlogError::Corrupt(format!("tree state encode: {e}")))?;
        self.store.put(TREE_STATE_KEY, &bytes).await?;
        Ok(())
    }
}

fn decode_hash(hex_str: &str) -> Result<Hash, TlogError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| TlogError::Corrupt(format!("bad hash hex: {e}")))?;
    if bytes.len() != HASH_SIZE {
        return Err(TlogError::Corrupt(format!(
            "hash is {} bytes, expected {}",
            bytes.len(),
            HASH_SIZE
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}
