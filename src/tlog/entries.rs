//! Entry Store
//!
//! Leaves are raw 32-byte record hashes concatenated into 8 KiB entry
//! tiles. The current partial tile is extended by rewriting it under the
//! key for its new width; at width 256 it is promoted to the immutable
//! full-tile key. Trailing bytes from a crash (leaf written, tree state
//! not) live under a width key the next append simply overwrites.

use std::sync::Arc;

use super::path::{
    entry_coords, entry_tile_key, entry_tile_partial_key, ENTRY_SIZE, TILE_WIDTH,
};
use super::TlogError;
use crate::merkle::Hash;
use crate::storage::BlobStore;

/// Append-only store of record hashes, tile-packed.
#[derive(Clone)]
pub struct EntryStore {
    store: Arc<dyn BlobStore>,
}

impl EntryStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Persist the record hash for the entry at `index`.
    ///
    /// The caller guarantees `index` is the current tree size, so the
    /// target tile has exactly `index % 256` committed records.
    pub async fn append_record(&self, index: u64, record: &Hash) -> Result<(), TlogError> {
        let (tile, offset) = entry_coords(index);

        let mut bytes = if offset == 0 {
            Vec::with_capacity(ENTRY_SIZE as usize)
        } else {
            self.read_tile(tile, offset).await?
        };
        bytes.extend_from_slice(record);

        let width = offset + 1;
        let key = if width == TILE_WIDTH {
            entry_tile_key(tile)
        } else {
            entry_tile_partial_key(tile, width)
        };
        self.store.put(&key, &bytes).await?;
        Ok(())
    }

    /// Read the record hash of entry `index` from a tree of `size` leaves.
    pub async fn read_record(&self, index: u64, size: u64) -> Result<Hash, TlogError> {
        if index >= size {
            return Err(TlogError::NotFound { index, size });
        }
        let (tile, offset) = entry_coords(index);
        let width = tile_width_at(tile, size);
        let bytes = self.read_tile(tile, width).await?;
        let start = (offset * ENTRY_SIZE) as usize;
        let mut record = [0u8; 32];
        record.copy_from_slice(&bytes[start..start + ENTRY_SIZE as usize]);
        Ok(record)
    }

    /// Read all record hashes in `[0, n)`, tile by tile.
    pub async fn read_records(&self, n: u64) -> Result<Vec<Hash>, TlogError> {
        let mut records = Vec::with_capacity(n as usize);
        let mut tile = 0u64;
        while tile * TILE_WIDTH < n {
            let width = tile_width_at(tile, n);
            let bytes = self.read_tile(tile, width).await?;
            for chunk in bytes.chunks_exact(ENTRY_SIZE as usize).take(width as usize) {
                let mut record = [0u8; 32];
                record.copy_from_slice(chunk);
                records.push(record);
            }
            tile += 1;
        }
        Ok(records)
    }

    /// Fetch a tile at the given width, checking the byte length.
    async fn read_tile(&self, tile: u64, width: u64) -> Result<Vec<u8>, TlogError> {
        let key = if width == TILE_WIDTH {
            entry_tile_key(tile)
        } else {
            entry_tile_partial_key(tile, width)
        };
        let bytes = match self.store.get(&key).await? {
            Some(bytes) => bytes,
            // A full tile subsumes every partial width of itself.
            None if width < TILE_WIDTH => match self.store.get(&entry_tile_key(tile)).await? {
                Some(full) => full[..(width * ENTRY_SIZE) as usize].to_vec(),
                None => {
                    return Err(TlogError::Corrupt(format!(
                        "missing entry tile {} at width {}",
                        tile, width
                    )))
                }
            },
            None => {
                return Err(TlogError::Corrupt(format!("missing entry tile {}", tile)))
            }
        };
        if (bytes.len() as u64) < width * ENTRY_SIZE {
            return Err(TlogError::Corrupt(format!(
                "entry tile {} holds {} bytes, need {}",
                tile,
                bytes.len(),
                width * ENTRY_SIZE
            )));
        }
        Ok(bytes)
    }
}

/// Width of `tile` in a tree of `size` leaves.
fn tile_width_at(tile: u64, size: u64) -> u64 {
    let start = tile * TILE_WIDTH;
    debug_assert!(size > start);
    (size - start).min(TILE_WIDTH)
}
