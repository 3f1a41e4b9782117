//! Tile-Based Transparency Log
//!
//! This module contains:
//! - C2SP tlog-tiles path naming and entry coordinates
//! - The append-only entry store (leaves packed into 8 KiB tiles)
//! - The tile-log engine: tree state, compact range, proofs

pub mod entries;
pub mod log;
pub mod path;

use thiserror::Error;

use crate::merkle::MerkleError;
use crate::storage::StorageError;

/// Tile-log errors
#[derive(Debug, Error)]
pub enum TlogError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("entry {index} not found in tree of size {size}")]
    NotFound { index: u64, size: u64 },

    #[error("empty tree has no root")]
    EmptyTree,

    #[error("corrupt tree state: {0}")]
    Corrupt(String),
}

pub use entries::EntryStore;
pub use log::{TileLog, TreeHead, TREE_STATE_KEY};
pub use path::{
    entry_coords, entry_tile_key, entry_tile_partial_key, hash_tile_key, hash_tile_partial_key,
    index_path, parse_index_path, ENTRY_SIZE, FULL_TILE_BYTES, TILE_WIDTH,
};
