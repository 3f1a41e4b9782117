//! RFC 6962 Merkle Tree Engine
//!
//! Hash primitives, the compact range used for O(log n) appends, and
//! inclusion / consistency proof generation with reference verifiers.

pub mod compact;
pub mod hash;
pub mod proof;

pub use compact::CompactRange;
pub use hash::{leaf_hash, node_hash, subtree_hash, Hash, HASH_SIZE};
pub use proof::{
    consistency_proof, inclusion_proof, reconstruct_root, verify_consistency, verify_inclusion,
    MerkleError,
};
