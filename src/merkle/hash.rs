//! RFC 6962 Hash Primitives
//!
//! Leaf hashes are domain-separated with a 0x00 prefix, interior nodes
//! with 0x01. Subtree hashes split at the largest power of two strictly
//! below the range length.

use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 output.
pub type Hash = [u8; 32];

/// Size of every hash in the tree.
pub const HASH_SIZE: usize = 32;

/// Domain prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain prefix for interior node hashes.
const NODE_PREFIX: u8 = 0x01;

/// RFC 6962 leaf hash: SHA-256(0x00 || record).
pub fn leaf_hash(record: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(record);
    hasher.finalize().into()
}

/// RFC 6962 node hash: SHA-256(0x01 || left || right).
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly less than `n`. Requires n >= 2.
pub fn largest_power_of_two_below(n: u64) -> u64 {
    debug_assert!(n >= 2);
    let mut k = 1u64;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// RFC 6962 subtree hash over `records[lo..hi)`.
///
/// `records` are raw 32-byte record hashes; leaf prefixing happens here.
pub fn subtree_hash(records: &[Hash], lo: u64, hi: u64) -> Hash {
    debug_assert!(lo < hi && hi as usize <= records.len());
    if hi - lo == 1 {
        return leaf_hash(&records[lo as usize]);
    }
    let k = largest_power_of_two_below(hi - lo);
    let left = subtree_hash(records, lo, lo + k);
    let right = subtree_hash(records, lo + k, hi);
    node_hash(&left, &right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8) -> Hash {
        [byte; 32]
    }

    #[test]
    fn test_power_of_two_split() {
        assert_eq!(largest_power_of_two_below(2), 1);
        assert_eq!(largest_power_of_two_below(3), 2);
        assert_eq!(largest_power_of_two_below(4), 2);
        assert_eq!(largest_power_of_two_below(5), 4);
        assert_eq!(largest_power_of_two_below(8), 4);
        assert_eq!(largest_power_of_two_below(9), 8);
        assert_eq!(largest_power_of_two_below(257), 256);
    }

    #[test]
    fn test_leaf_hash_is_prefixed() {
        // Leaf and node domains must never collide.
        let r = record(0xab);
        let plain: Hash = sha2::Sha256::digest(r).into();
        assert_ne!(leaf_hash(&r), plain);
    }

    #[test]
    fn test_single_leaf_root() {
        let r = record(1);
        assert_eq!(subtree_hash(&[r], 0, 1), leaf_hash(&r));
    }

    #[test]
    fn test_two_leaf_root() {
        let a = record(1);
        let b = record(2);
        let expected = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        assert_eq!(subtree_hash(&[a, b], 0, 2), expected);
    }

    #[test]
    fn test_three_leaf_root_splits_at_two() {
        let rs = [record(1), record(2), record(3)];
        let left = node_hash(&leaf_hash(&rs[0]), &leaf_hash(&rs[1]));
        let expected = node_hash(&left, &leaf_hash(&rs[2]));
        assert_eq!(subtree_hash(&rs, 0, 3), expected);
    }
}
