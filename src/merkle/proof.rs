//! Inclusion and Consistency Proofs
//!
//! Proof generation walks the RFC 6962 recursive range decomposition over
//! the raw record hashes. The verifiers are independent of the generators:
//! inclusion re-simulates the top-down frame decomposition, consistency
//! uses the Certificate Transparency bit-twiddling verifier.

use thiserror::Error;

use super::hash::{largest_power_of_two_below, leaf_hash, node_hash, subtree_hash, Hash};

/// Proof-related errors
#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("index {index} out of range for tree size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("empty tree has no root")]
    EmptyTree,
}

/// RFC 6962 audit path for leaf `index` in a tree of `size` leaves.
///
/// `records` must hold at least `size` raw record hashes. The path is
/// ordered bottom-up: the first element is the sibling at the leaf level.
pub fn inclusion_proof(records: &[Hash], index: u64, size: u64) -> Result<Vec<Hash>, MerkleError> {
    if size == 0 || index >= size {
        return Err(MerkleError::IndexOutOfRange { index, size });
    }
    if (records.len() as u64) < size {
        return Err(MerkleError::InvalidRange(format!(
            "tree size {} exceeds {} available records",
            size,
            records.len()
        )));
    }
    let mut path = Vec::new();
    audit_path(records, index, 0, size, &mut path);
    Ok(path)
}

fn audit_path(records: &[Hash], index: u64, lo: u64, hi: u64, out: &mut Vec<Hash>) {
    if hi - lo == 1 {
        return;
    }
    let k = largest_power_of_two_below(hi - lo);
    if index < lo + k {
        audit_path(records, index, lo, lo + k, out);
        out.push(subtree_hash(records, lo + k, hi));
    } else {
        audit_path(records, index, lo + k, hi, out);
        out.push(subtree_hash(records, lo, lo + k));
    }
}

/// RFC 6962 consistency proof between tree sizes `old_size` and `new_size`.
///
/// Empty when `old_size` is 0 or the sizes are equal.
pub fn consistency_proof(
    records: &[Hash],
    old_size: u64,
    new_size: u64,
) -> Result<Vec<Hash>, MerkleError> {
    if old_size > new_size {
        return Err(MerkleError::InvalidRange(format!(
            "old size {} exceeds new size {}",
            old_size, new_size
        )));
    }
    if (records.len() as u64) < new_size {
        return Err(MerkleError::InvalidRange(format!(
            "tree size {} exceeds {} available records",
            new_size,
            records.len()
        )));
    }
    if old_size == 0 || old_size == new_size {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    subproof(records, old_size, 0, new_size, true, &mut out);
    Ok(out)
}

// `complete` is true while the old tree is a complete prefix of the range;
// descending into a right child clears it. The right branch recurses before
// appending the left subtree hash, which fixes the emission order.
fn subproof(records: &[Hash], m: u64, lo: u64, hi: u64, complete: bool, out: &mut Vec<Hash>) {
    if m == hi - lo {
        if !complete {
            out.push(subtree_hash(records, lo, hi));
        }
        return;
    }
    let k = largest_power_of_two_below(hi - lo);
    if m <= k {
        subproof(records, m, lo, lo + k, complete, out);
        out.push(subtree_hash(records, lo + k, hi));
    } else {
        subproof(records, m - k, lo + k, hi, false, out);
        out.push(subtree_hash(records, lo, lo + k));
    }
}

/// Recompute the root a proof commits to, or None when the proof shape
/// does not match (index, size).
///
/// Recomputes the top-down sequence of range frames for `index`, then folds
/// the siblings bottom-up: `node_hash(sibling, acc)` when the leaf sits in
/// the right subtree of a frame, `node_hash(acc, sibling)` otherwise.
pub fn reconstruct_root(record: &Hash, index: u64, size: u64, proof: &[Hash]) -> Option<Hash> {
    if size == 0 || index >= size {
        return None;
    }

    // Top-down descent; true marks frames where the leaf is in the right subtree.
    let mut in_right = Vec::new();
    let mut lo = 0u64;
    let mut hi = size;
    while hi - lo > 1 {
        let k = largest_power_of_two_below(hi - lo);
        if index < lo + k {
            in_right.push(false);
            hi = lo + k;
        } else {
            in_right.push(true);
            lo += k;
        }
    }

    if in_right.len() != proof.len() {
        return None;
    }

    let mut acc = leaf_hash(record);
    for (sibling, right) in proof.iter().zip(in_right.iter().rev()) {
        acc = if *right {
            node_hash(sibling, &acc)
        } else {
            node_hash(&acc, sibling)
        };
    }
    Some(acc)
}

/// Verify an inclusion proof for a raw record hash.
pub fn verify_inclusion(
    record: &Hash,
    index: u64,
    size: u64,
    proof: &[Hash],
    root: &Hash,
) -> bool {
    reconstruct_root(record, index, size, proof) == Some(*root)
}

/// Verify a consistency proof between two tree heads.
pub fn verify_consistency(
    old_size: u64,
    new_size: u64,
    proof: &[Hash],
    old_root: &Hash,
    new_root: &Hash,
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == new_size {
        return proof.is_empty() && old_root == new_root;
    }
    if old_size == 0 {
        // Anything is consistent with the empty tree; the proof carries nothing.
        return proof.is_empty();
    }

    let shift = old_size.trailing_zeros() as u64;
    let inner_full = bit_len((old_size - 1) ^ (new_size - 1));
    let border = ((old_size - 1) >> inner_full).count_ones() as u64;
    let inner = inner_full - shift;

    let (seed, rest) = if old_size == 1u64 << shift {
        // The old tree is a complete subtree; its root seeds the fold.
        (*old_root, proof)
    } else {
        match proof.split_first() {
            Some((first, rest)) => (*first, rest),
            None => return false,
        }
    };
    if rest.len() as u64 != inner + border {
        return false;
    }
    let (inner_part, border_part) = rest.split_at(inner as usize);
    let mask = (old_size - 1) >> shift;

    // The old root consumes only the siblings inside the old tree.
    let mut acc_old = seed;
    for (i, sibling) in inner_part.iter().enumerate() {
        if (mask >> i) & 1 == 1 {
            acc_old = node_hash(sibling, &acc_old);
        }
    }
    for sibling in border_part {
        acc_old = node_hash(sibling, &acc_old);
    }
    if acc_old != *old_root {
        return false;
    }

    // The new root consumes every sibling.
    let mut acc_new = seed;
    for (i, sibling) in inner_part.iter().enumerate() {
        acc_new = if (mask >> i) & 1 == 1 {
            node_hash(sibling, &acc_new)
        } else {
            node_hash(&acc_new, sibling)
        };
    }
    for sibling in border_part {
        acc_new = node_hash(sibling, &acc_new);
    }
    acc_new == *new_root
}

fn bit_len(x: u64) -> u64 {
    (64 - x.leading_zeros()) as u64
}
