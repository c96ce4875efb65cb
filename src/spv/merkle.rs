//! Merkle Inclusion
//!
//! Proofs are the concatenation of 32-byte sibling hashes from leaf to root,
//! excluding both. All hashes are in internal byte order.

use super::SpvError;
use sha2::{Digest, Sha256};

/// Double SHA256 hash (Bitcoin standard)
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Single SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA256 hash of two 32-byte values concatenated
pub fn double_sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[0..32].copy_from_slice(left);
    combined[32..64].copy_from_slice(right);
    double_sha256(&combined)
}

/// Split a flat proof into sibling hashes
pub fn parse_proof(proof: &[u8]) -> Result<Vec<[u8; 32]>, SpvError> {
    if proof.len() % 32 != 0 {
        return Err(SpvError::MalformedMerkleProof(proof.len()));
    }
    Ok(proof
        .chunks_exact(32)
        .map(|chunk| {
            let mut sibling = [0u8; 32];
            sibling.copy_from_slice(chunk);
            sibling
        })
        .collect())
}

/// Fold a leaf up to the root along the index path
pub fn compute_root(leaf: &[u8; 32], siblings: &[[u8; 32]], index: u64) -> [u8; 32] {
    let mut current = *leaf;
    let mut pos = index;

    for sibling in siblings {
        current = if pos & 1 == 1 {
            double_sha256_pair(sibling, &current)
        } else {
            double_sha256_pair(&current, sibling)
        };
        pos >>= 1;
    }

    current
}

/// Verify inclusion of `leaf` at `index` under `root`.
///
/// An index with bits set beyond the proof depth cannot belong to a tree of
/// that depth and is rejected.
pub fn verify_inclusion(leaf: &[u8; 32], siblings: &[[u8; 32]], index: u64, root: &[u8; 32]) -> bool {
    if siblings.len() < 64 && index >> siblings.len() != 0 {
        return false;
    }
    compute_root(leaf, siblings, index) == *root
}

/// Merkle root of a full leaf list, duplicating the last node on odd levels
pub fn compute_merkle_root(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    if leaves.is_empty() {
        return None;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks_exact(2)
            .map(|pair| double_sha256_pair(&pair[0], &pair[1]))
            .collect();
    }

    level.first().copied()
}

/// Sibling path for the leaf at `index`
pub fn build_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return None;
    }

    let mut siblings = Vec::new();
    let mut level = leaves.to_vec();
    let mut pos = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        siblings.push(level[pos ^ 1]);
        level = level
            .chunks_exact(2)
            .map(|pair| double_sha256_pair(&pair[0], &pair[1]))
            .collect();
        pos /= 2;
    }

    Some(siblings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<[u8; 32]> {
        (0..n).map(|i| double_sha256(&[i])).collect()
    }

    #[test]
    fn test_single_leaf_root() {
        let l = leaves(1);
        assert_eq!(compute_merkle_root(&l), Some(l[0]));
        assert!(verify_inclusion(&l[0], &[], 0, &l[0]));
    }

    #[test]
    fn test_proofs_for_every_position() {
        for n in [2u8, 3, 5, 8] {
            let l = leaves(n);
            let root = compute_merkle_root(&l).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let proof = build_proof(&l, i).unwrap();
                assert!(verify_inclusion(leaf, &proof, i as u64, &root), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_wrong_index_fails() {
        let l = leaves(4);
        let root = compute_merkle_root(&l).unwrap();
        let proof = build_proof(&l, 1).unwrap();

        assert!(!verify_inclusion(&l[1], &proof, 0, &root));
        // Out-of-range index for a depth-2 proof
        assert!(!verify_inclusion(&l[1], &proof, 5, &root));
    }

    #[test]
    fn test_parse_proof_length() {
        assert_eq!(parse_proof(&[0u8; 64]).unwrap().len(), 2);
        assert!(parse_proof(&[]).unwrap().is_empty());
        assert!(matches!(
            parse_proof(&[0u8; 33]),
            Err(SpvError::MalformedMerkleProof(33))
        ));
    }
}
