// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Binary Merkle tree over length-prefixed leaves.
//!
//! leaf = H( "Shardbeacon-Leaf-v1" || data )
//! node = H( "Shardbeacon-Node-v1" || left || right )
//!
//! An odd node at the end of a level is paired with itself.

use crate::core::types::{sha256, H256};

const LEAF_DOMAIN: &[u8] = b"Shardbeacon-Leaf-v1";
const NODE_DOMAIN: &[u8] = b"Shardbeacon-Node-v1";

/// Side of sibling in proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Sibling is left.
    Left,
    /// Sibling is right.
    Right,
}

/// One proof item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofItem {
    /// Whether sibling is left or right of current hash.
    pub side: Side,
    /// Sibling hash.
    pub sibling: H256,
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Leaf hash.
    pub leaf: H256,
    /// Path items from leaf to root.
    pub path: Vec<ProofItem>,
}

/// Length-prefixed encoding: each field as `u32 BE length || bytes`.
pub fn length_prefixed<S: AsRef<[u8]>>(fields: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for f in fields.iter() {
        let f = f.as_ref();
        out.extend_from_slice(&(f.len() as u32).to_be_bytes());
        out.extend_from_slice(f);
    }
    out
}

/// Leaf hash of an encoded item.
pub fn hash_leaf(data: &[u8]) -> H256 {
    let mut buf = Vec::with_capacity(LEAF_DOMAIN.len() + data.len());
    buf.extend_from_slice(LEAF_DOMAIN);
    buf.extend_from_slice(data);
    sha256(&buf)
}

fn hash_node(left: &H256, right: &H256) -> H256 {
    let mut buf = Vec::with_capacity(NODE_DOMAIN.len() + 64);
    buf.extend_from_slice(NODE_DOMAIN);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    sha256(&buf)
}

fn next_level(level: &[H256]) -> Vec<H256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [l, r] => hash_node(l, r),
            [l] => hash_node(l, l),
            _ => H256::ZERO,
        })
        .collect()
}

/// Root over encoded leaves. Empty input gives the zero hash.
pub fn merkle_root(leaves: &[Vec<u8>]) -> H256 {
    if leaves.is_empty() {
        return H256::ZERO;
    }
    let mut level: Vec<H256> = leaves.iter().map(|l| hash_leaf(l)).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Inclusion proof for the leaf at `index`.
pub fn merkle_proof(leaves: &[Vec<u8>], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }
    let mut level: Vec<H256> = leaves.iter().map(|l| hash_leaf(l)).collect();
    let mut idx = index;
    let leaf = level[idx];
    let mut path = Vec::new();

    while level.len() > 1 {
        let is_right = idx % 2 == 1;
        let sib_idx = if is_right { idx - 1 } else { idx + 1 };
        let sibling = level.get(sib_idx).copied().unwrap_or(level[idx]);
        path.push(ProofItem {
            side: if is_right { Side::Left } else { Side::Right },
            sibling,
        });
        level = next_level(&level);
        idx /= 2;
    }

    Some(MerkleProof { leaf, path })
}

/// Verify proof against root.
pub fn verify_proof(root: &H256, proof: &MerkleProof) -> bool {
    let mut cur = proof.leaf;
    for item in proof.path.iter() {
        cur = match item.side {
            Side::Left => hash_node(&item.sibling, &cur),
            Side::Right => hash_node(&cur, &item.sibling),
        };
    }
    cur == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_separates_fields() {
        assert_ne!(length_prefixed(&["ab", "c"]), length_prefixed(&["a", "bc"]));
        assert_eq!(length_prefixed(&["x"]), vec![0, 0, 0, 1, b'x']);
    }

    #[test]
    fn proofs_verify_for_every_leaf_and_fail_when_tampered() {
        let leaves: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 3]).collect();
        let root = merkle_root(&leaves);
        for i in 0..leaves.len() {
            let p = merkle_proof(&leaves, i).unwrap();
            assert!(verify_proof(&root, &p));
        }
        let mut p = merkle_proof(&leaves, 2).unwrap();
        p.leaf = hash_leaf(b"other");
        assert!(!verify_proof(&root, &p));
        assert!(merkle_proof(&leaves, 5).is_none());
        assert_eq!(merkle_root(&[]), H256::ZERO);
    }
}
