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

//! Header root hashes.
//!
//! List roots hash the plain concatenation of key strings. Where several
//! lists share one root, a marker `[label:len,len]` precedes their keys, so
//! moving a key from the end of one list to the head of the next changes the
//! root. Shard maps are flattened by ascending shard id, labelled by the
//! decimal shard id; absent lists count as empty.

use crate::core::committee::state::CommitteeState;
use crate::core::instruction::WireInstruction;
use crate::core::producer::shard_state::ShardState;
use crate::core::state::merkle::{hash_leaf, length_prefixed, merkle_proof, merkle_root, verify_proof, MerkleProof};
use crate::core::types::{encode_canonical, sha256, CodecError, CommitteePublicKey, ShardId, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Root computation errors.
#[derive(Debug, Error)]
pub enum RootHashError {
    /// Canonical encoding failed.
    #[error("encode: {0}")]
    Codec(#[from] CodecError),
}

/// Hash of the concatenation of `items`.
pub fn hash_string_array<S: AsRef<str>>(items: &[S]) -> H256 {
    let mut buf = Vec::new();
    for s in items.iter() {
        buf.extend_from_slice(s.as_ref().as_bytes());
    }
    sha256(&buf)
}

fn push_keys(out: &mut Vec<String>, keys: &[CommitteePublicKey]) {
    out.extend(keys.iter().map(CommitteePublicKey::to_key_string));
}

fn push_lists(out: &mut Vec<String>, label: &str, lists: &[&[CommitteePublicKey]]) {
    let lens: Vec<String> = lists.iter().map(|l| l.len().to_string()).collect();
    out.push(format!("[{label}:{}]", lens.join(",")));
    for l in lists.iter() {
        push_keys(out, l);
    }
}

fn flatten_shard_lists(maps: &[&BTreeMap<ShardId, Vec<CommitteePublicKey>>]) -> Vec<String> {
    let mut shards: Vec<ShardId> = maps.iter().flat_map(|m| m.keys().copied()).collect();
    shards.sort_unstable();
    shards.dedup();
    let mut out = Vec::new();
    for s in shards {
        let lists: Vec<&[CommitteePublicKey]> = maps
            .iter()
            .map(|m| m.get(&s).map_or(&[][..], Vec::as_slice))
            .collect();
        push_lists(&mut out, &s.to_string(), &lists);
    }
    out
}

/// Committee roots carried by a beacon header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeStateHash {
    /// Beacon committee followed by beacon substitutes.
    pub beacon_committee_and_validator_root: H256,
    /// Beacon candidate pool.
    pub beacon_candidate_root: H256,
    /// Shard candidate pool.
    pub shard_candidate_root: H256,
    /// Per shard: committee followed by substitutes.
    pub shard_committee_and_validator_root: H256,
    /// Per shard sync pool.
    pub shard_sync_validator_root: H256,
    /// Auto-stake flags.
    pub auto_staking_root: H256,
}

impl CommitteeStateHash {
    /// Roots of `state`.
    pub fn compute(state: &CommitteeState) -> Result<Self, RootHashError> {
        let base = state.base();

        let mut beacon = Vec::new();
        push_lists(
            &mut beacon,
            "beacon",
            &[base.beacon_committee.as_slice(), base.beacon_substitute.as_slice()],
        );

        let mut beacon_candidates = Vec::new();
        push_keys(&mut beacon_candidates, &base.beacon_common_pool);
        let mut shard_candidates = Vec::new();
        push_keys(&mut shard_candidates, &base.shard_common_pool);

        let shard = flatten_shard_lists(&[&base.shard_committee, &base.shard_substitute]);
        let sync = state
            .sync_pool()
            .map(|sp| flatten_shard_lists(&[sp]))
            .unwrap_or_default();

        Ok(Self {
            beacon_committee_and_validator_root: hash_string_array(&beacon),
            beacon_candidate_root: hash_string_array(&beacon_candidates),
            shard_candidate_root: hash_string_array(&shard_candidates),
            shard_committee_and_validator_root: hash_string_array(&shard),
            shard_sync_validator_root: hash_string_array(&sync),
            auto_staking_root: sha256(&encode_canonical(&base.auto_stake)?),
        })
    }
}

/// Root over the shard states included in a block.
pub fn shard_state_hash(states: &BTreeMap<ShardId, Vec<ShardState>>) -> Result<H256, RootHashError> {
    Ok(sha256(&encode_canonical(states)?))
}

/// Plain hash over every field of every instruction, in order.
pub fn instruction_hash(insts: &[WireInstruction]) -> H256 {
    let flat: Vec<&str> = insts.iter().flatten().map(String::as_str).collect();
    hash_string_array(flat.as_slice())
}

fn instruction_leaves(insts: &[WireInstruction]) -> Vec<Vec<u8>> {
    insts.iter().map(|i| length_prefixed(i.as_slice())).collect()
}

/// Binary Merkle root over length-prefixed instruction encodings.
pub fn instruction_merkle_root(insts: &[WireInstruction]) -> H256 {
    merkle_root(&instruction_leaves(insts))
}

/// Inclusion proof of the instruction at `index`.
pub fn instruction_proof(insts: &[WireInstruction], index: usize) -> Option<MerkleProof> {
    merkle_proof(&instruction_leaves(insts), index)
}

/// Check that `inst` is the proven leaf and the proof reaches `root`.
pub fn verify_instruction(root: &H256, inst: &WireInstruction, proof: &MerkleProof) -> bool {
    proof.leaf == hash_leaf(&length_prefixed(inst.as_slice())) && verify_proof(root, proof)
}
