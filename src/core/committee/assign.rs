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

//! Epoch randomness and candidate-to-shard assignment.
//!
//! The random number is derived only from chain tip hashes. It is predictable
//! one block ahead; that is part of the consensus contract and must not change.

use crate::core::types::{sha256, CommitteePublicKey, ShardId, H256};
use std::collections::BTreeMap;

/// Epoch random number from the best beacon hash and each active shard's best hash.
///
/// The hashes are concatenated into one big-endian integer whose low 64 bits
/// are reinterpreted as `i64`. A shard without a best hash contributes zeros.
pub fn random_number(
    best_beacon_hash: &H256,
    best_shard_hash: &BTreeMap<ShardId, H256>,
    active_shards: u8,
) -> i64 {
    let mut raw = best_beacon_hash.as_bytes().to_vec();
    for s in 0..active_shards {
        let h = best_shard_hash.get(&s).copied().unwrap_or(H256::ZERO);
        raw.extend_from_slice(h.as_bytes());
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&raw[raw.len() - 8..]);
    u64::from_be_bytes(low) as i64
}

/// Shard a re-staked validator is sent to: last byte of
/// `sha256(key_string || seed)` modulo the active shard count.
pub fn candidate_shard(key_string: &str, seed: i64, active_shards: u8) -> ShardId {
    let mut buf = key_string.as_bytes().to_vec();
    buf.extend_from_slice(seed.to_string().as_bytes());
    let h = sha256(&buf);
    h.as_bytes()[31] % active_shards.max(1)
}

/// Distribute candidates over shards by load.
///
/// Each candidate goes to the shard with the fewest pending plus already
/// assigned validators, among shards still under their per-epoch cap. Ties go
/// to the first shard in rotation order starting at `seed mod active_shards`.
/// Candidates that fit nowhere are returned as unassigned, in order.
pub fn assign_candidates(
    candidates: &[CommitteePublicKey],
    pending: &BTreeMap<ShardId, usize>,
    caps: &BTreeMap<ShardId, usize>,
    seed: i64,
    active_shards: u8,
) -> (BTreeMap<ShardId, Vec<CommitteePublicKey>>, Vec<CommitteePublicKey>) {
    let mut assigned: BTreeMap<ShardId, Vec<CommitteePublicKey>> = BTreeMap::new();
    let mut unassigned = Vec::new();
    if active_shards == 0 {
        return (assigned, candidates.to_vec());
    }

    let start = seed.rem_euclid(i64::from(active_shards)) as u8;
    let order: Vec<ShardId> = (0..active_shards)
        .map(|i| ((u16::from(start) + u16::from(i)) % u16::from(active_shards)) as u8)
        .collect();
    let mut load: BTreeMap<ShardId, usize> = order
        .iter()
        .map(|s| (*s, pending.get(s).copied().unwrap_or(0)))
        .collect();

    for cand in candidates.iter() {
        let mut best: Option<(ShardId, usize)> = None;
        for s in order.iter() {
            let taken = assigned.get(s).map_or(0, Vec::len);
            if taken >= caps.get(s).copied().unwrap_or(0) {
                continue;
            }
            let l = load.get(s).copied().unwrap_or(0);
            if best.map_or(true, |(_, bl)| l < bl) {
                best = Some((*s, l));
            }
        }
        match best {
            Some((s, _)) => {
                assigned.entry(s).or_default().push(cand.clone());
                *load.entry(s).or_default() += 1;
            }
            None => unassigned.push(cand.clone()),
        }
    }
    (assigned, unassigned)
}
