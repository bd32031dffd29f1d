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

//! Versioned committee state.
//!
//! `CommitteeStateBase` holds the fields every version shares. The sync-pool
//! version embeds it and adds `sync_pool` and `terms`. Behavior is selected by
//! the explicit version tag of [`CommitteeState`].
//!
//! Lists hold keys; bookkeeping maps are keyed by key string.

use crate::core::config::{GenesisCommittees, StateVersion};
use crate::core::types::{CommitteePublicKey, ShardId};
use std::collections::{BTreeMap, BTreeSet};

/// Fields shared by every state version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitteeStateBase {
    /// Active beacon validators.
    pub beacon_committee: Vec<CommitteePublicKey>,
    /// Pending beacon validators.
    pub beacon_substitute: Vec<CommitteePublicKey>,
    /// Beacon stakers waiting for randomness.
    pub beacon_common_pool: Vec<CommitteePublicKey>,
    /// Active shard validators.
    pub shard_committee: BTreeMap<ShardId, Vec<CommitteePublicKey>>,
    /// Pending shard validators.
    pub shard_substitute: BTreeMap<ShardId, Vec<CommitteePublicKey>>,
    /// Shard stakers waiting for randomness.
    pub shard_common_pool: Vec<CommitteePublicKey>,
    /// Leading part of `shard_common_pool` eligible for this epoch's randomness.
    pub number_of_assigned_candidates: usize,
    /// Auto-stake flags.
    pub auto_stake: BTreeMap<String, bool>,
    /// Reward receivers.
    pub reward_receiver: BTreeMap<String, String>,
    /// Staking transactions.
    pub staking_tx: BTreeMap<String, String>,
}

/// Sync-pool aware state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitteeStateV3 {
    /// Shared fields.
    pub base: CommitteeStateBase,
    /// Candidates syncing a shard before becoming substitutes.
    pub sync_pool: BTreeMap<ShardId, Vec<CommitteePublicKey>>,
    /// Beacon height at which each validator (re)entered duty.
    pub terms: BTreeMap<String, u64>,
}

/// Committee state, tagged by version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitteeState {
    /// Slashing-aware base.
    Slashing(CommitteeStateBase),
    /// Sync-pool aware.
    SyncPool(CommitteeStateV3),
}

/// Where a key currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Beacon committee.
    BeaconCommittee,
    /// Beacon substitute.
    BeaconSubstitute,
    /// Beacon candidate pool.
    BeaconCandidate,
    /// Shard committee.
    ShardCommittee(ShardId),
    /// Shard substitute.
    ShardSubstitute(ShardId),
    /// Shard sync pool.
    SyncPool(ShardId),
    /// Shard candidate pool.
    ShardCandidate,
}

/// Remove `key` from `list`, returning its former position.
pub fn remove_key(list: &mut Vec<CommitteePublicKey>, key: &CommitteePublicKey) -> Option<usize> {
    let pos = list.iter().position(|k| k == key)?;
    list.remove(pos);
    Some(pos)
}

impl CommitteeStateBase {
    /// Drop every bookkeeping entry of a key.
    pub fn forget(&mut self, key_string: &str) {
        self.auto_stake.remove(key_string);
        self.reward_receiver.remove(key_string);
        self.staking_tx.remove(key_string);
    }

    fn push_lists<'a>(&'a self, out: &mut Vec<(&'a CommitteePublicKey, Membership)>) {
        out.extend(self.beacon_committee.iter().map(|k| (k, Membership::BeaconCommittee)));
        out.extend(self.beacon_substitute.iter().map(|k| (k, Membership::BeaconSubstitute)));
        out.extend(self.beacon_common_pool.iter().map(|k| (k, Membership::BeaconCandidate)));
        for (s, l) in self.shard_committee.iter() {
            out.extend(l.iter().map(|k| (k, Membership::ShardCommittee(*s))));
        }
        for (s, l) in self.shard_substitute.iter() {
            out.extend(l.iter().map(|k| (k, Membership::ShardSubstitute(*s))));
        }
        out.extend(self.shard_common_pool.iter().map(|k| (k, Membership::ShardCandidate)));
    }
}

impl CommitteeState {
    /// Empty state of the given version with `active_shards` shard slots.
    pub fn new(version: StateVersion, active_shards: u8) -> Self {
        let mut base = CommitteeStateBase::default();
        for s in 0..active_shards {
            base.shard_committee.insert(s, Vec::new());
            base.shard_substitute.insert(s, Vec::new());
        }
        match version {
            StateVersion::Slashing => CommitteeState::Slashing(base),
            StateVersion::SyncPool => {
                let sync_pool = (0..active_shards).map(|s| (s, Vec::new())).collect();
                CommitteeState::SyncPool(CommitteeStateV3 {
                    base,
                    sync_pool,
                    terms: BTreeMap::new(),
                })
            }
        }
    }

    /// Genesis state. Genesis validators auto-stake and are termed at `beacon_height`.
    pub fn genesis(
        version: StateVersion,
        active_shards: u8,
        committees: &GenesisCommittees,
        beacon_height: u64,
    ) -> Self {
        let mut st = Self::new(version, active_shards);
        {
            let base = st.base_mut();
            base.beacon_committee = committees.beacon_committee.clone();
            for (s, l) in committees.shard_committee.iter() {
                base.shard_committee.insert(*s, l.clone());
            }
            for (s, l) in committees.shard_substitute.iter() {
                base.shard_substitute.insert(*s, l.clone());
            }
        }
        let keys: Vec<String> = st.all_members().iter().map(|(k, _)| k.to_key_string()).collect();
        for ks in keys {
            st.base_mut().auto_stake.insert(ks.clone(), true);
            st.set_term(&ks, beacon_height);
        }
        st
    }

    /// Version tag.
    pub fn version(&self) -> StateVersion {
        match self {
            CommitteeState::Slashing(_) => StateVersion::Slashing,
            CommitteeState::SyncPool(_) => StateVersion::SyncPool,
        }
    }

    /// Shared fields.
    pub fn base(&self) -> &CommitteeStateBase {
        match self {
            CommitteeState::Slashing(b) => b,
            CommitteeState::SyncPool(v) => &v.base,
        }
    }

    /// Shared fields, mutable.
    pub fn base_mut(&mut self) -> &mut CommitteeStateBase {
        match self {
            CommitteeState::Slashing(b) => b,
            CommitteeState::SyncPool(v) => &mut v.base,
        }
    }

    /// Sync pool (empty for versions without one).
    pub fn sync_pool(&self) -> Option<&BTreeMap<ShardId, Vec<CommitteePublicKey>>> {
        match self {
            CommitteeState::Slashing(_) => None,
            CommitteeState::SyncPool(v) => Some(&v.sync_pool),
        }
    }

    /// Sync pool of a shard, mutable. `None` for versions without one.
    pub fn sync_pool_mut(&mut self, shard: ShardId) -> Option<&mut Vec<CommitteePublicKey>> {
        match self {
            CommitteeState::Slashing(_) => None,
            CommitteeState::SyncPool(v) => Some(v.sync_pool.entry(shard).or_default()),
        }
    }

    /// Terms (empty for versions without them).
    pub fn terms(&self) -> Option<&BTreeMap<String, u64>> {
        match self {
            CommitteeState::Slashing(_) => None,
            CommitteeState::SyncPool(v) => Some(&v.terms),
        }
    }

    /// Stamp a term. Returns true when the version keeps terms.
    pub fn set_term(&mut self, key_string: &str, beacon_height: u64) -> bool {
        match self {
            CommitteeState::Slashing(_) => false,
            CommitteeState::SyncPool(v) => {
                v.terms.insert(key_string.to_string(), beacon_height);
                true
            }
        }
    }

    /// Remove a term. Returns true when one existed.
    pub fn remove_term(&mut self, key_string: &str) -> bool {
        match self {
            CommitteeState::Slashing(_) => false,
            CommitteeState::SyncPool(v) => v.terms.remove(key_string).is_some(),
        }
    }

    /// Drop all bookkeeping of a key, terms included.
    pub fn forget(&mut self, key_string: &str) {
        self.base_mut().forget(key_string);
        self.remove_term(key_string);
    }

    /// Overwrite in place from another state.
    pub fn clone_from_state(&mut self, source: &CommitteeState) {
        self.clone_from(source);
    }

    /// Every list entry with its membership, in deterministic order.
    pub fn all_members(&self) -> Vec<(&CommitteePublicKey, Membership)> {
        let mut out = Vec::new();
        self.base().push_lists(&mut out);
        if let Some(sp) = self.sync_pool() {
            for (s, l) in sp.iter() {
                out.extend(l.iter().map(|k| (k, Membership::SyncPool(*s))));
            }
        }
        out
    }

    /// Key strings of every committee member, substitute, syncing validator and candidate.
    pub fn all_validator_candidate_keys(&self) -> BTreeSet<String> {
        self.all_members()
            .into_iter()
            .map(|(k, _)| k.to_key_string())
            .collect()
    }

    /// Where `key` sits, if anywhere.
    pub fn membership(&self, key: &CommitteePublicKey) -> Option<Membership> {
        self.all_members()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| m)
    }

    /// Pending validators per active shard (substitutes plus syncing).
    pub fn pending_counts(&self, active_shards: u8) -> BTreeMap<ShardId, usize> {
        let base = self.base();
        (0..active_shards)
            .map(|s| {
                let sub = base.shard_substitute.get(&s).map_or(0, Vec::len);
                let sync = self
                    .sync_pool()
                    .and_then(|sp| sp.get(&s))
                    .map_or(0, Vec::len);
                (s, sub + sync)
            })
            .collect()
    }

    /// Check membership disjointness and auto-stake coverage.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for (k, m) in self.all_members() {
            let ks = k.to_key_string();
            if !seen.insert(ks.clone()) {
                return Err(format!("key {ks} appears twice (last in {m:?})"));
            }
            let needs_flag = matches!(
                m,
                Membership::ShardCommittee(_) | Membership::ShardSubstitute(_) | Membership::SyncPool(_)
            );
            if needs_flag && !self.base().auto_stake.contains_key(&ks) {
                return Err(format!("key {ks} in {m:?} has no auto-stake entry"));
            }
        }
        Ok(())
    }
}
