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

//! Committee change diff produced by one state transition.

use crate::core::types::{CommitteePublicKey, ShardId};
use std::collections::BTreeMap;

type ShardLists = BTreeMap<ShardId, Vec<CommitteePublicKey>>;

/// Added/removed entries of one transition. Derived, never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitteeChange {
    /// Beacon committee additions.
    pub beacon_committee_added: Vec<CommitteePublicKey>,
    /// Beacon committee removals.
    pub beacon_committee_removed: Vec<CommitteePublicKey>,
    /// Beacon substitute additions.
    pub beacon_substitute_added: Vec<CommitteePublicKey>,
    /// Beacon substitute removals.
    pub beacon_substitute_removed: Vec<CommitteePublicKey>,
    /// Beacon candidate additions.
    pub beacon_candidate_added: Vec<CommitteePublicKey>,
    /// Beacon candidate removals.
    pub beacon_candidate_removed: Vec<CommitteePublicKey>,
    /// Shard candidate additions.
    pub shard_candidate_added: Vec<CommitteePublicKey>,
    /// Shard candidate removals.
    pub shard_candidate_removed: Vec<CommitteePublicKey>,
    /// Shard committee additions.
    pub shard_committee_added: ShardLists,
    /// Shard committee removals.
    pub shard_committee_removed: ShardLists,
    /// Shard substitute additions.
    pub shard_substitute_added: ShardLists,
    /// Shard substitute removals.
    pub shard_substitute_removed: ShardLists,
    /// Sync pool additions.
    pub sync_pool_added: ShardLists,
    /// Sync pool removals.
    pub sync_pool_removed: ShardLists,
    /// Keys whose term was stamped.
    pub terms_added: Vec<CommitteePublicKey>,
    /// Keys whose term was dropped.
    pub terms_removed: Vec<CommitteePublicKey>,
    /// Keys removed from all bookkeeping.
    pub removed_staker: Vec<CommitteePublicKey>,
    /// Keys whose auto-stake flag was cleared.
    pub stop_auto_stake: Vec<CommitteePublicKey>,
}

fn push(m: &mut ShardLists, shard: ShardId, key: &CommitteePublicKey) {
    m.entry(shard).or_default().push(key.clone());
}

impl CommitteeChange {
    /// Empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a shard committee addition.
    pub fn add_shard_committee(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.shard_committee_added, shard, key);
    }

    /// Record a shard committee removal.
    pub fn remove_shard_committee(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.shard_committee_removed, shard, key);
    }

    /// Record a shard substitute addition.
    pub fn add_shard_substitute(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.shard_substitute_added, shard, key);
    }

    /// Record a shard substitute removal.
    pub fn remove_shard_substitute(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.shard_substitute_removed, shard, key);
    }

    /// Record a sync pool addition.
    pub fn add_sync_pool(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.sync_pool_added, shard, key);
    }

    /// Record a sync pool removal.
    pub fn remove_sync_pool(&mut self, shard: ShardId, key: &CommitteePublicKey) {
        push(&mut self.sync_pool_removed, shard, key);
    }

    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Number of keys whose committee seat changed (added or removed).
    pub fn committee_churn(&self) -> usize {
        let shard: usize = self
            .shard_committee_added
            .values()
            .chain(self.shard_committee_removed.values())
            .map(Vec::len)
            .sum();
        shard + self.beacon_committee_added.len() + self.beacon_committee_removed.len()
    }
}
