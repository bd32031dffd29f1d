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

//! Committee state store.
//!
//! Holds the canonical beacon view behind one read-write lock. Producers and
//! validators work on snapshots; only `commit` and `revert` take the write lock.

use crate::core::committee::state::CommitteeState;
use crate::core::types::{ShardId, H256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Lock poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Poisoned,
    /// Commit requested with nothing staged.
    #[error("no staged view")]
    NothingStaged,
    /// Staged view has a different hash.
    #[error("staged view is {staged}, commit asked for {requested}")]
    HashMismatch {
        /// Hash of the staged view.
        staged: H256,
        /// Hash passed to commit.
        requested: H256,
    },
    /// Staged view does not extend the canonical tip.
    #[error("staged view extends {parent}, canonical tip is {tip}")]
    StaleParent {
        /// Parent the view was built on.
        parent: H256,
        /// Current canonical hash.
        tip: H256,
    },
    /// No retained view with that hash.
    #[error("unknown beacon view {0}")]
    UnknownHash(H256),
}

/// Beacon chain view at one height: the committee state plus the chain
/// metadata the producer needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconView {
    /// Height of the block this view follows.
    pub beacon_height: u64,
    /// Hash of that block.
    pub beacon_hash: H256,
    /// Epoch of that block.
    pub epoch: u64,
    /// Best shard block hash per shard.
    pub best_shard_hash: BTreeMap<ShardId, H256>,
    /// Best shard block height per shard included so far.
    pub best_shard_height: BTreeMap<ShardId, u64>,
    /// Whether the current epoch already has its random number.
    pub is_get_random_number: bool,
    /// Current epoch random number.
    pub current_random_number: i64,
    /// Active shard count.
    pub active_shards: u8,
    /// Committee state.
    pub committee: CommitteeState,
    /// Block timestamp.
    pub timestamp: i64,
}

impl BeaconView {
    /// View at the genesis block.
    pub fn genesis(committee: CommitteeState, active_shards: u8, genesis_hash: H256, timestamp: i64) -> Self {
        Self {
            beacon_height: 1,
            beacon_hash: genesis_hash,
            epoch: 1,
            best_shard_hash: BTreeMap::new(),
            best_shard_height: (0..active_shards).map(|s| (s, 0)).collect(),
            is_get_random_number: false,
            current_random_number: 0,
            active_shards,
            committee,
            timestamp,
        }
    }
}

struct Staged {
    parent: H256,
    view: BeaconView,
}

struct StoreInner {
    canonical: BeaconView,
    staged: Option<Staged>,
    history: VecDeque<BeaconView>,
}

/// Canonical beacon view with bounded history.
pub struct CommitteeStore {
    inner: RwLock<StoreInner>,
    max_history: usize,
}

impl CommitteeStore {
    /// Store rooted at `genesis`, retaining up to `max_history` earlier views.
    pub fn new(genesis: BeaconView, max_history: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                canonical: genesis,
                staged: None,
                history: VecDeque::new(),
            }),
            max_history,
        }
    }

    /// Deep copy of the canonical view.
    pub fn snapshot(&self) -> Result<BeaconView, StoreError> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(g.canonical.clone())
    }

    /// Canonical height and hash.
    pub fn tip(&self) -> Result<(u64, H256), StoreError> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok((g.canonical.beacon_height, g.canonical.beacon_hash))
    }

    /// Stage a view built on `parent`. Replaces any earlier staged view.
    pub fn stage(&self, parent: H256, view: BeaconView) -> Result<(), StoreError> {
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        g.staged = Some(Staged { parent, view });
        Ok(())
    }

    /// Drop the staged view, if any.
    pub fn abort_uncommitted(&self) -> Result<(), StoreError> {
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        g.staged = None;
        Ok(())
    }

    /// Promote the staged view with hash `hash` to canonical.
    pub fn commit(&self, hash: H256) -> Result<(), StoreError> {
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let staged = g.staged.take().ok_or(StoreError::NothingStaged)?;
        if staged.view.beacon_hash != hash {
            let staged_hash = staged.view.beacon_hash;
            g.staged = Some(staged);
            return Err(StoreError::HashMismatch {
                staged: staged_hash,
                requested: hash,
            });
        }
        if staged.parent != g.canonical.beacon_hash {
            return Err(StoreError::StaleParent {
                parent: staged.parent,
                tip: g.canonical.beacon_hash,
            });
        }
        let previous = std::mem::replace(&mut g.canonical, staged.view);
        if self.max_history > 0 {
            g.history.push_back(previous);
            while g.history.len() > self.max_history {
                g.history.pop_front();
            }
        }
        Ok(())
    }

    /// Make the retained view `hash` canonical again, discarding later views.
    /// A staged view is kept; its commit then fails on the moved tip.
    pub fn revert(&self, hash: H256) -> Result<(), StoreError> {
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if g.canonical.beacon_hash == hash {
            return Ok(());
        }
        let pos = g
            .history
            .iter()
            .position(|v| v.beacon_hash == hash)
            .ok_or(StoreError::UnknownHash(hash))?;
        g.history.truncate(pos + 1);
        if let Some(view) = g.history.pop_back() {
            g.canonical = view;
        }
        Ok(())
    }

    /// Copy of the canonical or a retained view.
    pub fn get(&self, hash: H256) -> Result<Option<BeaconView>, StoreError> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        if g.canonical.beacon_hash == hash {
            return Ok(Some(g.canonical.clone()));
        }
        Ok(g.history.iter().find(|v| v.beacon_hash == hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StateVersion;
    use crate::core::types::sha256;

    fn view(height: u64) -> BeaconView {
        let mut v = BeaconView::genesis(CommitteeState::new(StateVersion::SyncPool, 2), 2, sha256(b"g"), 0);
        v.beacon_height = height;
        v.beacon_hash = sha256(&height.to_be_bytes());
        v
    }

    #[test]
    fn commit_requires_matching_hash_and_parent() {
        let g = view(1);
        let store = CommitteeStore::new(g.clone(), 4);
        assert_eq!(store.commit(g.beacon_hash), Err(StoreError::NothingStaged));

        let v2 = view(2);
        store.stage(g.beacon_hash, v2.clone()).unwrap();
        assert!(matches!(store.commit(sha256(b"x")), Err(StoreError::HashMismatch { .. })));
        store.commit(v2.beacon_hash).unwrap();
        assert_eq!(store.tip().unwrap(), (2, v2.beacon_hash));

        // built on genesis, but the tip moved
        store.stage(g.beacon_hash, view(3)).unwrap();
        assert!(matches!(
            store.commit(view(3).beacon_hash),
            Err(StoreError::StaleParent { .. })
        ));
    }

    #[test]
    fn staged_view_goes_stale_after_revert() {
        let g = view(1);
        let store = CommitteeStore::new(g.clone(), 4);
        store.stage(g.beacon_hash, view(2)).unwrap();
        store.commit(view(2).beacon_hash).unwrap();

        store.stage(view(2).beacon_hash, view(3)).unwrap();
        store.revert(g.beacon_hash).unwrap();
        assert_eq!(
            store.commit(view(3).beacon_hash),
            Err(StoreError::StaleParent {
                parent: view(2).beacon_hash,
                tip: g.beacon_hash,
            })
        );
        assert_eq!(store.tip().unwrap(), (1, g.beacon_hash));
    }

    #[test]
    fn snapshot_is_isolated_from_canonical() {
        let store = CommitteeStore::new(view(1), 4);
        let mut snap = store.snapshot().unwrap();
        snap.committee.base_mut().auto_stake.insert("k".into(), true);
        assert!(store.snapshot().unwrap().committee.base().auto_stake.is_empty());
    }

    #[test]
    fn revert_and_history_bound() {
        let store = CommitteeStore::new(view(1), 2);
        for h in 2..=4u64 {
            let parent = store.tip().unwrap().1;
            store.stage(parent, view(h)).unwrap();
            store.commit(view(h).beacon_hash).unwrap();
        }
        // history keeps views 2 and 3
        assert_eq!(store.get(view(1).beacon_hash).unwrap(), None);
        assert!(store.get(view(2).beacon_hash).unwrap().is_some());

        store.revert(view(2).beacon_hash).unwrap();
        assert_eq!(store.tip().unwrap().0, 2);
        assert_eq!(store.get(view(3).beacon_hash).unwrap(), None);
        assert_eq!(
            store.revert(view(4).beacon_hash),
            Err(StoreError::UnknownHash(view(4).beacon_hash))
        );
    }
}
