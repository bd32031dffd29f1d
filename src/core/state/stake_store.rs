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

//! Persistent stake-info records using sled, with a deterministic Merkle root
//! and inclusion proofs over the whole record set.

use crate::core::state::merkle::{length_prefixed, merkle_proof, merkle_root, MerkleProof};
use crate::core::types::{decode_canonical_limited, encode_canonical, H256};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

const KEY_PREFIX: &[u8] = b"stake/";
const MAX_RECORD_BYTES: usize = 4096;

/// Stake store errors.
#[derive(Debug, Error)]
pub enum StakeStoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("tx conflict")]
    TxConflict,
    #[error("corrupt record for {0}")]
    Corrupt(String),
    #[error("lock poisoned")]
    Poisoned,
}

/// What the chain remembers about a staker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    /// Committee key string.
    pub committee_key: String,
    /// Staking transaction.
    pub tx_stake: String,
    /// Reward payment address.
    pub reward_receiver: String,
    /// Auto-stake flag at stake time.
    pub auto_stake: bool,
    /// Beacon height of the block that admitted the stake.
    pub beacon_height: u64,
}

/// Read access to stake info, as needed by the committee engine.
pub trait StakeInfoReader: Send + Sync {
    /// Look up the record of a committee key string.
    fn stake_info(&self, committee_key: &str) -> Result<Option<StakeInfo>, StakeStoreError>;
}

/// Write access used when a block is inserted.
pub trait StakeInfoWriter: StakeInfoReader {
    /// Persist records atomically.
    fn put_all(&self, infos: &[StakeInfo]) -> Result<(), StakeStoreError>;
    /// Delete records atomically.
    fn delete_all(&self, committee_keys: &[String]) -> Result<(), StakeStoreError>;
}

fn record_key(committee_key: &str) -> Vec<u8> {
    let mut k = KEY_PREFIX.to_vec();
    k.extend_from_slice(committee_key.as_bytes());
    k
}

/// sled-backed stake-info store.
#[derive(Clone)]
pub struct StakeStore {
    db: sled::Db,
}

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Del(Vec<u8>),
}

impl StakeStore {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, StakeStoreError> {
        let db = sled::open(path).map_err(|_| StakeStoreError::DbOpen)?;
        Ok(Self { db })
    }

    fn commit_atomic(&self, ops: Vec<Op>) -> Result<(), StakeStoreError> {
        let res = self.db.transaction(|t| {
            for op in ops.iter() {
                match op {
                    Op::Put(key, value) => {
                        t.insert(key.as_slice(), value.as_slice()).map_err(|_| {
                            ConflictableTransactionError::Abort(StakeStoreError::DbIo)
                        })?;
                    }
                    Op::Del(key) => {
                        t.remove(key.as_slice()).map_err(|_| {
                            ConflictableTransactionError::Abort(StakeStoreError::DbIo)
                        })?;
                    }
                }
            }
            Ok(())
        });
        match res {
            Ok(()) => {
                self.db.flush().map_err(|_| StakeStoreError::DbIo)?;
                Ok(())
            }
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(_)) => Err(StakeStoreError::DbIo),
        }
    }

    fn sorted_pairs(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StakeStoreError> {
        let mut pairs = Vec::new();
        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (k, v) = item.map_err(|_| StakeStoreError::DbIo)?;
            pairs.push((k.to_vec(), v.to_vec()));
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    /// Deterministic Merkle root over all records.
    pub fn root(&self) -> Result<H256, StakeStoreError> {
        let leaves: Vec<Vec<u8>> = self
            .sorted_pairs()?
            .iter()
            .map(|(k, v)| length_prefixed(&[k, v]))
            .collect();
        Ok(merkle_root(&leaves))
    }

    /// Inclusion proof of a record, with the root it proves against.
    pub fn prove(&self, committee_key: &str) -> Result<Option<(StakeInfo, H256, MerkleProof)>, StakeStoreError> {
        let pairs = self.sorted_pairs()?;
        let key = record_key(committee_key);
        let Ok(idx) = pairs.binary_search_by(|p| p.0.as_slice().cmp(key.as_slice())) else {
            return Ok(None);
        };
        let leaves: Vec<Vec<u8>> = pairs.iter().map(|(k, v)| length_prefixed(&[k, v])).collect();
        let info: StakeInfo = decode_canonical_limited(&pairs[idx].1, MAX_RECORD_BYTES)
            .map_err(|_| StakeStoreError::Corrupt(committee_key.to_string()))?;
        Ok(merkle_proof(&leaves, idx).map(|p| (info, merkle_root(&leaves), p)))
    }
}

impl StakeInfoReader for StakeStore {
    fn stake_info(&self, committee_key: &str) -> Result<Option<StakeInfo>, StakeStoreError> {
        let Some(raw) = self
            .db
            .get(record_key(committee_key))
            .map_err(|_| StakeStoreError::DbIo)?
        else {
            return Ok(None);
        };
        decode_canonical_limited(&raw, MAX_RECORD_BYTES)
            .map(Some)
            .map_err(|_| StakeStoreError::Corrupt(committee_key.to_string()))
    }
}

impl StakeInfoWriter for StakeStore {
    fn put_all(&self, infos: &[StakeInfo]) -> Result<(), StakeStoreError> {
        let mut ops = Vec::with_capacity(infos.len());
        for info in infos.iter() {
            let v = encode_canonical(info)
                .map_err(|_| StakeStoreError::Corrupt(info.committee_key.clone()))?;
            ops.push(Op::Put(record_key(&info.committee_key), v));
        }
        self.commit_atomic(ops)
    }

    fn delete_all(&self, committee_keys: &[String]) -> Result<(), StakeStoreError> {
        self.commit_atomic(committee_keys.iter().map(|k| Op::Del(record_key(k))).collect())
    }
}

/// In-memory stake store for tools and tests.
#[derive(Debug, Default)]
pub struct MemoryStakeStore {
    inner: RwLock<BTreeMap<String, StakeInfo>>,
}

impl StakeInfoReader for MemoryStakeStore {
    fn stake_info(&self, committee_key: &str) -> Result<Option<StakeInfo>, StakeStoreError> {
        let g = self.inner.read().map_err(|_| StakeStoreError::Poisoned)?;
        Ok(g.get(committee_key).cloned())
    }
}

impl StakeInfoWriter for MemoryStakeStore {
    fn put_all(&self, infos: &[StakeInfo]) -> Result<(), StakeStoreError> {
        let mut g = self.inner.write().map_err(|_| StakeStoreError::Poisoned)?;
        for info in infos.iter() {
            g.insert(info.committee_key.clone(), info.clone());
        }
        Ok(())
    }

    fn delete_all(&self, committee_keys: &[String]) -> Result<(), StakeStoreError> {
        let mut g = self.inner.write().map_err(|_| StakeStoreError::Poisoned)?;
        for k in committee_keys.iter() {
            g.remove(k);
        }
        Ok(())
    }
}
