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

//! Epoch reward split.
//!
//! Fees collected on each shard during an epoch are split between custodians,
//! the beacon committee and the shard committee at the first block of the next
//! epoch.

use crate::core::config::ChainParams;
use crate::core::instruction::RewardByEpochInstruction;
use crate::core::types::ShardId;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Reward errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewardError {
    /// Accumulator lock poisoned.
    #[error("reward accumulator poisoned")]
    Poisoned,
    /// Accumulator backend failure.
    #[error("reward accumulator: {0}")]
    Backend(String),
}

/// Fees and custodian collateral of one epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochFees {
    /// Collected fees per shard.
    pub shard_fees: BTreeMap<ShardId, u64>,
    /// Custodian collateral locked during the epoch.
    pub locked_collateral: u64,
}

/// Epoch-scoped fee totals.
pub trait RewardAccumulator: Send + Sync {
    /// Totals of `epoch`.
    fn epoch_fees(&self, epoch: u64) -> Result<EpochFees, RewardError>;
    /// Add a shard block's fee to `epoch`.
    fn record_fee(&self, epoch: u64, shard_id: ShardId, fee: u64) -> Result<(), RewardError>;
    /// Set the collateral locked during `epoch`.
    fn record_collateral(&self, epoch: u64, locked: u64) -> Result<(), RewardError>;
}

/// In-memory accumulator.
#[derive(Debug, Default)]
pub struct MemoryRewardAccumulator {
    epochs: RwLock<BTreeMap<u64, EpochFees>>,
}

impl RewardAccumulator for MemoryRewardAccumulator {
    fn epoch_fees(&self, epoch: u64) -> Result<EpochFees, RewardError> {
        let g = self.epochs.read().map_err(|_| RewardError::Poisoned)?;
        Ok(g.get(&epoch).cloned().unwrap_or_default())
    }

    fn record_fee(&self, epoch: u64, shard_id: ShardId, fee: u64) -> Result<(), RewardError> {
        let mut g = self.epochs.write().map_err(|_| RewardError::Poisoned)?;
        let total = g.entry(epoch).or_default().shard_fees.entry(shard_id).or_insert(0);
        *total = total.saturating_add(fee);
        Ok(())
    }

    fn record_collateral(&self, epoch: u64, locked: u64) -> Result<(), RewardError> {
        let mut g = self.epochs.write().map_err(|_| RewardError::Poisoned)?;
        g.entry(epoch).or_default().locked_collateral = locked;
        Ok(())
    }
}

/// Custodian percentage for the locked collateral.
///
/// No collateral pays nothing; collateral below the minimum pays the minimum
/// percentage.
pub fn custodian_percent(locked_collateral: u64, params: &ChainParams) -> u64 {
    if locked_collateral == 0 {
        0
    } else if locked_collateral < params.min_lock_collateral_in_epoch {
        params.min_percent_custodian_rewards
    } else {
        params.max_percent_custodian_rewards
    }
}

fn share(total: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    let v = (total as u128).saturating_mul(num as u128) / den as u128;
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Reward instructions for `epoch`, one per active shard with collected fees.
///
/// After the custodian cut, the beacon committee takes `2 / (active_shards + 2)`
/// and the shard committee keeps the rest.
pub fn split_epoch_rewards(
    epoch: u64,
    fees: &EpochFees,
    params: &ChainParams,
    active_shards: u8,
) -> Vec<RewardByEpochInstruction> {
    let pct = custodian_percent(fees.locked_collateral, params).min(100);
    (0..active_shards)
        .filter_map(|s| {
            let total = fees.shard_fees.get(&s).copied().unwrap_or(0);
            if total == 0 {
                return None;
            }
            let custodian_reward = share(total, pct, 100);
            let remaining = total - custodian_reward;
            let beacon_reward = share(remaining, 2, u64::from(active_shards) + 2);
            Some(RewardByEpochInstruction {
                epoch,
                shard_id: s,
                shard_reward: remaining - beacon_reward,
                beacon_reward,
                custodian_reward,
            })
        })
        .collect()
}
