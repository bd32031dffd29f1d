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

//! Beacon block insertion: replay, verify, persist, commit.
//!
//! Besides recomputing the header roots, a received block must carry exactly
//! the body this node would derive from the parent for everything that does
//! not come from shard blocks: contiguous shard states, their accepted
//! rewards, the random plan, the epoch reward split and the beacon swap.

use crate::core::committee::assign::random_number;
use crate::core::committee::change::CommitteeChange;
use crate::core::committee::engine::{CommitteeEngine, EngineEnv, EngineError};
use crate::core::committee::store::{BeaconView, CommitteeStore, StoreError};
use crate::core::committee::swap_rule::PenaltyMap;
use crate::core::economics::reward::{split_epoch_rewards, RewardAccumulator, RewardError};
use crate::core::instruction::{
    AcceptedRewardInstruction, AssignInstruction, DecodeOptions, Instruction, InstructionError,
    ReturnStakeInstruction, SwapInstruction, SwapTarget,
};
use crate::core::producer::beacon::{derive_view, next_epoch, random_due, BeaconBlock, HeaderRoots};
use crate::core::producer::pool::{PoolError, ShardToBeaconPool};
use crate::core::producer::shard_state::ShardState;
use crate::core::state::roots::RootHashError;
use crate::core::state::stake_store::{StakeInfo, StakeInfoWriter, StakeStoreError};
use crate::core::types::{CodecError, CommitteePublicKey, ShardId, H256};
use crate::monitoring::metrics::Metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Span};

/// Insertion errors. The canonical view and the stake-info store are
/// untouched when any is returned.
#[derive(Debug, Error)]
pub enum InsertError {
    /// Block height does not follow the tip.
    #[error("block height {got}, expected {expected}")]
    Height {
        /// Next height.
        expected: u64,
        /// Block height.
        got: u64,
    },
    /// Block does not extend the tip.
    #[error("block parent {got}, tip is {expected}")]
    Parent {
        /// Tip hash.
        expected: H256,
        /// Block parent.
        got: H256,
    },
    /// Included shard states skip, repeat or fork from the best shard block.
    #[error("shard {shard} state at height {height} does not extend the best shard block")]
    ShardState {
        /// Shard.
        shard: ShardId,
        /// Offending shard height.
        height: u64,
    },
    /// An instruction does not decode.
    #[error("instruction {index}: {source}")]
    Decode {
        /// Position in the block.
        index: usize,
        /// Decode failure.
        source: InstructionError,
    },
    /// Random instruction is wrong or misplaced.
    #[error("bad random instruction")]
    Random,
    /// Assign instructions differ from the random plan or do not follow it.
    #[error("assign instructions differ from the random plan")]
    Assign,
    /// Accepted rewards differ from the included shard states.
    #[error("accepted rewards differ from the included shard blocks")]
    AcceptedReward,
    /// Epoch reward split differs from the local accumulator.
    #[error("epoch rewards differ from the local fee totals")]
    EpochReward,
    /// Beacon swap outside an epoch end, or not the one the swap rule yields.
    #[error("unexpected beacon swap")]
    BeaconSwap,
    /// Returned stake differs from the replay.
    #[error("return stake mismatch")]
    ReturnStake,
    /// A header root differs from the replay.
    #[error("{0} root mismatch")]
    Root(&'static str),
    /// Transition failure.
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    /// Root computation failure.
    #[error("roots: {0}")]
    Roots(#[from] RootHashError),
    /// Header encoding failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Store failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Stake-info persistence failure.
    #[error("stake info: {0}")]
    StakeInfo(#[from] StakeStoreError),
    /// Pool failure.
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    /// Reward accumulator failure.
    #[error("reward: {0}")]
    Reward(#[from] RewardError),
}

fn compare_roots(expected: &HeaderRoots, got: &HeaderRoots) -> Result<(), InsertError> {
    let (e, g) = (&expected.committee, &got.committee);
    let checks = [
        ("beacon committee", e.beacon_committee_and_validator_root == g.beacon_committee_and_validator_root),
        ("beacon candidate", e.beacon_candidate_root == g.beacon_candidate_root),
        ("shard candidate", e.shard_candidate_root == g.shard_candidate_root),
        ("shard committee", e.shard_committee_and_validator_root == g.shard_committee_and_validator_root),
        ("sync pool", e.shard_sync_validator_root == g.shard_sync_validator_root),
        ("auto staking", e.auto_staking_root == g.auto_staking_root),
        ("shard state", expected.shard_state_hash == got.shard_state_hash),
        ("instruction", expected.instruction_hash == got.instruction_hash),
        ("instruction merkle", expected.instruction_merkle_root == got.instruction_merkle_root),
    ];
    match checks.iter().find(|(_, ok)| !ok) {
        Some((name, _)) => Err(InsertError::Root(*name)),
        None => Ok(()),
    }
}

/// Each shard's states start right after the parent's best shard block,
/// have consecutive heights and chain by hash.
fn check_shard_states(
    parent: &BeaconView,
    shard_states: &BTreeMap<ShardId, Vec<ShardState>>,
) -> Result<(), InsertError> {
    for (s, states) in shard_states.iter() {
        let mut height = parent.best_shard_height.get(s).copied().unwrap_or(0);
        let mut prev = parent.best_shard_hash.get(s).copied();
        if *s >= parent.active_shards || states.is_empty() {
            return Err(InsertError::ShardState {
                shard: *s,
                height: height + 1,
            });
        }
        for st in states.iter() {
            if st.height != height + 1 || prev.is_some_and(|p| p != st.prev_hash) {
                return Err(InsertError::ShardState {
                    shard: *s,
                    height: st.height,
                });
            }
            height = st.height;
            prev = Some(st.hash);
        }
    }
    Ok(())
}

fn accepted_rewards(shard_states: &BTreeMap<ShardId, Vec<ShardState>>) -> Vec<AcceptedRewardInstruction> {
    shard_states
        .iter()
        .flat_map(|(s, states)| {
            states.iter().map(move |st| AcceptedRewardInstruction {
                shard_id: *s,
                shard_height: st.height,
                total_fee: st.total_fee,
            })
        })
        .collect()
}

fn new_stake_infos(view: &BeaconView, change: &CommitteeChange) -> Vec<StakeInfo> {
    let base = view.committee.base();
    change
        .shard_candidate_added
        .iter()
        .chain(change.beacon_candidate_added.iter())
        .filter_map(|k| {
            let ks = k.to_key_string();
            Some(StakeInfo {
                tx_stake: base.staking_tx.get(&ks)?.clone(),
                reward_receiver: base.reward_receiver.get(&ks).cloned().unwrap_or_default(),
                auto_stake: base.auto_stake.get(&ks).copied().unwrap_or(false),
                beacon_height: view.beacon_height,
                committee_key: ks,
            })
        })
        .collect()
}

/// Stake-info records to put back if the block does not commit.
#[derive(Debug, Default)]
struct StakeUndo {
    restore: Vec<StakeInfo>,
    delete: Vec<String>,
}

/// Validates and commits beacon blocks.
pub struct BlockInserter {
    engine: Arc<CommitteeEngine>,
    store: Arc<CommitteeStore>,
    stake_store: Arc<dyn StakeInfoWriter>,
    pool: Arc<dyn ShardToBeaconPool>,
    rewards: Arc<dyn RewardAccumulator>,
    metrics: Arc<Metrics>,
    span: Span,
}

impl BlockInserter {
    /// Inserter over the given collaborators.
    pub fn new(
        engine: Arc<CommitteeEngine>,
        store: Arc<CommitteeStore>,
        stake_store: Arc<dyn StakeInfoWriter>,
        pool: Arc<dyn ShardToBeaconPool>,
        rewards: Arc<dyn RewardAccumulator>,
        metrics: Arc<Metrics>,
        span: Span,
    ) -> Self {
        Self {
            engine,
            store,
            stake_store,
            pool,
            rewards,
            metrics,
            span,
        }
    }

    /// Replay `block` on the canonical view and commit it.
    pub fn insert(&self, block: &BeaconBlock) -> Result<CommitteeChange, InsertError> {
        let _g = self.span.enter();
        let parent = self.store.snapshot()?;
        let hash = block.header.hash()?;
        let (view, change) = self.verify(&parent, block, hash).map_err(|e| {
            warn!(height = block.header.height, error = %e, "beacon block rejected");
            e
        })?;

        self.store.stage(parent.beacon_hash, view.clone())?;
        let removed: Vec<String> = change
            .removed_staker
            .iter()
            .map(CommitteePublicKey::to_key_string)
            .collect();
        let undo = match self.write_stake_infos(&removed, &new_stake_infos(&view, &change)) {
            Ok(undo) => undo,
            Err(e) => {
                self.store.abort_uncommitted()?;
                return Err(e);
            }
        };
        if let Err(e) = self.store.commit(hash) {
            self.store.abort_uncommitted()?;
            self.undo_stake_infos(&undo)?;
            return Err(e.into());
        }

        self.after_commit(block, &view);
        self.metrics.blocks_inserted_total.inc();
        self.metrics.beacon_height.set(view.beacon_height as i64);
        self.metrics.stake_returned_total.inc_by(removed.len() as u64);
        info!(
            height = view.beacon_height,
            epoch = view.epoch,
            hash = %hash,
            churn = change.committee_churn(),
            "beacon block inserted"
        );
        Ok(change)
    }

    fn write_stake_infos(&self, removed: &[String], added: &[StakeInfo]) -> Result<StakeUndo, InsertError> {
        let mut undo = StakeUndo::default();
        for ks in removed.iter() {
            if let Some(info) = self.stake_store.stake_info(ks)? {
                undo.restore.push(info);
            }
        }
        for info in added.iter() {
            match self.stake_store.stake_info(&info.committee_key)? {
                Some(old) => undo.restore.push(old),
                None => undo.delete.push(info.committee_key.clone()),
            }
        }
        let written = self
            .stake_store
            .delete_all(removed)
            .and_then(|()| self.stake_store.put_all(added));
        if let Err(e) = written {
            self.undo_stake_infos(&undo)?;
            return Err(e.into());
        }
        Ok(undo)
    }

    fn undo_stake_infos(&self, undo: &StakeUndo) -> Result<(), StakeStoreError> {
        self.stake_store.delete_all(&undo.delete)?;
        self.stake_store.put_all(&undo.restore)
    }

    /// Pool pruning and fee bookkeeping for a committed block. Failures are
    /// logged and counted; the block stays canonical.
    fn after_commit(&self, block: &BeaconBlock, view: &BeaconView) {
        for (s, states) in block.body.shard_states.iter() {
            if let Some(last) = states.last() {
                if let Err(e) = self.pool.prune(*s, last.height) {
                    error!(shard = *s, height = last.height, error = %e, "shard pool prune failed");
                    self.metrics.insert_followup_failures_total.inc();
                }
            }
            for st in states.iter() {
                if let Err(e) = self.rewards.record_fee(view.epoch, *s, st.total_fee) {
                    error!(shard = *s, height = st.height, error = %e, "fee not recorded");
                    self.metrics.insert_followup_failures_total.inc();
                }
            }
        }
    }

    fn verify(
        &self,
        parent: &BeaconView,
        block: &BeaconBlock,
        hash: H256,
    ) -> Result<(BeaconView, CommitteeChange), InsertError> {
        let header = &block.header;
        let height = parent.beacon_height + 1;
        if header.height != height {
            return Err(InsertError::Height {
                expected: height,
                got: header.height,
            });
        }
        if header.prev_hash != parent.beacon_hash {
            return Err(InsertError::Parent {
                expected: parent.beacon_hash,
                got: header.prev_hash,
            });
        }
        check_shard_states(parent, &block.body.shard_states)?;

        let params = self.engine.params_at(height);
        let epoch = next_epoch(params, parent.epoch, height);
        let opts = DecodeOptions {
            strict_stake_field_counts: params.strict_stake_field_counts,
        };
        let mut insts = block
            .body
            .instructions
            .iter()
            .enumerate()
            .map(|(index, w)| Instruction::decode(w, opts).map_err(|source| InsertError::Decode { index, source }))
            .collect::<Result<Vec<_>, _>>()?;
        let claimed = match insts.pop() {
            Some(Instruction::ReturnStake(r)) => r,
            Some(other) => {
                insts.push(other);
                ReturnStakeInstruction::default()
            }
            None => ReturnStakeInstruction::default(),
        };
        if insts.iter().any(|i| matches!(i, Instruction::ReturnStake(_))) {
            return Err(InsertError::ReturnStake);
        }

        let due = random_due(params, parent, height);
        let expected_nonce = random_number(&parent.beacon_hash, &parent.best_shard_hash, parent.active_shards);
        let mut randoms = insts.iter().filter_map(|i| match i {
            Instruction::Random(r) => Some(r),
            _ => None,
        });
        match (randoms.next(), randoms.next()) {
            (None, None) if !due => {}
            (Some(r), None) if due && r.nonce == expected_nonce && r.height == height => {}
            _ => return Err(InsertError::Random),
        }
        self.check_assigns(parent, height, epoch, &insts)?;

        let accepted: Vec<AcceptedRewardInstruction> = insts
            .iter()
            .filter_map(|i| match i {
                Instruction::AcceptedReward(r) => Some(*r),
                _ => None,
            })
            .collect();
        if accepted != accepted_rewards(&block.body.shard_states) {
            return Err(InsertError::AcceptedReward);
        }

        let epoch_rewards: Vec<_> = insts
            .iter()
            .filter_map(|i| match i {
                Instruction::RewardByEpoch(r) => Some(*r),
                _ => None,
            })
            .collect();
        let expected_rewards = if params.is_epoch_start(height) && epoch > 1 {
            let fees = self.rewards.epoch_fees(epoch - 1)?;
            split_epoch_rewards(epoch - 1, &fees, params, parent.active_shards)
        } else {
            Vec::new()
        };
        if epoch_rewards != expected_rewards {
            return Err(InsertError::EpochReward);
        }

        let beacon_swaps: Vec<SwapInstruction> = insts
            .iter()
            .filter_map(|i| match i {
                Instruction::Swap(s) if s.target == Some(SwapTarget::Beacon) => Some(s.clone()),
                _ => None,
            })
            .collect();
        let expected_swap: Vec<SwapInstruction> = if params.is_epoch_end(height) {
            self.engine
                .generate_swap(&parent.committee, SwapTarget::Beacon, &PenaltyMap::new(), height)
                .instruction
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };
        if beacon_swaps != expected_swap {
            return Err(InsertError::BeaconSwap);
        }

        let derived = derive_view(
            &self.engine,
            parent,
            height,
            header.timestamp,
            &block.body.shard_states,
            &insts,
        )?;
        if derived.return_stake != claimed {
            return Err(InsertError::ReturnStake);
        }
        let roots = HeaderRoots::compute(&derived.view.committee, &block.body.shard_states, &block.body.instructions)?;
        compare_roots(&roots, &header.roots)?;
        if header.epoch != derived.view.epoch {
            return Err(InsertError::Root("epoch"));
        }

        let mut view = derived.view;
        view.beacon_hash = hash;
        Ok((view, derived.change))
    }

    /// Assign instructions must directly follow the random instruction and
    /// equal the plan its nonce yields on the parent state.
    fn check_assigns(
        &self,
        parent: &BeaconView,
        height: u64,
        epoch: u64,
        insts: &[Instruction],
    ) -> Result<(), InsertError> {
        let total = insts.iter().filter(|i| matches!(i, Instruction::Assign(_))).count();
        let random = insts.iter().enumerate().find_map(|(pos, i)| match i {
            Instruction::Random(r) => Some((pos, r.nonce)),
            _ => None,
        });
        let Some((pos, nonce)) = random else {
            return if total == 0 { Ok(()) } else { Err(InsertError::Assign) };
        };
        let following: Vec<AssignInstruction> = insts[pos + 1..]
            .iter()
            .map_while(|i| match i {
                Instruction::Assign(a) => Some(a.clone()),
                _ => None,
            })
            .collect();
        let env = EngineEnv {
            beacon_height: height,
            epoch,
            active_shards: parent.active_shards,
            random_number: parent.current_random_number,
        };
        let expected = self.engine.generate_assign(&parent.committee, nonce, &env);
        if following.len() != total || following != expected {
            return Err(InsertError::Assign);
        }
        Ok(())
    }
}
