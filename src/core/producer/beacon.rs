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

//! Beacon block production.
//!
//! Instruction order inside a block:
//! bridge, accepted reward, shard swaps (by shard), beacon swap, stake,
//! stop-auto-stake, finish-sync, random, assign, epoch reward, return stake.
//! The return-stake instruction is appended after the engine run.

use crate::core::committee::assign::random_number;
use crate::core::committee::change::CommitteeChange;
use crate::core::committee::engine::{CommitteeEngine, EngineEnv, EngineError};
use crate::core::committee::state::CommitteeState;
use crate::core::committee::store::BeaconView;
use crate::core::committee::swap_rule::{penalties_for_replay, PenaltyMap};
use crate::core::config::{ChainParams, StateVersion};
use crate::core::economics::reward::{split_epoch_rewards, RewardAccumulator, RewardError};
use crate::core::instruction::extract::{
    extract_shard_block, filter_stop_auto_stakes, merge_stakes, BridgeRequest, StakerFilter,
};
use crate::core::instruction::{
    encode_all, AcceptedRewardInstruction, BridgeStatus, DecodeOptions, Instruction,
    RandomInstruction, ReturnStakeInstruction, StopAutoStakeInstruction, SwapInstruction,
    SwapTarget, WireInstruction,
};
use crate::core::producer::bridge::BridgeBuilder;
use crate::core::producer::pool::{PoolError, ShardToBeaconPool};
use crate::core::producer::shard_state::ShardState;
use crate::core::state::roots::{
    instruction_hash, instruction_merkle_root, shard_state_hash, CommitteeStateHash, RootHashError,
};
use crate::core::types::{encode_canonical, sha256, CodecError, CommitteePublicKey, ShardId, H256};
use crate::monitoring::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn, Span};

/// Production errors. No partial block is returned with any of them.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Pool failure.
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    /// Reward accumulator failure.
    #[error("reward: {0}")]
    Reward(#[from] RewardError),
    /// Transition failure.
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    /// Root computation failure.
    #[error("roots: {0}")]
    Roots(#[from] RootHashError),
    /// Header encoding failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// Roots a beacon header commits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRoots {
    /// Committee roots of the resulting state.
    pub committee: CommitteeStateHash,
    /// Included shard states.
    pub shard_state_hash: H256,
    /// Plain instruction hash.
    pub instruction_hash: H256,
    /// Instruction Merkle root.
    pub instruction_merkle_root: H256,
}

impl HeaderRoots {
    /// Roots of a block body and its resulting committee state.
    pub fn compute(
        state: &CommitteeState,
        shard_states: &BTreeMap<ShardId, Vec<ShardState>>,
        instructions: &[WireInstruction],
    ) -> Result<Self, RootHashError> {
        Ok(Self {
            committee: CommitteeStateHash::compute(state)?,
            shard_state_hash: shard_state_hash(shard_states)?,
            instruction_hash: instruction_hash(instructions),
            instruction_merkle_root: instruction_merkle_root(instructions),
        })
    }
}

/// Beacon block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconHeader {
    /// Height.
    pub height: u64,
    /// Epoch.
    pub epoch: u64,
    /// Consensus round.
    pub round: u32,
    /// Producer committee key.
    pub producer: CommitteePublicKey,
    /// Parent hash.
    pub prev_hash: H256,
    /// Timestamp (seconds).
    pub timestamp: i64,
    /// Committed roots.
    pub roots: HeaderRoots,
}

impl BeaconHeader {
    /// Block hash: sha256 of the canonical header encoding.
    pub fn hash(&self) -> Result<H256, CodecError> {
        Ok(sha256(&encode_canonical(self)?))
    }
}

/// Beacon block body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BeaconBody {
    /// Shard blocks included, per shard in height order.
    pub shard_states: BTreeMap<ShardId, Vec<ShardState>>,
    /// Instructions in wire form.
    pub instructions: Vec<WireInstruction>,
}

/// Beacon block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconBlock {
    /// Header.
    pub header: BeaconHeader,
    /// Body.
    pub body: BeaconBody,
}

/// Epoch of `height` given the parent's epoch.
pub fn next_epoch(params: &ChainParams, parent_epoch: u64, height: u64) -> u64 {
    if params.is_epoch_start(height) {
        parent_epoch + 1
    } else {
        parent_epoch
    }
}

/// Whether a block at `height` on top of `parent` must carry the random instruction.
pub fn random_due(params: &ChainParams, parent: &BeaconView, height: u64) -> bool {
    let already = parent.is_get_random_number && !params.is_epoch_start(height);
    !already && height % params.epoch_length > params.random_time
}

/// Outcome of applying a block's instructions to its parent view.
#[derive(Clone, Debug)]
pub struct Derived {
    /// View after the block; `beacon_hash` is still the parent's.
    pub view: BeaconView,
    /// Committee diff.
    pub change: CommitteeChange,
    /// Returned stake.
    pub return_stake: ReturnStakeInstruction,
    /// Instructions the engine skipped.
    pub skipped: usize,
}

/// Apply `instructions` for the block at `height` on top of `parent`.
pub fn derive_view(
    engine: &CommitteeEngine,
    parent: &BeaconView,
    height: u64,
    timestamp: i64,
    shard_states: &BTreeMap<ShardId, Vec<ShardState>>,
    instructions: &[Instruction],
) -> Result<Derived, EngineError> {
    let params = engine.params_at(height);
    let epoch = next_epoch(params, parent.epoch, height);
    let env = EngineEnv {
        beacon_height: height,
        epoch,
        active_shards: parent.active_shards,
        random_number: parent.current_random_number,
    };
    let out = engine.apply(&parent.committee, instructions, &env)?;

    let mut view = BeaconView {
        beacon_height: height,
        beacon_hash: parent.beacon_hash,
        epoch,
        best_shard_hash: parent.best_shard_hash.clone(),
        best_shard_height: parent.best_shard_height.clone(),
        is_get_random_number: parent.is_get_random_number && !params.is_epoch_start(height),
        current_random_number: parent.current_random_number,
        active_shards: parent.active_shards,
        committee: out.state,
        timestamp,
    };
    if let Some(r) = out.random_number {
        view.is_get_random_number = true;
        view.current_random_number = r;
    }
    for (s, states) in shard_states.iter() {
        if let Some(last) = states.last() {
            view.best_shard_hash.insert(*s, last.hash);
            view.best_shard_height.insert(*s, last.height);
        }
    }
    Ok(Derived {
        view,
        change: out.change,
        return_stake: out.return_stake,
        skipped: out.skipped,
    })
}

/// A produced block with the view it leads to.
#[derive(Clone, Debug)]
pub struct ProducedBlock {
    /// The block.
    pub block: BeaconBlock,
    /// View after the block, keyed by the block hash.
    pub view: BeaconView,
    /// Committee diff.
    pub change: CommitteeChange,
}

#[derive(Default)]
struct ShardHarvest {
    shard_states: BTreeMap<ShardId, Vec<ShardState>>,
    bridge_requests: Vec<BridgeRequest>,
    accepted: Vec<AcceptedRewardInstruction>,
    swaps: BTreeMap<ShardId, SwapInstruction>,
    stakes: Vec<Instruction>,
    stops: Vec<StopAutoStakeInstruction>,
    finish_syncs: Vec<Instruction>,
    admitted: BTreeSet<String>,
    dropped: usize,
    deferred: usize,
}

/// Builds beacon blocks from the shard-to-beacon pool.
pub struct BeaconProducer {
    engine: Arc<CommitteeEngine>,
    pool: Arc<dyn ShardToBeaconPool>,
    rewards: Arc<dyn RewardAccumulator>,
    bridge: Arc<dyn BridgeBuilder>,
    metrics: Arc<Metrics>,
    span: Span,
}

impl BeaconProducer {
    /// Producer over the given collaborators.
    pub fn new(
        engine: Arc<CommitteeEngine>,
        pool: Arc<dyn ShardToBeaconPool>,
        rewards: Arc<dyn RewardAccumulator>,
        bridge: Arc<dyn BridgeBuilder>,
        metrics: Arc<Metrics>,
        span: Span,
    ) -> Self {
        Self {
            engine,
            pool,
            rewards,
            bridge,
            metrics,
            span,
        }
    }

    /// Build the block following `parent`.
    pub fn produce(
        &self,
        parent: &BeaconView,
        producer: CommitteePublicKey,
        round: u32,
        timestamp: i64,
    ) -> Result<ProducedBlock, ProducerError> {
        let _g = self.span.enter();
        let height = parent.beacon_height + 1;
        self.produce_at(parent, height, producer, round, timestamp)
            .map_err(|e| {
                error!(height, error = %e, "beacon block production aborted");
                e
            })
    }

    fn swap_matches(&self, parent: &BeaconView, swap: &SwapInstruction, height: u64) -> bool {
        let Some(target) = swap.target else {
            return false;
        };
        let substitute = match target {
            SwapTarget::Shard(s) => parent
                .committee
                .base()
                .shard_substitute
                .get(&s)
                .cloned()
                .unwrap_or_default(),
            SwapTarget::Beacon => parent.committee.base().beacon_substitute.clone(),
        };
        let penalties = penalties_for_replay(swap, &substitute);
        let outcome = self
            .engine
            .generate_swap(&parent.committee, target, &penalties, height);
        outcome.instruction.as_ref() == Some(swap)
    }

    fn harvest(&self, parent: &BeaconView, height: u64, opts: DecodeOptions) -> Result<ShardHarvest, ProducerError> {
        let mut h = ShardHarvest::default();
        let mut filter = StakerFilter::new(parent.committee.all_validator_candidate_keys());
        let sync_pool = parent.committee.version() == StateVersion::SyncPool;

        for s in 0..parent.active_shards {
            let after = parent.best_shard_height.get(&s).copied().unwrap_or(0);
            let batch = self.pool.valid_blocks(s, after)?;
            h.deferred += batch.deferred;
            let mut prev = parent.best_shard_hash.get(&s).copied();

            for (i, block) in batch.blocks.iter().enumerate() {
                if prev.is_some_and(|p| p != block.header.prev_hash) {
                    warn!(shard = s, height = block.header.height, "shard block does not extend best block");
                    h.deferred += batch.blocks.len() - i;
                    break;
                }
                prev = Some(block.header.hash);

                let ex = extract_shard_block(block, opts);
                h.dropped += ex.dropped;
                h.shard_states.entry(s).or_default().push(ShardState::from(block));
                h.accepted.push(AcceptedRewardInstruction {
                    shard_id: s,
                    shard_height: block.header.height,
                    total_fee: block.header.total_txs_fee,
                });
                h.bridge_requests.extend(ex.bridge_requests);

                let admitted: Vec<_> = ex.stakes.iter().filter_map(|st| filter.admit(st)).collect();
                h.stakes.extend(merge_stakes(admitted).into_iter().map(Instruction::Stake));
                h.stops.extend(ex.stop_auto_stakes);
                if sync_pool {
                    h.finish_syncs.extend(ex.finish_syncs.into_iter().map(Instruction::FinishSync));
                } else {
                    h.dropped += ex.finish_syncs.len();
                }

                let mut took_swap = false;
                for sw in ex.swaps {
                    if h.swaps.contains_key(&s) || !self.swap_matches(parent, &sw, height) {
                        debug!(shard = s, height = block.header.height, "drop swap");
                        h.dropped += 1;
                        continue;
                    }
                    h.swaps.insert(s, sw);
                    took_swap = true;
                }
                if took_swap && i + 1 < batch.blocks.len() {
                    h.deferred += batch.blocks.len() - i - 1;
                    break;
                }
            }
        }
        h.admitted = filter.admitted().clone();
        Ok(h)
    }

    fn produce_at(
        &self,
        parent: &BeaconView,
        height: u64,
        producer: CommitteePublicKey,
        round: u32,
        timestamp: i64,
    ) -> Result<ProducedBlock, ProducerError> {
        let params = self.engine.params_at(height);
        let epoch = next_epoch(params, parent.epoch, height);
        let opts = DecodeOptions {
            strict_stake_field_counts: params.strict_stake_field_counts,
        };
        let harvest = self.harvest(parent, height, opts)?;
        let mut insts: Vec<Instruction> = Vec::new();

        let bridge = self.bridge.build(&harvest.bridge_requests);
        let rejected = bridge.iter().filter(|b| b.status == BridgeStatus::Rejected).count();
        insts.extend(bridge.into_iter().map(Instruction::Bridge));
        insts.extend(harvest.accepted.into_iter().map(Instruction::AcceptedReward));

        let epoch_end = params.is_epoch_end(height);
        let mut swaps = harvest.swaps;
        for s in 0..parent.active_shards {
            let swap = match swaps.remove(&s) {
                Some(sw) => Some(sw),
                None if epoch_end => {
                    self.engine
                        .generate_swap(&parent.committee, SwapTarget::Shard(s), &PenaltyMap::new(), height)
                        .instruction
                }
                None => None,
            };
            insts.extend(swap.map(Instruction::Swap));
        }
        if epoch_end {
            let beacon = self
                .engine
                .generate_swap(&parent.committee, SwapTarget::Beacon, &PenaltyMap::new(), height)
                .instruction;
            insts.extend(beacon.map(Instruction::Swap));
        }

        insts.extend(harvest.stakes);
        let mut members: BTreeSet<String> = parent.committee.base().auto_stake.keys().cloned().collect();
        members.extend(harvest.admitted);
        insts.extend(filter_stop_auto_stakes(&harvest.stops, &members).map(Instruction::StopAutoStake));
        insts.extend(harvest.finish_syncs);

        if random_due(params, parent, height) {
            let nonce = random_number(&parent.beacon_hash, &parent.best_shard_hash, parent.active_shards);
            insts.push(Instruction::Random(RandomInstruction {
                nonce,
                height,
                timestamp,
            }));
            let env = EngineEnv {
                beacon_height: height,
                epoch,
                active_shards: parent.active_shards,
                random_number: parent.current_random_number,
            };
            insts.extend(
                self.engine
                    .generate_assign(&parent.committee, nonce, &env)
                    .into_iter()
                    .map(Instruction::Assign),
            );
        }

        if params.is_epoch_start(height) && epoch > 1 {
            let fees = self.rewards.epoch_fees(epoch - 1)?;
            insts.extend(
                split_epoch_rewards(epoch - 1, &fees, params, parent.active_shards)
                    .into_iter()
                    .map(Instruction::RewardByEpoch),
            );
        }

        let derived = derive_view(&self.engine, parent, height, timestamp, &harvest.shard_states, &insts)?;
        let mut wire = encode_all(&insts);
        if !derived.return_stake.is_empty() {
            wire.push(Instruction::ReturnStake(derived.return_stake.clone()).encode());
        }

        let roots = HeaderRoots::compute(&derived.view.committee, &harvest.shard_states, &wire)?;
        let header = BeaconHeader {
            height,
            epoch,
            round,
            producer,
            prev_hash: parent.beacon_hash,
            timestamp,
            roots,
        };
        let hash = header.hash()?;
        let mut view = derived.view;
        view.beacon_hash = hash;

        self.metrics.blocks_produced_total.inc();
        self.metrics.instructions_dropped_total.inc_by(harvest.dropped as u64);
        self.metrics.shard_blocks_deferred_total.inc_by(harvest.deferred as u64);
        self.metrics.bridge_rejected_total.inc_by(rejected as u64);
        info!(
            height,
            epoch,
            hash = %hash,
            instructions = wire.len(),
            skipped = derived.skipped,
            "beacon block produced"
        );

        Ok(ProducedBlock {
            block: BeaconBlock {
                header,
                body: BeaconBody {
                    shard_states: harvest.shard_states,
                    instructions: wire,
                },
            },
            view,
            change: derived.change,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::core::config::GenesisCommittees;
    use crate::core::economics::reward::MemoryRewardAccumulator;
    use crate::core::instruction::test_keys::key;
    use crate::core::producer::bridge::{DefaultBridgeBuilder, MemoryFeatureState};
    use crate::core::producer::pool::MemoryShardPool;
    use crate::core::state::stake_store::MemoryStakeStore;

    pub fn params() -> ChainParams {
        ChainParams {
            epoch_length: 10,
            random_time: 5,
            active_shards: 2,
            min_shard_committee_size: 4,
            max_shard_committee_size: 4,
            min_beacon_committee_size: 2,
            max_beacon_committee_size: 2,
            swap_offset: 1,
            assign_offset: 2,
            state_version: StateVersion::SyncPool,
            ..ChainParams::default()
        }
    }

    pub fn genesis_view() -> BeaconView {
        let c = GenesisCommittees {
            beacon_committee: vec![key(1), key(2)],
            shard_committee: [
                (0, vec![key(10), key(11), key(12), key(13)]),
                (1, vec![key(20), key(21), key(22), key(23)]),
            ]
            .into_iter()
            .collect(),
            shard_substitute: [(0, vec![key(14)])].into_iter().collect(),
        };
        let st = CommitteeState::genesis(StateVersion::SyncPool, 2, &c, 1);
        BeaconView::genesis(st, 2, sha256(b"genesis"), 0)
    }

    pub struct Rig {
        pub engine: Arc<CommitteeEngine>,
        pub pool: Arc<MemoryShardPool>,
        pub rewards: Arc<MemoryRewardAccumulator>,
        pub stakes: Arc<MemoryStakeStore>,
        pub metrics: Arc<Metrics>,
        pub producer: BeaconProducer,
    }

    pub fn rig() -> Rig {
        let stakes = Arc::new(MemoryStakeStore::default());
        let engine = Arc::new(CommitteeEngine::new(Arc::new(params()), stakes.clone(), Span::none()));
        let pool = Arc::new(MemoryShardPool::new(64));
        let rewards = Arc::new(MemoryRewardAccumulator::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let producer = BeaconProducer::new(
            engine.clone(),
            pool.clone(),
            rewards.clone(),
            Arc::new(DefaultBridgeBuilder::new(Arc::new(MemoryFeatureState::default()))),
            metrics.clone(),
            Span::none(),
        );
        Rig {
            engine,
            pool,
            rewards,
            stakes,
            metrics,
            producer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{genesis_view, rig};
    use super::*;
    use crate::core::instruction::test_keys::{key, ks};
    use crate::core::instruction::StakeChain;
    use crate::core::producer::pool::test_blocks::block;
    use crate::core::producer::shard_state::{ShardTransaction, TxMetadata};

    fn staking_tx(n: u8, auto_stake: bool) -> ShardTransaction {
        ShardTransaction {
            hash: sha256(&[n]),
            metadata: Some(TxMetadata::Staking {
                committee_key: key(n),
                chain: StakeChain::Shard,
                reward_receiver: format!("r{n}"),
                auto_stake,
            }),
        }
    }

    fn decoded(b: &BeaconBlock) -> Vec<Instruction> {
        b.body
            .instructions
            .iter()
            .map(|w| Instruction::decode(w, DecodeOptions::default()).unwrap())
            .collect()
    }

    #[test]
    fn empty_block_commits_to_unchanged_committee() {
        let r = rig();
        let g = genesis_view();
        let p = r.producer.produce(&g, key(1), 0, 5).unwrap();
        assert_eq!(p.block.header.height, 2);
        assert_eq!(p.block.header.prev_hash, g.beacon_hash);
        assert!(p.block.body.instructions.is_empty());
        assert_eq!(p.view.committee, g.committee);
        assert_eq!(p.view.beacon_hash, p.block.header.hash().unwrap());
        assert_eq!(
            p.block.header.roots.committee,
            CommitteeStateHash::compute(&g.committee).unwrap()
        );
        assert_eq!(r.metrics.blocks_produced_total.get(), 1);
    }

    #[test]
    fn shard_stakes_are_filtered_and_included() {
        let r = rig();
        let g = genesis_view();
        let mut b1 = block(0, 1);
        b1.body.transactions = vec![staking_tx(30, true), staking_tx(10, true)];
        let mut b2 = block(1, 1);
        b2.body.transactions = vec![staking_tx(30, false), staking_tx(31, false)];
        r.pool.add_block(b1).unwrap();
        r.pool.add_block(b2).unwrap();

        let p = r.producer.produce(&g, key(1), 0, 5).unwrap();
        let insts = decoded(&p.block);
        let stakes: Vec<Vec<CommitteePublicKey>> = insts
            .iter()
            .filter_map(|i| match i {
                Instruction::Stake(s) => Some(s.public_keys.clone()),
                _ => None,
            })
            .collect();
        // key 10 is a validator; key 30 was admitted from shard 0 first
        assert_eq!(stakes, vec![vec![key(30)], vec![key(31)]]);
        assert!(matches!(insts[0], Instruction::AcceptedReward(_)));
        assert_eq!(p.view.committee.base().shard_common_pool, vec![key(30), key(31)]);
        assert_eq!(p.view.best_shard_height[&0], 1);
        assert_eq!(p.block.body.shard_states[&1].len(), 1);
    }

    #[test]
    fn epoch_end_generates_swaps() {
        let r = rig();
        let mut parent = genesis_view();
        parent.beacon_height = 9;
        let p = r.producer.produce(&parent, key(1), 0, 5).unwrap();
        let swaps: Vec<SwapInstruction> = decoded(&p.block)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Swap(s) => Some(s),
                _ => None,
            })
            .collect();
        // only shard 0 has a substitute
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].in_public_keys, vec![key(14)]);
        assert_eq!(swaps[0].out_public_keys, vec![key(10)]);
        assert_eq!(p.view.committee.base().shard_committee[&0][0], key(14));
    }

    #[test]
    fn random_and_assign_follow_random_time() {
        let r = rig();
        let mut parent = genesis_view();
        parent.beacon_height = 5;
        parent.committee.base_mut().shard_common_pool.push(key(30));
        parent.committee.base_mut().auto_stake.insert(ks(30), true);
        parent.committee.base_mut().number_of_assigned_candidates = 1;

        let p = r.producer.produce(&parent, key(1), 0, 5).unwrap();
        let insts = decoded(&p.block);
        let pos = insts
            .iter()
            .position(|i| matches!(i, Instruction::Random(_)))
            .unwrap();
        assert!(matches!(insts[pos + 1], Instruction::Assign(_)));
        assert!(p.view.is_get_random_number);
        assert!(p.view.committee.base().shard_common_pool.is_empty());

        // not again in the same epoch
        let next = r.producer.produce(&p.view, key(1), 0, 6).unwrap();
        assert!(!decoded(&next.block).iter().any(|i| matches!(i, Instruction::Random(_))));
    }

    #[test]
    fn shard_swap_defers_rest_of_batch() {
        let r = rig();
        let g = genesis_view();
        let swap = r
            .engine
            .generate_swap(&g.committee, SwapTarget::Shard(0), &PenaltyMap::new(), 2)
            .instruction
            .unwrap();
        let mut b1 = block(0, 1);
        b1.body.instructions.push(Instruction::Swap(swap.clone()).encode());
        r.pool.add_block(b1).unwrap();
        r.pool.add_block(block(0, 2)).unwrap();

        let p = r.producer.produce(&g, key(1), 0, 5).unwrap();
        assert!(decoded(&p.block).contains(&Instruction::Swap(swap)));
        assert_eq!(p.block.body.shard_states[&0].len(), 1);
        assert_eq!(r.metrics.shard_blocks_deferred_total.get(), 1);
    }

    #[test]
    fn epoch_start_pays_previous_epoch() {
        let r = rig();
        r.rewards.record_fee(1, 0, 100).unwrap();
        let mut parent = genesis_view();
        parent.beacon_height = 10;
        let p = r.producer.produce(&parent, key(1), 0, 5).unwrap();
        assert_eq!(p.block.header.epoch, 2);
        let rewards: Vec<_> = decoded(&p.block)
            .into_iter()
            .filter(|i| matches!(i, Instruction::RewardByEpoch(_)))
            .collect();
        assert_eq!(rewards.len(), 1);
    }
}
