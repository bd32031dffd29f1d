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

//! Committee-state transition engine.
//!
//! Applies one beacon block's instructions, strictly in list order, to a clone
//! of the input state. Malformed or inconsistent instructions are skipped
//! without mutation; only stake-info lookup failures abort the batch.

use crate::core::committee::assign::{assign_candidates, candidate_shard};
use crate::core::committee::change::CommitteeChange;
use crate::core::committee::state::{remove_key, CommitteeState};
use crate::core::committee::swap_rule::{
    penalties_for_replay, swap_rule, PenaltyMap, SwapInput, SwapOutcome, SwapRule,
};
use crate::core::config::{ChainParamProvider, ChainParams, StateVersion};
use crate::core::instruction::{
    AssignInstruction, FinishSyncInstruction, Instruction, RandomInstruction,
    ReturnStakeInstruction, StakeChain, StakeInstruction, StopAutoStakeInstruction,
    SwapInstruction, SwapTarget,
};
use crate::core::state::stake_store::{StakeInfoReader, StakeStoreError};
use crate::core::types::{CommitteePublicKey, ShardId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, Span};

/// Engine errors. Each one aborts the block being built or validated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Stake-info store failure.
    #[error("stake info: {0}")]
    StakeInfo(#[from] StakeStoreError),
    /// A returned validator has no recorded staking transaction.
    #[error("no stake info for {0}")]
    MissingStakeInfo(String),
    /// The resulting state broke membership rules.
    #[error("state invariant violated: {0}")]
    Invariant(String),
}

/// Chain context of one transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineEnv {
    /// Height of the block being applied.
    pub beacon_height: u64,
    /// Epoch of that block.
    pub epoch: u64,
    /// Active shard count.
    pub active_shards: u8,
    /// Current epoch random number.
    pub random_number: i64,
}

/// Result of one transition.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    /// New state.
    pub state: CommitteeState,
    /// Diff against the input state.
    pub change: CommitteeChange,
    /// Stake returned during the batch.
    pub return_stake: ReturnStakeInstruction,
    /// Random number recorded by a random instruction, if any.
    pub random_number: Option<i64>,
    /// Instructions skipped as inconsistent.
    pub skipped: usize,
}

/// Term-expired committee members at `beacon_height`.
pub fn term_expired(
    state: &CommitteeState,
    committee: &[CommitteePublicKey],
    beacon_height: u64,
    max_term_length: u64,
) -> BTreeSet<String> {
    let (Some(terms), true) = (state.terms(), max_term_length > 0) else {
        return BTreeSet::new();
    };
    committee
        .iter()
        .map(CommitteePublicKey::to_key_string)
        .filter(|ks| {
            terms
                .get(ks)
                .is_some_and(|t| beacon_height.saturating_sub(*t) >= max_term_length)
        })
        .collect()
}

/// Committee-state transition engine.
pub struct CommitteeEngine {
    params: Arc<dyn ChainParamProvider>,
    stake_info: Arc<dyn StakeInfoReader>,
    span: Span,
}

impl CommitteeEngine {
    /// Engine reading chain parameters and stake info from the given collaborators.
    pub fn new(
        params: Arc<dyn ChainParamProvider>,
        stake_info: Arc<dyn StakeInfoReader>,
        span: Span,
    ) -> Self {
        Self {
            params,
            stake_info,
            span,
        }
    }

    /// Chain parameters in force at `beacon_height`.
    pub fn params_at(&self, beacon_height: u64) -> &ChainParams {
        self.params.params_at(beacon_height)
    }

    fn rule(&self, state: &CommitteeState, params: &ChainParams) -> Box<dyn SwapRule> {
        swap_rule(state.version(), params.assign_offset)
    }

    fn swap_input<'a>(
        state: &'a CommitteeState,
        target: SwapTarget,
        params: &ChainParams,
        penalties: &'a PenaltyMap,
        expired: &'a BTreeSet<String>,
    ) -> SwapInput<'a> {
        let base = state.base();
        match target {
            SwapTarget::Shard(s) => SwapInput {
                target,
                committee: base.shard_committee.get(&s).map_or(&[], Vec::as_slice),
                substitute: base.shard_substitute.get(&s).map_or(&[], Vec::as_slice),
                min_committee_size: params.min_shard_committee_size,
                max_committee_size: params.max_shard_committee_size,
                fixed_validators: params.fixed_shard_validators,
                swap_offset: params.swap_offset,
                max_substitute_size: params.max_substitute_size,
                penalties,
                term_expired: expired,
            },
            SwapTarget::Beacon => SwapInput {
                target,
                committee: &base.beacon_committee,
                substitute: &base.beacon_substitute,
                min_committee_size: params.min_beacon_committee_size,
                max_committee_size: params.max_beacon_committee_size,
                fixed_validators: params.fixed_beacon_validators,
                swap_offset: params.swap_offset,
                max_substitute_size: params.max_substitute_size,
                penalties,
                term_expired: expired,
            },
        }
    }

    fn committee_of(state: &CommitteeState, target: SwapTarget) -> &[CommitteePublicKey] {
        match target {
            SwapTarget::Shard(s) => state.base().shard_committee.get(&s).map_or(&[], Vec::as_slice),
            SwapTarget::Beacon => &state.base().beacon_committee,
        }
    }

    /// Run the swap rule for one committee of `state`.
    pub fn generate_swap(
        &self,
        state: &CommitteeState,
        target: SwapTarget,
        penalties: &PenaltyMap,
        beacon_height: u64,
    ) -> SwapOutcome {
        let params = self.params.params_at(beacon_height);
        let expired = term_expired(
            state,
            Self::committee_of(state, target),
            beacon_height,
            params.max_term_length,
        );
        let input = Self::swap_input(state, target, params, penalties, &expired);
        self.rule(state, params).gen_instruction(&input)
    }

    fn plan_assignment(
        &self,
        state: &CommitteeState,
        seed: i64,
        env: &EngineEnv,
    ) -> BTreeMap<ShardId, Vec<CommitteePublicKey>> {
        let params = self.params.params_at(env.beacon_height);
        let rule = self.rule(state, params);
        let base = state.base();
        let count = if params.is_epoch_start(env.beacon_height) {
            base.shard_common_pool.len()
        } else {
            base.number_of_assigned_candidates.min(base.shard_common_pool.len())
        };
        let caps: BTreeMap<ShardId, usize> = (0..env.active_shards)
            .map(|s| {
                let len_sub = base.shard_substitute.get(&s).map_or(0, Vec::len);
                let len_comm = base.shard_committee.get(&s).map_or(0, Vec::len);
                let cap = rule.assign_offset(
                    len_sub,
                    len_comm,
                    params.fixed_shard_validators,
                    params.min_shard_committee_size,
                );
                (s, cap)
            })
            .collect();
        let pending = state.pending_counts(env.active_shards);
        assign_candidates(
            &base.shard_common_pool[..count],
            &pending,
            &caps,
            seed,
            env.active_shards,
        )
        .0
    }

    /// Assign instructions the random number `seed` yields on `state`, by shard.
    pub fn generate_assign(
        &self,
        state: &CommitteeState,
        seed: i64,
        env: &EngineEnv,
    ) -> Vec<AssignInstruction> {
        self.plan_assignment(state, seed, env)
            .into_iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(shard_id, public_keys)| AssignInstruction {
                public_keys,
                shard_id,
            })
            .collect()
    }

    /// Apply a batch to a clone of `state`.
    pub fn apply(
        &self,
        state: &CommitteeState,
        insts: &[Instruction],
        env: &EngineEnv,
    ) -> Result<EngineOutput, EngineError> {
        let _g = self.span.enter();
        let params = self.params.params_at(env.beacon_height);
        let mut batch = Batch {
            engine: self,
            params,
            env,
            old: state,
            st: state.clone(),
            change: CommitteeChange::new(),
            ret: ReturnStakeInstruction::default(),
            batch_stakes: BTreeMap::new(),
            random: None,
            plan: None,
            skipped: 0,
        };
        if params.is_epoch_start(env.beacon_height) {
            let base = batch.st.base_mut();
            base.number_of_assigned_candidates = base.shard_common_pool.len();
        }

        for inst in insts.iter() {
            let applied = match inst {
                Instruction::Stake(s) => batch.stake(s),
                Instruction::Swap(s) => batch.swap(s)?,
                Instruction::StopAutoStake(s) => batch.stop_auto_stake(s)?,
                Instruction::Random(r) => batch.random(r),
                Instruction::Assign(a) => batch.assign(a),
                Instruction::FinishSync(f) => batch.finish_sync(f)?,
                _ => true,
            };
            if !applied {
                batch.skipped += 1;
                debug!(action = %inst.action(), height = env.beacon_height, "instruction skipped");
            }
        }

        batch.st.check_invariants().map_err(EngineError::Invariant)?;
        Ok(EngineOutput {
            state: batch.st,
            change: batch.change,
            return_stake: batch.ret,
            random_number: batch.random,
            skipped: batch.skipped,
        })
    }
}

struct Batch<'a> {
    engine: &'a CommitteeEngine,
    params: &'a ChainParams,
    env: &'a EngineEnv,
    old: &'a CommitteeState,
    st: CommitteeState,
    change: CommitteeChange,
    ret: ReturnStakeInstruction,
    batch_stakes: BTreeMap<String, String>,
    random: Option<i64>,
    plan: Option<BTreeMap<ShardId, Vec<CommitteePublicKey>>>,
    skipped: usize,
}

impl<'a> Batch<'a> {
    fn stamp_term(&mut self, key: &CommitteePublicKey) {
        if self.st.set_term(&key.to_key_string(), self.env.beacon_height) {
            self.change.terms_added.push(key.clone());
        }
    }

    /// Remove every trace of `key` and return its stake.
    fn unstake(&mut self, key: &CommitteePublicKey, percent: u8) -> Result<(), EngineError> {
        let ks = key.to_key_string();
        let tx = match self.engine.stake_info.stake_info(&ks)? {
            Some(info) => info.tx_stake,
            None => self
                .batch_stakes
                .get(&ks)
                .cloned()
                .ok_or_else(|| EngineError::MissingStakeInfo(ks.clone()))?,
        };
        self.st.base_mut().forget(&ks);
        if self.st.remove_term(&ks) {
            self.change.terms_removed.push(key.clone());
        }
        self.change.removed_staker.push(key.clone());
        self.ret.push(key.clone(), tx, percent);
        Ok(())
    }

    fn stake(&mut self, s: &StakeInstruction) -> bool {
        let mut seen = BTreeSet::new();
        let clash = s.public_keys.iter().any(|k| {
            let ks = k.to_key_string();
            !seen.insert(ks.clone())
                || self.st.base().auto_stake.contains_key(&ks)
                || self.st.membership(k).is_some()
        });
        if clash || s.public_keys.len() != s.tx_stakes.len() {
            return false;
        }
        let rows = s
            .public_keys
            .iter()
            .zip(s.tx_stakes.iter())
            .zip(s.reward_receivers.iter())
            .zip(s.auto_stakes.iter());
        for (((key, tx), receiver), auto) in rows {
            let ks = key.to_key_string();
            let base = self.st.base_mut();
            match s.chain {
                StakeChain::Shard => {
                    base.shard_common_pool.push(key.clone());
                    self.change.shard_candidate_added.push(key.clone());
                }
                StakeChain::Beacon => {
                    base.beacon_common_pool.push(key.clone());
                    self.change.beacon_candidate_added.push(key.clone());
                }
            }
            base.auto_stake.insert(ks.clone(), *auto);
            base.reward_receiver.insert(ks.clone(), receiver.clone());
            base.staking_tx.insert(ks.clone(), tx.clone());
            self.batch_stakes.insert(ks, tx.clone());
            self.stamp_term(key);
        }
        true
    }

    fn swap(&mut self, inst: &SwapInstruction) -> Result<bool, EngineError> {
        let Some(target) = inst.target else {
            return Ok(false);
        };
        if let SwapTarget::Shard(s) = target {
            if s >= self.env.active_shards {
                return Ok(false);
            }
        }
        let substitute: Vec<CommitteePublicKey> = match target {
            SwapTarget::Shard(s) => self.st.base().shard_substitute.get(&s).cloned().unwrap_or_default(),
            SwapTarget::Beacon => self.st.base().beacon_substitute.clone(),
        };
        let penalties = penalties_for_replay(inst, &substitute);
        let outcome = self
            .engine
            .generate_swap(&self.st, target, &penalties, self.env.beacon_height);
        if outcome.instruction.as_ref() != Some(inst) {
            debug!(?target, "swap does not match swap rule");
            return Ok(false);
        }

        match target {
            SwapTarget::Shard(s) => {
                {
                    let base = self.st.base_mut();
                    base.shard_committee.insert(s, outcome.new_committee.clone());
                    base.shard_substitute.insert(s, outcome.new_substitute.clone());
                }
                for k in outcome.swapped_in.iter() {
                    self.change.remove_shard_substitute(s, k);
                    self.change.add_shard_committee(s, k);
                    self.stamp_term(k);
                }
                for k in outcome.swapped_out.iter() {
                    self.change.remove_shard_committee(s, k);
                    let punished = outcome.slashed.contains(k);
                    self.shard_out(k, s, punished)?;
                }
                for k in outcome.dropped.iter() {
                    self.change.remove_shard_substitute(s, k);
                    self.unstake(k, 100)?;
                }
            }
            SwapTarget::Beacon => {
                {
                    let base = self.st.base_mut();
                    base.beacon_committee = outcome.new_committee.clone();
                    base.beacon_substitute = outcome.new_substitute.clone();
                }
                for k in outcome.swapped_in.iter() {
                    self.change.beacon_substitute_removed.push(k.clone());
                    self.change.beacon_committee_added.push(k.clone());
                    self.stamp_term(k);
                }
                for k in outcome.swapped_out.iter() {
                    self.change.beacon_committee_removed.push(k.clone());
                    let ks = k.to_key_string();
                    let auto = self.st.base().auto_stake.get(&ks).copied().unwrap_or(false);
                    if outcome.slashed.contains(k) {
                        self.unstake(k, self.params.punished_return_percent)?;
                    } else if auto {
                        self.st.base_mut().beacon_substitute.push(k.clone());
                        self.change.beacon_substitute_added.push(k.clone());
                    } else {
                        self.unstake(k, 100)?;
                    }
                }
                for k in outcome.dropped.iter() {
                    self.change.beacon_substitute_removed.push(k.clone());
                    self.unstake(k, 100)?;
                }
            }
        }
        Ok(true)
    }

    fn shard_out(&mut self, key: &CommitteePublicKey, shard: ShardId, punished: bool) -> Result<(), EngineError> {
        if punished {
            return self.unstake(key, self.params.punished_return_percent);
        }
        let ks = key.to_key_string();
        if !self.st.base().auto_stake.get(&ks).copied().unwrap_or(false) {
            return self.unstake(key, 100);
        }
        match self.st.version() {
            StateVersion::Slashing => {
                self.st.base_mut().shard_substitute.entry(shard).or_default().push(key.clone());
                self.change.add_shard_substitute(shard, key);
            }
            StateVersion::SyncPool => {
                let next = candidate_shard(&ks, self.env.random_number, self.env.active_shards);
                if next == shard {
                    self.st.base_mut().shard_substitute.entry(shard).or_default().push(key.clone());
                    self.change.add_shard_substitute(shard, key);
                } else {
                    if let Some(pool) = self.st.sync_pool_mut(next) {
                        pool.push(key.clone());
                    }
                    self.change.add_sync_pool(next, key);
                    self.stamp_term(key);
                }
            }
        }
        Ok(())
    }

    fn remove_candidate(&mut self, key: &CommitteePublicKey) -> bool {
        let base = self.st.base_mut();
        match remove_key(&mut base.shard_common_pool, key) {
            Some(pos) => {
                if pos < base.number_of_assigned_candidates {
                    base.number_of_assigned_candidates -= 1;
                }
                self.change.shard_candidate_removed.push(key.clone());
                true
            }
            None => false,
        }
    }

    fn stop_auto_stake(&mut self, s: &StopAutoStakeInstruction) -> Result<bool, EngineError> {
        let mut any = false;
        for key in s.public_keys.iter() {
            let ks = key.to_key_string();
            if !self.st.base().auto_stake.contains_key(&ks) {
                continue;
            }
            any = true;
            if self.st.version() == StateVersion::SyncPool {
                if self.remove_candidate(key) {
                    self.unstake(key, 100)?;
                    continue;
                }
                if remove_key(&mut self.st.base_mut().beacon_common_pool, key).is_some() {
                    self.change.beacon_candidate_removed.push(key.clone());
                    self.unstake(key, 100)?;
                    continue;
                }
            }
            self.st.base_mut().auto_stake.insert(ks, false);
            self.change.stop_auto_stake.push(key.clone());
        }
        Ok(any)
    }

    fn place_assigned(&mut self, key: &CommitteePublicKey, shard: ShardId) {
        match self.st.version() {
            StateVersion::Slashing => {
                self.st.base_mut().shard_substitute.entry(shard).or_default().push(key.clone());
                self.change.add_shard_substitute(shard, key);
            }
            StateVersion::SyncPool => {
                if let Some(pool) = self.st.sync_pool_mut(shard) {
                    pool.push(key.clone());
                }
                self.change.add_sync_pool(shard, key);
                self.stamp_term(key);
            }
        }
    }

    fn random(&mut self, r: &RandomInstruction) -> bool {
        self.random = Some(r.nonce);
        let plan = self.engine.plan_assignment(self.old, r.nonce, self.env);
        for (shard, keys) in plan.iter() {
            for k in keys.iter() {
                if self.remove_candidate(k) {
                    self.place_assigned(k, *shard);
                }
            }
        }
        self.plan = Some(plan);
        let base = self.st.base_mut();
        base.number_of_assigned_candidates = 0;
        let beacon_candidates = std::mem::take(&mut base.beacon_common_pool);
        base.beacon_substitute.extend(beacon_candidates.iter().cloned());
        self.change.beacon_candidate_removed.extend(beacon_candidates.iter().cloned());
        self.change.beacon_substitute_added.extend(beacon_candidates);
        true
    }

    /// Assignments are placed by the random instruction; an assign only
    /// confirms one shard of that plan.
    fn assign(&self, a: &AssignInstruction) -> bool {
        self.plan
            .as_ref()
            .is_some_and(|plan| plan.get(&a.shard_id) == Some(&a.public_keys))
    }

    fn finish_sync(&mut self, f: &FinishSyncInstruction) -> Result<bool, EngineError> {
        if f.shard_id >= self.env.active_shards {
            return Ok(false);
        }
        let Some(pool) = self.st.sync_pool().and_then(|sp| sp.get(&f.shard_id)) else {
            return Ok(false);
        };
        if f.public_keys.iter().any(|k| !pool.contains(k)) {
            return Ok(false);
        }
        for k in f.public_keys.iter() {
            if let Some(pool) = self.st.sync_pool_mut(f.shard_id) {
                remove_key(pool, k);
            }
            self.change.remove_sync_pool(f.shard_id, k);
            let ks = k.to_key_string();
            if self.st.base().auto_stake.get(&ks).copied().unwrap_or(false) {
                self.st
                    .base_mut()
                    .shard_substitute
                    .entry(f.shard_id)
                    .or_default()
                    .push(k.clone());
                self.change.add_shard_substitute(f.shard_id, k);
                self.stamp_term(k);
            } else {
                self.unstake(k, 100)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GenesisCommittees;
    use crate::core::instruction::test_keys::{key, ks};
    use crate::core::state::stake_store::{MemoryStakeStore, StakeInfo, StakeInfoWriter};

    fn params(version: StateVersion) -> ChainParams {
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
            state_version: version,
            ..ChainParams::default()
        }
    }

    fn engine(version: StateVersion, store: Arc<MemoryStakeStore>) -> CommitteeEngine {
        CommitteeEngine::new(Arc::new(params(version)), store, Span::none())
    }

    fn genesis(version: StateVersion) -> CommitteeState {
        let c = GenesisCommittees {
            beacon_committee: vec![key(1), key(2)],
            shard_committee: [
                (0, vec![key(10), key(11), key(12), key(13)]),
                (1, vec![key(20), key(21), key(22), key(23)]),
            ]
            .into_iter()
            .collect(),
            shard_substitute: [(0, vec![key(14), key(15)])].into_iter().collect(),
        };
        CommitteeState::genesis(version, 2, &c, 1)
    }

    fn env(h: u64) -> EngineEnv {
        EngineEnv {
            beacon_height: h,
            epoch: 1,
            active_shards: 2,
            random_number: 0,
        }
    }

    fn stake(keys: &[u8], autos: &[bool]) -> Instruction {
        Instruction::Stake(StakeInstruction {
            public_keys: keys.iter().map(|n| key(*n)).collect(),
            chain: StakeChain::Shard,
            tx_stakes: keys.iter().map(|n| format!("tx{n}")).collect(),
            reward_receivers: keys.iter().map(|n| format!("r{n}")).collect(),
            auto_stakes: autos.to_vec(),
        })
    }

    #[test]
    fn stake_adds_candidates_and_terms() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let st = genesis(StateVersion::SyncPool);
        let out = e.apply(&st, &[stake(&[30, 31], &[true, false])], &env(3)).unwrap();
        assert_eq!(out.change.terms_added, vec![key(30), key(31)]);
        assert_eq!(out.state.base().shard_common_pool, vec![key(30), key(31)]);
        assert_eq!(out.state.base().auto_stake[&ks(31)], false);
        assert_eq!(out.state.base().staking_tx[&ks(30)], "tx30");

        // restaking an existing validator is skipped without mutation
        let again = e.apply(&out.state, &[stake(&[10], &[true])], &env(4)).unwrap();
        assert_eq!(again.skipped, 1);
        assert_eq!(again.state, out.state);
    }

    #[test]
    fn swap_returns_stake_of_non_auto_staker() {
        let store = Arc::new(MemoryStakeStore::default());
        store
            .put_all(&[StakeInfo {
                committee_key: ks(10),
                tx_stake: "stake-tx-10".into(),
                reward_receiver: "r".into(),
                auto_stake: false,
                beacon_height: 1,
            }])
            .unwrap();
        let e = engine(StateVersion::SyncPool, store);
        let mut st = genesis(StateVersion::SyncPool);
        st.base_mut().auto_stake.insert(ks(10), false);

        let swap = e
            .generate_swap(&st, SwapTarget::Shard(0), &PenaltyMap::new(), 10)
            .instruction
            .unwrap();
        let out = e.apply(&st, &[Instruction::Swap(swap)], &env(10)).unwrap();
        assert_eq!(
            out.state.base().shard_committee[&0],
            vec![key(14), key(11), key(12), key(13)]
        );
        assert_eq!(out.change.removed_staker, vec![key(10)]);
        assert_eq!(out.return_stake.public_keys, vec![key(10)]);
        assert_eq!(out.return_stake.tx_stakes, vec!["stake-tx-10".to_string()]);
        assert_eq!(out.return_stake.percent_returns, vec![100]);
        assert!(!out.state.base().auto_stake.contains_key(&ks(10)));
    }

    #[test]
    fn missing_stake_info_is_fatal() {
        let e = engine(StateVersion::Slashing, Arc::default());
        let mut st = genesis(StateVersion::Slashing);
        st.base_mut().auto_stake.insert(ks(10), false);
        let swap = e
            .generate_swap(&st, SwapTarget::Shard(0), &PenaltyMap::new(), 10)
            .instruction
            .unwrap();
        let err = e.apply(&st, &[Instruction::Swap(swap)], &env(10)).unwrap_err();
        assert!(matches!(err, EngineError::MissingStakeInfo(_)));
    }

    #[test]
    fn auto_staker_requeues_v2() {
        let e = engine(StateVersion::Slashing, Arc::default());
        let st = genesis(StateVersion::Slashing);
        let swap = e
            .generate_swap(&st, SwapTarget::Shard(0), &PenaltyMap::new(), 10)
            .instruction
            .unwrap();
        let out = e.apply(&st, &[Instruction::Swap(swap)], &env(10)).unwrap();
        assert_eq!(out.state.base().shard_substitute[&0], vec![key(15), key(10)]);
        assert!(out.return_stake.is_empty());
    }

    #[test]
    fn swap_not_matching_rule_is_skipped() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let st = genesis(StateVersion::SyncPool);
        let forged = SwapInstruction {
            in_public_keys: vec![key(99)],
            out_public_keys: vec![key(10)],
            punished_public_keys: vec![],
            target: Some(SwapTarget::Shard(0)),
        };
        let out = e.apply(&st, &[Instruction::Swap(forged)], &env(10)).unwrap();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.state, st);
    }

    #[test]
    fn random_assigns_pool_to_sync_pool_in_v3() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let st = genesis(StateVersion::SyncPool);
        // staked in the epoch's first block so they count for this epoch's randomness
        let staked = e.apply(&st, &[stake(&[30, 31], &[true, true])], &env(10)).unwrap().state;
        let started = e.apply(&staked, &[], &env(11)).unwrap().state;
        assert_eq!(started.base().number_of_assigned_candidates, 2);

        let r = Instruction::Random(RandomInstruction { nonce: 0, height: 16, timestamp: 0 });
        let out = e.apply(&started, &[r], &env(16)).unwrap();
        assert_eq!(out.random_number, Some(0));
        assert!(out.state.base().shard_common_pool.is_empty());
        // shard 1 has no pending validators, shard 0 has two
        let sp = out.state.sync_pool().unwrap();
        assert_eq!(sp[&1], vec![key(30)]);
        assert_eq!(sp[&0], vec![key(31)]);
        assert_eq!(out.state.base().number_of_assigned_candidates, 0);
    }

    #[test]
    fn assign_instruction_is_idempotent_after_random() {
        let e = engine(StateVersion::Slashing, Arc::default());
        let st = genesis(StateVersion::Slashing);
        let staked = e.apply(&st, &[stake(&[30], &[true])], &env(10)).unwrap().state;
        let started = e.apply(&staked, &[], &env(11)).unwrap().state;
        let assigns = e.generate_assign(&started, 5, &env(16));
        assert_eq!(assigns.len(), 1);
        let mut insts = vec![Instruction::Random(RandomInstruction { nonce: 5, height: 16, timestamp: 0 })];
        insts.extend(assigns.into_iter().map(Instruction::Assign));
        let out = e.apply(&started, &insts, &env(16)).unwrap();
        assert_eq!(out.skipped, 0);
        assert_eq!(out.state.base().shard_substitute[&1], vec![key(30)]);
    }

    #[test]
    fn assign_outside_random_plan_is_skipped() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let st = genesis(StateVersion::SyncPool);
        let staked = e.apply(&st, &[stake(&[30], &[true])], &env(10)).unwrap().state;
        let started = e.apply(&staked, &[], &env(11)).unwrap().state;

        // no random in the batch
        let lone = Instruction::Assign(AssignInstruction { public_keys: vec![key(30)], shard_id: 1 });
        let out = e.apply(&started, &[lone], &env(12)).unwrap();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.state, started);

        // random present, but the assign names another shard than the plan
        let planned = e.generate_assign(&started, 5, &env(16));
        assert_eq!(planned.len(), 1);
        let other = 1 - planned[0].shard_id;
        let insts = vec![
            Instruction::Random(RandomInstruction { nonce: 5, height: 16, timestamp: 0 }),
            Instruction::Assign(AssignInstruction { public_keys: vec![key(30)], shard_id: other }),
        ];
        let out = e.apply(&started, &insts, &env(16)).unwrap();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.state.sync_pool().unwrap()[&planned[0].shard_id], vec![key(30)]);
        assert!(out.state.sync_pool().unwrap()[&other].is_empty());
    }

    #[test]
    fn stop_auto_stake_on_candidate_returns_stake_in_v3() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let st = genesis(StateVersion::SyncPool);
        let stop = Instruction::StopAutoStake(StopAutoStakeInstruction { public_keys: vec![key(30), key(11)] });

        let out = e.apply(&st, &[stake(&[30], &[true]), stop.clone()], &env(3)).unwrap();
        assert!(out.state.base().shard_common_pool.is_empty());
        assert_eq!(out.return_stake.tx_stakes, vec!["tx30".to_string()]);
        assert_eq!(out.state.base().auto_stake[&ks(11)], false);
        assert_eq!(out.change.stop_auto_stake, vec![key(11)]);

        // reversed order: the stop arrives before the key exists
        let rev = e.apply(&st, &[stop, stake(&[30], &[true])], &env(3)).unwrap();
        assert_eq!(rev.state.base().shard_common_pool, vec![key(30)]);
        assert!(rev.return_stake.is_empty());
    }

    #[test]
    fn finish_sync_moves_to_substitute() {
        let e = engine(StateVersion::SyncPool, Arc::default());
        let mut st = genesis(StateVersion::SyncPool);
        st.sync_pool_mut(1).unwrap().push(key(40));
        st.base_mut().auto_stake.insert(ks(40), true);
        let fs = Instruction::FinishSync(FinishSyncInstruction { shard_id: 1, public_keys: vec![key(40)] });
        let out = e.apply(&st, &[fs.clone()], &env(7)).unwrap();
        assert_eq!(out.state.base().shard_substitute[&1], vec![key(40)]);
        assert!(out.state.sync_pool().unwrap()[&1].is_empty());
        assert_eq!(out.state.terms().unwrap()[&ks(40)], 7);

        // unknown key: skipped
        let again = e.apply(&out.state, &[fs], &env(8)).unwrap();
        assert_eq!(again.skipped, 1);
    }
}
