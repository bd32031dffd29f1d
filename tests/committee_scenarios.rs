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

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{engine, env, genesis, key, ks, stake, stake_info, stop};
use shardbeacon::core::committee::assign::{assign_candidates, random_number};
use shardbeacon::core::committee::swap_rule::PenaltyMap;
use shardbeacon::core::config::StateVersion;
use shardbeacon::core::instruction::{encode_all, AssignInstruction, Instruction, RandomInstruction, SwapTarget};
use shardbeacon::core::state::roots::{instruction_hash, CommitteeStateHash};
use shardbeacon::core::state::stake_store::{MemoryStakeStore, StakeInfoWriter};
use shardbeacon::core::types::{sha256, ShardId, H256};

#[test]
fn stake_adds_terms_and_queues_in_arrival_order() {
    let e = engine(StateVersion::SyncPool, Arc::default());
    let st = genesis(StateVersion::SyncPool);
    let out = e
        .apply(&st, &[stake(&[30, 31], &[true, false])], &env(3))
        .unwrap();
    assert_eq!(out.change.terms_added, vec![key(30), key(31)]);
    assert_eq!(out.change.shard_candidate_added, vec![key(30), key(31)]);
    assert_eq!(out.state.base().shard_common_pool, vec![key(30), key(31)]);
    assert_eq!(out.skipped, 0);
}

#[test]
fn assigned_candidates_join_substitutes_in_arrival_order() {
    let e = engine(StateVersion::Slashing, Arc::default());
    let st = genesis(StateVersion::Slashing);
    let staked = e
        .apply(&st, &[stake(&[30, 31], &[true, true])], &env(10))
        .unwrap()
        .state;
    let started = e.apply(&staked, &[], &env(11)).unwrap().state;

    // shard 1 has no pending validators, so both land there in order
    let assigns = e.generate_assign(&started, 0, &env(16));
    assert_eq!(
        assigns,
        vec![AssignInstruction {
            public_keys: vec![key(30), key(31)],
            shard_id: 1,
        }]
    );
    let mut batch = vec![Instruction::Random(RandomInstruction {
        nonce: 0,
        height: 16,
        timestamp: 0,
    })];
    batch.extend(assigns.into_iter().map(Instruction::Assign));
    let out = e.apply(&started, &batch, &env(16)).unwrap();
    assert_eq!(out.skipped, 0);
    assert_eq!(out.state.base().shard_substitute[&1], vec![key(30), key(31)]);
    assert_eq!(out.state.base().shard_substitute[&0], vec![key(14), key(15)]);
    assert!(out.state.base().shard_common_pool.is_empty());
}

#[test]
fn assign_without_random_moves_nobody() {
    let e = engine(StateVersion::Slashing, Arc::default());
    let st = genesis(StateVersion::Slashing);
    let assign = Instruction::Assign(AssignInstruction {
        public_keys: vec![key(30)],
        shard_id: 0,
    });
    let out = e
        .apply(&st, &[stake(&[30], &[true]), assign], &env(3))
        .unwrap();
    assert_eq!(out.skipped, 1);
    assert_eq!(out.state.base().shard_common_pool, vec![key(30)]);
    assert_eq!(out.state.base().shard_substitute[&0], vec![key(14), key(15)]);
}

#[test]
fn swap_out_of_non_auto_staker_returns_full_stake() {
    let stakes = Arc::new(MemoryStakeStore::default());
    stakes.put_all(&[stake_info(10, "tx-of-10", false)]).unwrap();
    let e = engine(StateVersion::SyncPool, stakes);
    let mut st = genesis(StateVersion::SyncPool);
    st.base_mut().auto_stake.insert(ks(10), false);

    let swap = e
        .generate_swap(&st, SwapTarget::Shard(0), &PenaltyMap::new(), 10)
        .instruction
        .unwrap();
    assert_eq!(swap.out_public_keys, vec![key(10)]);
    assert_eq!(swap.in_public_keys, vec![key(14)]);

    let out = e.apply(&st, &[Instruction::Swap(swap)], &env(10)).unwrap();
    assert_eq!(
        out.state.base().shard_committee[&0],
        vec![key(14), key(11), key(12), key(13)]
    );
    assert_eq!(out.state.base().shard_substitute[&0], vec![key(15)]);
    assert_eq!(out.change.removed_staker, vec![key(10)]);
    assert_eq!(out.return_stake.public_keys, vec![key(10)]);
    assert_eq!(out.return_stake.tx_stakes, vec!["tx-of-10".to_string()]);
    assert_eq!(out.return_stake.percent_returns, vec![100]);
    assert!(!out.state.base().auto_stake.contains_key(&ks(10)));
}

#[test]
fn random_number_is_deterministic() {
    let h0 = sha256(b"beacon best");
    let shards: BTreeMap<ShardId, H256> = [(0, sha256(b"shard 0")), (1, sha256(b"shard 1"))]
        .into_iter()
        .collect();
    let a = random_number(&h0, &shards, 2);
    for _ in 0..3 {
        assert_eq!(random_number(&h0, &shards, 2), a);
    }

    let mut other = shards.clone();
    other.insert(1, sha256(b"another shard 1"));
    assert_ne!(random_number(&h0, &other, 2), a);
}

#[test]
fn candidates_go_to_least_loaded_shard_first() {
    let pending: BTreeMap<ShardId, usize> = [(0, 0), (1, 3)].into_iter().collect();
    let caps: BTreeMap<ShardId, usize> = [(0, 4), (1, 4)].into_iter().collect();
    for seed in 0..4 {
        let (assigned, rest) = assign_candidates(&[key(40), key(41)], &pending, &caps, seed, 2);
        assert_eq!(assigned[&0].first(), Some(&key(40)), "seed {seed}");
        assert!(rest.is_empty());
    }
}

#[test]
fn instruction_order_changes_hash_and_state() {
    let e = engine(StateVersion::SyncPool, Arc::default());
    let st = genesis(StateVersion::SyncPool);
    let forward = vec![stake(&[30], &[true]), stop(&[30])];
    let backward = vec![stop(&[30]), stake(&[30], &[true])];

    assert_ne!(instruction_hash(&encode_all(&forward)), instruction_hash(&encode_all(&backward)));

    let f = e.apply(&st, &forward, &env(3)).unwrap();
    let b = e.apply(&st, &backward, &env(3)).unwrap();
    // stake then stop: the waiting candidate is unstaked at once
    assert!(f.state.base().shard_common_pool.is_empty());
    assert_eq!(f.return_stake.public_keys, vec![key(30)]);
    assert_eq!(f.return_stake.tx_stakes, vec!["tx30".to_string()]);
    // stop then stake: the stop names no staker and is skipped
    assert_eq!(b.skipped, 1);
    assert_eq!(b.state.base().shard_common_pool, vec![key(30)]);
    assert_eq!(b.state.base().auto_stake[&ks(30)], true);

    assert_ne!(
        CommitteeStateHash::compute(&f.state).unwrap(),
        CommitteeStateHash::compute(&b.state).unwrap()
    );
}

#[test]
fn stop_auto_stake_only_flips_committee_members() {
    let e = engine(StateVersion::SyncPool, Arc::default());
    let st = genesis(StateVersion::SyncPool);
    let out = e.apply(&st, &[stop(&[11])], &env(3)).unwrap();
    assert_eq!(out.state.base().auto_stake[&ks(11)], false);
    assert_eq!(out.change.stop_auto_stake, vec![key(11)]);
    assert!(out.return_stake.is_empty());
    assert_eq!(out.state.base().shard_committee, st.base().shard_committee);
}
