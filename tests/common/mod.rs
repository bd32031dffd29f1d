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

#![allow(dead_code)]

use std::sync::Arc;

use shardbeacon::core::committee::engine::{CommitteeEngine, EngineEnv};
use shardbeacon::core::committee::state::CommitteeState;
use shardbeacon::core::config::{ChainParams, GenesisCommittees, StateVersion};
use shardbeacon::core::instruction::{Instruction, StakeChain, StakeInstruction, StopAutoStakeInstruction};
use shardbeacon::core::producer::shard_state::{ShardBlock, ShardBody, ShardHeader, ShardTransaction, TxMetadata};
use shardbeacon::core::state::stake_store::{MemoryStakeStore, StakeInfo};
use shardbeacon::core::types::{sha256, CommitteePublicKey, ShardId, H256};
use tracing::Span;

pub fn key(n: u8) -> CommitteePublicKey {
    CommitteePublicKey::new(vec![n; 32], vec![n.wrapping_add(100); 32]).unwrap()
}

pub fn ks(n: u8) -> String {
    key(n).to_key_string()
}

pub fn params(version: StateVersion) -> ChainParams {
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

/// Beacon [1,2]; shard 0 [10..13] with substitutes [14,15]; shard 1 [20..23].
pub fn committees() -> GenesisCommittees {
    GenesisCommittees {
        beacon_committee: vec![key(1), key(2)],
        shard_committee: [
            (0, vec![key(10), key(11), key(12), key(13)]),
            (1, vec![key(20), key(21), key(22), key(23)]),
        ]
        .into_iter()
        .collect(),
        shard_substitute: [(0, vec![key(14), key(15)])].into_iter().collect(),
    }
}

pub fn genesis(version: StateVersion) -> CommitteeState {
    CommitteeState::genesis(version, 2, &committees(), 1)
}

pub fn engine(version: StateVersion, stakes: Arc<MemoryStakeStore>) -> CommitteeEngine {
    CommitteeEngine::new(Arc::new(params(version)), stakes, Span::none())
}

pub fn env(beacon_height: u64) -> EngineEnv {
    EngineEnv {
        beacon_height,
        epoch: 1,
        active_shards: 2,
        random_number: 0,
    }
}

pub fn stake_info(n: u8, tx: &str, auto_stake: bool) -> StakeInfo {
    StakeInfo {
        committee_key: ks(n),
        tx_stake: tx.to_string(),
        reward_receiver: format!("r{n}"),
        auto_stake,
        beacon_height: 1,
    }
}

pub fn stake(keys: &[u8], autos: &[bool]) -> Instruction {
    Instruction::Stake(StakeInstruction {
        public_keys: keys.iter().map(|n| key(*n)).collect(),
        chain: StakeChain::Shard,
        tx_stakes: keys.iter().map(|n| format!("tx{n}")).collect(),
        reward_receivers: keys.iter().map(|n| format!("r{n}")).collect(),
        auto_stakes: autos.to_vec(),
    })
}

pub fn stop(keys: &[u8]) -> Instruction {
    Instruction::StopAutoStake(StopAutoStakeInstruction {
        public_keys: keys.iter().map(|n| key(*n)).collect(),
    })
}

pub fn block_hash(shard: ShardId, height: u64) -> H256 {
    let mut b = vec![shard];
    b.extend_from_slice(&height.to_be_bytes());
    sha256(&b)
}

/// Shard block chained to the previous height, optionally carrying a staking tx.
pub fn shard_block(shard: ShardId, height: u64, staker: Option<u8>) -> ShardBlock {
    let transactions = staker
        .map(|n| ShardTransaction {
            hash: sha256(&[shard, n]),
            metadata: Some(TxMetadata::Staking {
                committee_key: key(n),
                chain: StakeChain::Shard,
                reward_receiver: format!("r{n}"),
                auto_stake: true,
            }),
        })
        .into_iter()
        .collect();
    ShardBlock {
        header: ShardHeader {
            shard_id: shard,
            height,
            hash: block_hash(shard, height),
            prev_hash: if height > 1 { block_hash(shard, height - 1) } else { H256::ZERO },
            beacon_height: 1,
            producer: key(90),
            total_txs_fee: 7,
            cross_shard_bitmap: Vec::new(),
            timestamp: height as i64,
        },
        body: ShardBody {
            transactions,
            instructions: Vec::new(),
        },
    }
}
