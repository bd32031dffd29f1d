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

//! Shard blocks as seen by the beacon chain, and the per-shard state summary
//! a beacon block commits to.

use crate::core::instruction::{StakeChain, WireInstruction};
use crate::core::types::{CommitteePublicKey, ShardId, H256};
use serde::{Deserialize, Serialize};

/// Metadata carried by a shard transaction that the beacon cares about.
///
/// Proof validity is established by the shard before the block reaches the
/// pool; transactions here are already valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxMetadata {
    /// Stake a committee key.
    Staking {
        /// Staker.
        committee_key: CommitteePublicKey,
        /// Destination chain.
        chain: StakeChain,
        /// Payment address for rewards.
        reward_receiver: String,
        /// Re-stake automatically when rotated out.
        auto_stake: bool,
    },
    /// Stop auto-staking a committee key.
    StopAutoStaking {
        /// Key to stop.
        committee_key: CommitteePublicKey,
    },
    /// Bridge request (issuing or contracting).
    Bridge {
        /// Metadata type.
        meta_type: u32,
        /// Opaque request body.
        content: String,
    },
}

/// Shard transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardTransaction {
    /// Transaction hash.
    pub hash: H256,
    /// Beacon-relevant metadata, if any.
    pub metadata: Option<TxMetadata>,
}

/// Shard block header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardHeader {
    /// Shard.
    pub shard_id: ShardId,
    /// Shard height.
    pub height: u64,
    /// Block hash.
    pub hash: H256,
    /// Parent hash.
    pub prev_hash: H256,
    /// Beacon height the shard block was built on.
    pub beacon_height: u64,
    /// Producer committee key.
    pub producer: CommitteePublicKey,
    /// Sum of transaction fees.
    pub total_txs_fee: u64,
    /// Cross-shard output bitmap.
    pub cross_shard_bitmap: Vec<u8>,
    /// Timestamp (seconds).
    pub timestamp: i64,
}

/// Shard block body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardBody {
    /// Transactions.
    pub transactions: Vec<ShardTransaction>,
    /// Explicit instructions.
    pub instructions: Vec<WireInstruction>,
}

/// Shard block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardBlock {
    /// Header.
    pub header: ShardHeader,
    /// Body.
    pub body: ShardBody,
}

/// What a beacon block records for each included shard block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardState {
    /// Shard block height.
    pub height: u64,
    /// Shard block hash.
    pub hash: H256,
    /// Parent shard block hash.
    pub prev_hash: H256,
    /// Fees collected by the shard block.
    pub total_fee: u64,
    /// Cross-shard bitmap.
    pub cross_shard: Vec<u8>,
}

impl From<&ShardBlock> for ShardState {
    fn from(b: &ShardBlock) -> Self {
        Self {
            height: b.header.height,
            hash: b.header.hash,
            prev_hash: b.header.prev_hash,
            total_fee: b.header.total_txs_fee,
            cross_shard: b.header.cross_shard_bitmap.clone(),
        }
    }
}
