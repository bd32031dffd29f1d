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

//! Instruction extraction from shard blocks.
//!
//! Pure per block: transaction metadata is turned into wire instructions,
//! explicit instructions are appended, then everything is decoded and
//! filtered. Malformed entries are dropped and counted, never fatal.

use crate::core::instruction::{
    DecodeOptions, FinishSyncInstruction, Instruction, StakeChain, StakeInstruction,
    StopAutoStakeInstruction, SwapInstruction, SwapTarget, WireInstruction, STOP_AUTO_STAKE_ACTION,
};
use crate::core::producer::shard_state::{ShardBlock, TxMetadata};
use crate::core::types::{key_strings, ShardId, H256};
use std::collections::BTreeSet;
use tracing::debug;

/// Bridge request found in a shard block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeRequest {
    /// Metadata type.
    pub meta_type: u32,
    /// Originating shard.
    pub shard_id: ShardId,
    /// Originating transaction.
    pub tx_hash: H256,
    /// Opaque request body.
    pub content: String,
}

/// Classified instructions of one shard block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedShardBlock {
    /// Well-formed stake instructions, in block order.
    pub stakes: Vec<StakeInstruction>,
    /// Swaps targeting the block's own shard.
    pub swaps: Vec<SwapInstruction>,
    /// Well-formed stop-auto-stake instructions.
    pub stop_auto_stakes: Vec<StopAutoStakeInstruction>,
    /// Finish-sync reports for the block's own shard.
    pub finish_syncs: Vec<FinishSyncInstruction>,
    /// Bridge requests.
    pub bridge_requests: Vec<BridgeRequest>,
    /// Entries dropped as malformed or not allowed from a shard.
    pub dropped: usize,
}

/// Wire instructions derived from staking transactions.
///
/// Shard stakers and beacon stakers each become one stake instruction; stop
/// requests become one stop-auto-stake instruction.
pub fn instructions_from_transactions(block: &ShardBlock) -> Vec<WireInstruction> {
    let mut shard = StakeInstruction {
        public_keys: Vec::new(),
        chain: StakeChain::Shard,
        tx_stakes: Vec::new(),
        reward_receivers: Vec::new(),
        auto_stakes: Vec::new(),
    };
    let mut beacon = StakeInstruction {
        chain: StakeChain::Beacon,
        ..shard.clone()
    };
    let mut stop = Vec::new();

    for tx in block.body.transactions.iter() {
        match &tx.metadata {
            Some(TxMetadata::Staking {
                committee_key,
                chain,
                reward_receiver,
                auto_stake,
            }) => {
                let target = match chain {
                    StakeChain::Shard => &mut shard,
                    StakeChain::Beacon => &mut beacon,
                };
                target.public_keys.push(committee_key.clone());
                target.tx_stakes.push(tx.hash.to_string());
                target.reward_receivers.push(reward_receiver.clone());
                target.auto_stakes.push(*auto_stake);
            }
            Some(TxMetadata::StopAutoStaking { committee_key }) => stop.push(committee_key.clone()),
            _ => {}
        }
    }

    let mut out = Vec::new();
    for s in [shard, beacon] {
        if !s.public_keys.is_empty() {
            out.push(Instruction::Stake(s).encode());
        }
    }
    if !stop.is_empty() {
        out.push(Instruction::StopAutoStake(StopAutoStakeInstruction { public_keys: stop }).encode());
    }
    out
}

/// Extract and classify the instructions of one shard block.
pub fn extract_shard_block(block: &ShardBlock, opts: DecodeOptions) -> ExtractedShardBlock {
    let shard_id = block.header.shard_id;
    let mut out = ExtractedShardBlock::default();

    for tx in block.body.transactions.iter() {
        if let Some(TxMetadata::Bridge { meta_type, content }) = &tx.metadata {
            out.bridge_requests.push(BridgeRequest {
                meta_type: *meta_type,
                shard_id,
                tx_hash: tx.hash,
                content: content.clone(),
            });
        }
    }

    let derived = instructions_from_transactions(block);
    for raw in derived.iter().chain(block.body.instructions.iter()) {
        let inst = match Instruction::decode(raw, opts) {
            Ok(i) => i,
            Err(e) => {
                debug!(shard = shard_id, height = block.header.height, error = %e, "drop malformed instruction");
                out.dropped += 1;
                continue;
            }
        };
        match inst {
            Instruction::Stake(s) => out.stakes.push(s),
            Instruction::Swap(s) => match s.target {
                Some(SwapTarget::Shard(target)) if target == shard_id => out.swaps.push(s),
                _ => {
                    debug!(shard = shard_id, "drop swap not targeting own shard");
                    out.dropped += 1;
                }
            },
            Instruction::StopAutoStake(s) => out.stop_auto_stakes.push(s),
            Instruction::FinishSync(f) if f.shard_id == shard_id => out.finish_syncs.push(f),
            other => {
                debug!(shard = shard_id, action = %other.action(), "drop instruction not accepted from shard");
                out.dropped += 1;
            }
        }
    }
    out
}

/// Staker admission across one beacon height.
///
/// A key is rejected if it is already a validator or candidate in the
/// committed view, or was admitted earlier at this height. Feed shard blocks in
/// shard-ascending then height-ascending order.
#[derive(Clone, Debug, Default)]
pub struct StakerFilter {
    known: BTreeSet<String>,
    admitted: BTreeSet<String>,
}

impl StakerFilter {
    /// Start from the committed view's full validator/candidate set.
    pub fn new(known: BTreeSet<String>) -> Self {
        Self {
            known,
            admitted: BTreeSet::new(),
        }
    }

    /// Keep only unseen stakers (with their parallel entries).
    pub fn admit(&mut self, stake: &StakeInstruction) -> Option<StakeInstruction> {
        let mut out = StakeInstruction {
            public_keys: Vec::new(),
            chain: stake.chain,
            tx_stakes: Vec::new(),
            reward_receivers: Vec::new(),
            auto_stakes: Vec::new(),
        };
        let rows = stake
            .public_keys
            .iter()
            .zip(stake.tx_stakes.iter())
            .zip(stake.reward_receivers.iter())
            .zip(stake.auto_stakes.iter());
        for (((key, tx), receiver), auto) in rows {
            let ks = key.to_key_string();
            if self.known.contains(&ks) || !self.admitted.insert(ks) {
                continue;
            }
            out.public_keys.push(key.clone());
            out.tx_stakes.push(tx.clone());
            out.reward_receivers.push(receiver.clone());
            out.auto_stakes.push(*auto);
        }
        (!out.public_keys.is_empty()).then_some(out)
    }

    /// Keys admitted so far.
    pub fn admitted(&self) -> &BTreeSet<String> {
        &self.admitted
    }
}

/// Merge admitted stakes of one shard block into at most one instruction per chain.
pub fn merge_stakes(stakes: Vec<StakeInstruction>) -> Vec<StakeInstruction> {
    let mut merged: Vec<StakeInstruction> = Vec::new();
    for chain in [StakeChain::Shard, StakeChain::Beacon] {
        let mut acc: Option<StakeInstruction> = None;
        for s in stakes.iter().filter(|s| s.chain == chain) {
            match acc.as_mut() {
                None => acc = Some(s.clone()),
                Some(a) => {
                    a.public_keys.extend(s.public_keys.iter().cloned());
                    a.tx_stakes.extend(s.tx_stakes.iter().cloned());
                    a.reward_receivers.extend(s.reward_receivers.iter().cloned());
                    a.auto_stakes.extend(s.auto_stakes.iter().copied());
                }
            }
        }
        merged.extend(acc);
    }
    merged
}

/// Keep stop requests only for keys present in `members`, merged into one instruction.
pub fn filter_stop_auto_stakes(
    insts: &[StopAutoStakeInstruction],
    members: &BTreeSet<String>,
) -> Option<StopAutoStakeInstruction> {
    let mut seen = BTreeSet::new();
    let public_keys: Vec<_> = insts
        .iter()
        .flat_map(|i| i.public_keys.iter())
        .filter(|k| {
            let ks = k.to_key_string();
            members.contains(&ks) && seen.insert(ks)
        })
        .cloned()
        .collect();
    if public_keys.is_empty() {
        None
    } else {
        debug!(
            action = STOP_AUTO_STAKE_ACTION,
            keys = ?key_strings(&public_keys),
            "stop auto stake accepted"
        );
        Some(StopAutoStakeInstruction { public_keys })
    }
}
