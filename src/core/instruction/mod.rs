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

//! Committee instructions and their consensus wire codec.
//!
//! On the wire an instruction is an ordered list of UTF-8 strings. The first
//! element is the action tag; list-valued fields are comma-joined. Field
//! counts are part of consensus and are checked exactly.

pub mod extract;

use crate::core::types::{key_strings, parse_key_strings, CommitteePublicKey, KeyError, ShardId};
use thiserror::Error;

/// Raw instruction as carried in blocks.
pub type WireInstruction = Vec<String>;

/// Stake action tag.
pub const STAKE_ACTION: &str = "stake";
/// Swap action tag.
pub const SWAP_ACTION: &str = "swap";
/// Stop-auto-stake action tag.
pub const STOP_AUTO_STAKE_ACTION: &str = "stopautostaking";
/// Assign action tag.
pub const ASSIGN_ACTION: &str = "assign";
/// Random action tag.
pub const RANDOM_ACTION: &str = "random";
/// Finish-sync action tag.
pub const FINISH_SYNC_ACTION: &str = "finishsync";
/// Return-stake action tag.
pub const RETURN_STAKE_ACTION: &str = "returnstaking";
/// Accepted block reward action tag.
pub const ACCEPTED_REWARD_ACTION: &str = "acceptedreward";
/// Epoch reward action tag.
pub const REWARD_BY_EPOCH_ACTION: &str = "rewardbyepoch";

const SHARD_INST: &str = "shard";
const BEACON_INST: &str = "beacon";
const BRIDGE_ACCEPTED: &str = "accepted";
const BRIDGE_REJECTED: &str = "rejected";

/// Wire decoding errors. Callers drop the offending instruction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstructionError {
    /// No fields at all.
    #[error("empty instruction")]
    Empty,
    /// First field names no known action.
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    /// Wrong number of fields for the action.
    #[error("{action}: expected {expected} fields, got {got}")]
    FieldCount {
        /// Action tag.
        action: &'static str,
        /// Field count the action takes.
        expected: usize,
        /// Field count received.
        got: usize,
    },
    /// Parallel sub-lists have different lengths, or a subset list names
    /// keys outside its parent list.
    #[error("{0}: sub-list lengths disagree")]
    CountMismatch(&'static str),
    /// Key list is empty where at least one key is required.
    #[error("{0}: empty key list")]
    NoKeys(&'static str),
    /// A committee key does not parse.
    #[error("bad key: {0}")]
    Key(#[from] KeyError),
    /// Field at this index is not a number in range.
    #[error("bad number in field {0}")]
    Number(usize),
    /// Boolean field is neither `true` nor `false`.
    #[error("bad bool {0:?}")]
    Bool(String),
    /// Chain field is neither `beacon` nor `shard`.
    #[error("bad chain {0:?}")]
    Chain(String),
    /// Bridge status is neither accepted nor rejected.
    #[error("bad bridge status {0:?}")]
    BridgeStatus(String),
}

/// Decoding knobs that are chain parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject stake instructions unless all sub-lists have equal length.
    pub strict_stake_field_counts: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict_stake_field_counts: true,
        }
    }
}

/// Split a comma-joined field. The empty string is the empty list.
pub fn split_csv(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(',').collect()
    }
}

fn join_keys(keys: &[CommitteePublicKey]) -> String {
    key_strings(keys).join(",")
}

fn parse_keys(s: &str) -> Result<Vec<CommitteePublicKey>, InstructionError> {
    Ok(parse_key_strings(&split_csv(s))?)
}

fn parse_num<T: std::str::FromStr>(fields: &[String], idx: usize) -> Result<T, InstructionError> {
    fields[idx].parse().map_err(|_| InstructionError::Number(idx))
}

fn expect_len(fields: &[String], action: &'static str, expected: usize) -> Result<(), InstructionError> {
    if fields.len() != expected {
        return Err(InstructionError::FieldCount {
            action,
            expected,
            got: fields.len(),
        });
    }
    Ok(())
}

/// Which chain a staker joins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StakeChain {
    /// Shard candidate (assigned by randomness).
    Shard,
    /// Beacon candidate.
    Beacon,
}

impl StakeChain {
    fn as_str(self) -> &'static str {
        match self {
            StakeChain::Shard => SHARD_INST,
            StakeChain::Beacon => BEACON_INST,
        }
    }

    fn parse(s: &str) -> Result<Self, InstructionError> {
        match s {
            SHARD_INST => Ok(StakeChain::Shard),
            BEACON_INST => Ok(StakeChain::Beacon),
            other => Err(InstructionError::Chain(other.to_string())),
        }
    }
}

/// `["stake", pks, chain, txs, receivers, autoStakeFlags]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeInstruction {
    /// Stakers.
    pub public_keys: Vec<CommitteePublicKey>,
    /// Destination chain.
    pub chain: StakeChain,
    /// Staking transaction ids, one per staker.
    pub tx_stakes: Vec<String>,
    /// Reward receiver addresses, one per staker.
    pub reward_receivers: Vec<String>,
    /// Auto-stake flags, one per staker.
    pub auto_stakes: Vec<bool>,
}

impl StakeInstruction {
    fn decode(fields: &[String], opts: DecodeOptions) -> Result<Self, InstructionError> {
        expect_len(fields, STAKE_ACTION, 6)?;
        let mut public_keys = parse_keys(&fields[1])?;
        let chain = StakeChain::parse(&fields[2])?;
        let mut tx_stakes: Vec<String> = split_csv(&fields[3]).into_iter().map(str::to_string).collect();
        let mut reward_receivers: Vec<String> =
            split_csv(&fields[4]).into_iter().map(str::to_string).collect();
        let mut auto_stakes = split_csv(&fields[5])
            .into_iter()
            .map(|f| match f {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(InstructionError::Bool(other.to_string())),
            })
            .collect::<Result<Vec<bool>, _>>()?;

        let (k, t, r, a) = (
            public_keys.len(),
            tx_stakes.len(),
            reward_receivers.len(),
            auto_stakes.len(),
        );
        if opts.strict_stake_field_counts {
            if k != t || t != r || r != a {
                return Err(InstructionError::CountMismatch(STAKE_ACTION));
            }
        } else {
            // Legacy rule: rejected only when every adjacent pair differs.
            if k != t && t != r && r != a {
                return Err(InstructionError::CountMismatch(STAKE_ACTION));
            }
            let n = k.min(t).min(r).min(a);
            public_keys.truncate(n);
            tx_stakes.truncate(n);
            reward_receivers.truncate(n);
            auto_stakes.truncate(n);
        }
        if public_keys.is_empty() {
            return Err(InstructionError::NoKeys(STAKE_ACTION));
        }
        Ok(Self {
            public_keys,
            chain,
            tx_stakes,
            reward_receivers,
            auto_stakes,
        })
    }

    fn encode(&self) -> WireInstruction {
        vec![
            STAKE_ACTION.to_string(),
            join_keys(&self.public_keys),
            self.chain.as_str().to_string(),
            self.tx_stakes.join(","),
            self.reward_receivers.join(","),
            self.auto_stakes
                .iter()
                .map(|b| if *b { "true" } else { "false" })
                .collect::<Vec<_>>()
                .join(","),
        ]
    }
}

/// Which committee a swap rotates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SwapTarget {
    /// A shard committee.
    Shard(ShardId),
    /// The beacon committee.
    Beacon,
}

/// `["swap", in, out, "shard", shardID, punished]` or `["swap", in, out, "beacon", punished]`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapInstruction {
    /// Keys promoted from substitutes.
    pub in_public_keys: Vec<CommitteePublicKey>,
    /// Keys leaving the committee.
    pub out_public_keys: Vec<CommitteePublicKey>,
    /// Subset of `out_public_keys` that is slashed.
    pub punished_public_keys: Vec<CommitteePublicKey>,
    /// Target committee.
    pub target: Option<SwapTarget>,
}

impl SwapInstruction {
    /// Target shard, if a shard swap.
    pub fn shard_id(&self) -> Option<ShardId> {
        match self.target {
            Some(SwapTarget::Shard(s)) => Some(s),
            _ => None,
        }
    }

    /// True when nothing moves.
    pub fn is_empty(&self) -> bool {
        self.in_public_keys.is_empty() && self.out_public_keys.is_empty()
    }

    fn decode(fields: &[String]) -> Result<Self, InstructionError> {
        if fields.len() < 4 {
            return Err(InstructionError::FieldCount {
                action: SWAP_ACTION,
                expected: 6,
                got: fields.len(),
            });
        }
        let in_public_keys = parse_keys(&fields[1])?;
        let out_public_keys = parse_keys(&fields[2])?;
        let (target, punished) = match fields[3].as_str() {
            SHARD_INST => {
                expect_len(fields, SWAP_ACTION, 6)?;
                (SwapTarget::Shard(parse_num(fields, 4)?), &fields[5])
            }
            BEACON_INST => {
                expect_len(fields, SWAP_ACTION, 5)?;
                (SwapTarget::Beacon, &fields[4])
            }
            other => return Err(InstructionError::Chain(other.to_string())),
        };
        let punished_public_keys = parse_keys(punished)?;
        if punished_public_keys
            .iter()
            .any(|p| !out_public_keys.contains(p))
        {
            return Err(InstructionError::CountMismatch(SWAP_ACTION));
        }
        Ok(Self {
            in_public_keys,
            out_public_keys,
            punished_public_keys,
            target: Some(target),
        })
    }

    fn encode(&self) -> WireInstruction {
        let mut out = vec![
            SWAP_ACTION.to_string(),
            join_keys(&self.in_public_keys),
            join_keys(&self.out_public_keys),
        ];
        match self.target {
            Some(SwapTarget::Shard(s)) => {
                out.push(SHARD_INST.to_string());
                out.push(s.to_string());
            }
            Some(SwapTarget::Beacon) | None => out.push(BEACON_INST.to_string()),
        }
        out.push(join_keys(&self.punished_public_keys));
        out
    }
}

/// `["stopautostaking", pks]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopAutoStakeInstruction {
    /// Keys whose auto-stake flag is cleared.
    pub public_keys: Vec<CommitteePublicKey>,
}

/// `["assign", pks, "shard", shardID]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignInstruction {
    /// Candidates assigned.
    pub public_keys: Vec<CommitteePublicKey>,
    /// Destination shard.
    pub shard_id: ShardId,
}

/// `["random", nonce, height, timestamp, ""]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomInstruction {
    /// Epoch seed.
    pub nonce: i64,
    /// Beacon height that produced it.
    pub height: u64,
    /// Block timestamp.
    pub timestamp: i64,
}

/// `["finishsync", shardID, pks]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishSyncInstruction {
    /// Shard whose sync pool is drained.
    pub shard_id: ShardId,
    /// Keys that finished syncing.
    pub public_keys: Vec<CommitteePublicKey>,
}

/// `["returnstaking", pks, txs, percents]`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnStakeInstruction {
    /// Keys whose stake is returned.
    pub public_keys: Vec<CommitteePublicKey>,
    /// Original staking transactions.
    pub tx_stakes: Vec<String>,
    /// Percent returned per key.
    pub percent_returns: Vec<u8>,
}

impl ReturnStakeInstruction {
    /// Append one entry.
    pub fn push(&mut self, key: CommitteePublicKey, tx_stake: String, percent: u8) {
        self.public_keys.push(key);
        self.tx_stakes.push(tx_stake);
        self.percent_returns.push(percent);
    }

    /// True when it carries no entry.
    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }

    fn decode(fields: &[String]) -> Result<Self, InstructionError> {
        expect_len(fields, RETURN_STAKE_ACTION, 4)?;
        let public_keys = parse_keys(&fields[1])?;
        let tx_stakes: Vec<String> = split_csv(&fields[2]).into_iter().map(str::to_string).collect();
        let percent_returns = split_csv(&fields[3])
            .into_iter()
            .map(|p| p.parse::<u8>().map_err(|_| InstructionError::Number(3)))
            .collect::<Result<Vec<u8>, _>>()?;
        if public_keys.len() != tx_stakes.len() || tx_stakes.len() != percent_returns.len() {
            return Err(InstructionError::CountMismatch(RETURN_STAKE_ACTION));
        }
        Ok(Self {
            public_keys,
            tx_stakes,
            percent_returns,
        })
    }
}

/// `["acceptedreward", shardID, shardHeight, totalFee]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptedRewardInstruction {
    /// Shard that produced the block.
    pub shard_id: ShardId,
    /// Shard block height.
    pub shard_height: u64,
    /// Total transaction fee of the block.
    pub total_fee: u64,
}

/// `["rewardbyepoch", epoch, shardID, shardReward, beaconReward, custodianReward]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardByEpochInstruction {
    /// Epoch being paid.
    pub epoch: u64,
    /// Shard the fees were collected on.
    pub shard_id: ShardId,
    /// Shard committee share.
    pub shard_reward: u64,
    /// Beacon committee share.
    pub beacon_reward: u64,
    /// Custodian share.
    pub custodian_reward: u64,
}

/// Outcome of a bridge request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Request accepted.
    Accepted,
    /// Request rejected (auditable).
    Rejected,
}

/// `[metaType, shardID, status, content]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeInstruction {
    /// Metadata type of the originating request.
    pub meta_type: u32,
    /// Originating shard.
    pub shard_id: ShardId,
    /// Accepted or rejected.
    pub status: BridgeStatus,
    /// Opaque request content.
    pub content: String,
}

/// A decoded committee instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// New stakers.
    Stake(StakeInstruction),
    /// Committee rotation.
    Swap(SwapInstruction),
    /// Clear auto-stake flags.
    StopAutoStake(StopAutoStakeInstruction),
    /// Candidate assignment.
    Assign(AssignInstruction),
    /// Epoch randomness.
    Random(RandomInstruction),
    /// Sync pool drained to substitutes.
    FinishSync(FinishSyncInstruction),
    /// Returned stake.
    ReturnStake(ReturnStakeInstruction),
    /// Per-shard-block reward bookkeeping.
    AcceptedReward(AcceptedRewardInstruction),
    /// Epoch reward split.
    RewardByEpoch(RewardByEpochInstruction),
    /// Bridge request outcome.
    Bridge(BridgeInstruction),
}

impl Instruction {
    /// Action tag of this instruction.
    pub fn action(&self) -> String {
        match self {
            Instruction::Stake(_) => STAKE_ACTION.to_string(),
            Instruction::Swap(_) => SWAP_ACTION.to_string(),
            Instruction::StopAutoStake(_) => STOP_AUTO_STAKE_ACTION.to_string(),
            Instruction::Assign(_) => ASSIGN_ACTION.to_string(),
            Instruction::Random(_) => RANDOM_ACTION.to_string(),
            Instruction::FinishSync(_) => FINISH_SYNC_ACTION.to_string(),
            Instruction::ReturnStake(_) => RETURN_STAKE_ACTION.to_string(),
            Instruction::AcceptedReward(_) => ACCEPTED_REWARD_ACTION.to_string(),
            Instruction::RewardByEpoch(_) => REWARD_BY_EPOCH_ACTION.to_string(),
            Instruction::Bridge(b) => b.meta_type.to_string(),
        }
    }

    /// Decode one wire instruction.
    pub fn decode(fields: &[String], opts: DecodeOptions) -> Result<Self, InstructionError> {
        let Some(tag) = fields.first() else {
            return Err(InstructionError::Empty);
        };
        match tag.as_str() {
            STAKE_ACTION => Ok(Instruction::Stake(StakeInstruction::decode(fields, opts)?)),
            SWAP_ACTION => Ok(Instruction::Swap(SwapInstruction::decode(fields)?)),
            STOP_AUTO_STAKE_ACTION => {
                expect_len(fields, STOP_AUTO_STAKE_ACTION, 2)?;
                let public_keys = parse_keys(&fields[1])?;
                if public_keys.is_empty() {
                    return Err(InstructionError::NoKeys(STOP_AUTO_STAKE_ACTION));
                }
                Ok(Instruction::StopAutoStake(StopAutoStakeInstruction { public_keys }))
            }
            ASSIGN_ACTION => {
                expect_len(fields, ASSIGN_ACTION, 4)?;
                if fields[2] != SHARD_INST {
                    return Err(InstructionError::Chain(fields[2].clone()));
                }
                Ok(Instruction::Assign(AssignInstruction {
                    public_keys: parse_keys(&fields[1])?,
                    shard_id: parse_num(fields, 3)?,
                }))
            }
            RANDOM_ACTION => {
                expect_len(fields, RANDOM_ACTION, 5)?;
                Ok(Instruction::Random(RandomInstruction {
                    nonce: parse_num(fields, 1)?,
                    height: parse_num(fields, 2)?,
                    timestamp: parse_num(fields, 3)?,
                }))
            }
            FINISH_SYNC_ACTION => {
                expect_len(fields, FINISH_SYNC_ACTION, 3)?;
                let public_keys = parse_keys(&fields[2])?;
                if public_keys.is_empty() {
                    return Err(InstructionError::NoKeys(FINISH_SYNC_ACTION));
                }
                Ok(Instruction::FinishSync(FinishSyncInstruction {
                    shard_id: parse_num(fields, 1)?,
                    public_keys,
                }))
            }
            RETURN_STAKE_ACTION => Ok(Instruction::ReturnStake(ReturnStakeInstruction::decode(fields)?)),
            ACCEPTED_REWARD_ACTION => {
                expect_len(fields, ACCEPTED_REWARD_ACTION, 4)?;
                Ok(Instruction::AcceptedReward(AcceptedRewardInstruction {
                    shard_id: parse_num(fields, 1)?,
                    shard_height: parse_num(fields, 2)?,
                    total_fee: parse_num(fields, 3)?,
                }))
            }
            REWARD_BY_EPOCH_ACTION => {
                expect_len(fields, REWARD_BY_EPOCH_ACTION, 6)?;
                Ok(Instruction::RewardByEpoch(RewardByEpochInstruction {
                    epoch: parse_num(fields, 1)?,
                    shard_id: parse_num(fields, 2)?,
                    shard_reward: parse_num(fields, 3)?,
                    beacon_reward: parse_num(fields, 4)?,
                    custodian_reward: parse_num(fields, 5)?,
                }))
            }
            other => {
                let Ok(meta_type) = other.parse::<u32>() else {
                    return Err(InstructionError::UnknownAction(other.to_string()));
                };
                expect_len(fields, "bridge", 4)?;
                let status = match fields[2].as_str() {
                    BRIDGE_ACCEPTED => BridgeStatus::Accepted,
                    BRIDGE_REJECTED => BridgeStatus::Rejected,
                    s => return Err(InstructionError::BridgeStatus(s.to_string())),
                };
                Ok(Instruction::Bridge(BridgeInstruction {
                    meta_type,
                    shard_id: parse_num(fields, 1)?,
                    status,
                    content: fields[3].clone(),
                }))
            }
        }
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> WireInstruction {
        match self {
            Instruction::Stake(s) => s.encode(),
            Instruction::Swap(s) => s.encode(),
            Instruction::StopAutoStake(s) => {
                vec![STOP_AUTO_STAKE_ACTION.to_string(), join_keys(&s.public_keys)]
            }
            Instruction::Assign(a) => vec![
                ASSIGN_ACTION.to_string(),
                join_keys(&a.public_keys),
                SHARD_INST.to_string(),
                a.shard_id.to_string(),
            ],
            Instruction::Random(r) => vec![
                RANDOM_ACTION.to_string(),
                r.nonce.to_string(),
                r.height.to_string(),
                r.timestamp.to_string(),
                String::new(),
            ],
            Instruction::FinishSync(f) => vec![
                FINISH_SYNC_ACTION.to_string(),
                f.shard_id.to_string(),
                join_keys(&f.public_keys),
            ],
            Instruction::ReturnStake(r) => vec![
                RETURN_STAKE_ACTION.to_string(),
                join_keys(&r.public_keys),
                r.tx_stakes.join(","),
                r.percent_returns
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ],
            Instruction::AcceptedReward(a) => vec![
                ACCEPTED_REWARD_ACTION.to_string(),
                a.shard_id.to_string(),
                a.shard_height.to_string(),
                a.total_fee.to_string(),
            ],
            Instruction::RewardByEpoch(r) => vec![
                REWARD_BY_EPOCH_ACTION.to_string(),
                r.epoch.to_string(),
                r.shard_id.to_string(),
                r.shard_reward.to_string(),
                r.beacon_reward.to_string(),
                r.custodian_reward.to_string(),
            ],
            Instruction::Bridge(b) => vec![
                b.meta_type.to_string(),
                b.shard_id.to_string(),
                match b.status {
                    BridgeStatus::Accepted => BRIDGE_ACCEPTED.to_string(),
                    BridgeStatus::Rejected => BRIDGE_REJECTED.to_string(),
                },
                b.content.clone(),
            ],
        }
    }
}

/// Encode a list of instructions.
pub fn encode_all(insts: &[Instruction]) -> Vec<WireInstruction> {
    insts.iter().map(Instruction::encode).collect()
}


#[cfg(test)]
mod tests {
    use super::test_keys::{key, ks};
    use super::*;

    fn w(fields: &[&str]) -> WireInstruction {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stake_decodes_and_reencodes_identically() {
        let pks = format!("{},{}", ks(1), ks(2));
        let raw = w(&["stake", &pks, "shard", "tx1,tx2", "r1,r2", "true,false"]);
        let inst = Instruction::decode(&raw, DecodeOptions::default()).unwrap();
        let Instruction::Stake(s) = &inst else { panic!("not stake") };
        assert_eq!(s.public_keys, vec![key(1), key(2)]);
        assert_eq!(s.auto_stakes, vec![true, false]);
        assert_eq!(inst.encode(), raw);
    }

    #[test]
    fn stake_count_rules() {
        let pks = format!("{},{}", ks(1), ks(2));
        // one short tx list: strict rejects, legacy accepts and truncates
        let raw = w(&["stake", &pks, "shard", "tx1", "r1,r2", "true,false"]);
        assert_eq!(
            Instruction::decode(&raw, DecodeOptions::default()),
            Err(InstructionError::CountMismatch(STAKE_ACTION))
        );
        let legacy = DecodeOptions { strict_stake_field_counts: false };
        let Instruction::Stake(s) = Instruction::decode(&raw, legacy).unwrap() else {
            panic!("not stake")
        };
        assert_eq!(s.public_keys, vec![key(1)]);
        assert_eq!(s.tx_stakes, vec!["tx1".to_string()]);

        // every adjacent pair differs: rejected in both modes
        let raw = w(&["stake", &pks, "shard", "tx1", "r1,r2,r3", "true"]);
        assert!(Instruction::decode(&raw, legacy).is_err());

        let raw = w(&["stake", &pks, "shard", "tx1,tx2", "r1,r2"]);
        assert!(matches!(
            Instruction::decode(&raw, DecodeOptions::default()),
            Err(InstructionError::FieldCount { expected: 6, got: 5, .. })
        ));
    }

    #[test]
    fn swap_forms() {
        let raw = w(&["swap", &ks(5), &ks(1), "shard", "0", ""]);
        let Instruction::Swap(s) = Instruction::decode(&raw, DecodeOptions::default()).unwrap() else {
            panic!("not swap")
        };
        assert_eq!(s.shard_id(), Some(0));
        assert!(s.punished_public_keys.is_empty());

        let raw = w(&["swap", "", &ks(1), "beacon", &ks(1)]);
        let inst = Instruction::decode(&raw, DecodeOptions::default()).unwrap();
        assert_eq!(inst.encode(), raw);

        // punished must be a subset of out
        let raw = w(&["swap", &ks(5), &ks(1), "shard", "0", &ks(2)]);
        assert!(Instruction::decode(&raw, DecodeOptions::default()).is_err());
        let raw = w(&["swap", &ks(5), &ks(1), "shard", "0"]);
        assert!(Instruction::decode(&raw, DecodeOptions::default()).is_err());
    }

    #[test]
    fn stop_auto_stake_requires_two_fields() {
        let ok = w(&["stopautostaking", &ks(3)]);
        assert!(Instruction::decode(&ok, DecodeOptions::default()).is_ok());
        let bad = w(&["stopautostaking", &ks(3), "extra"]);
        assert!(Instruction::decode(&bad, DecodeOptions::default()).is_err());
    }

    #[test]
    fn misc_forms() {
        let opts = DecodeOptions::default();
        let r = Instruction::Random(RandomInstruction { nonce: -5, height: 12, timestamp: 99 });
        assert_eq!(r.encode(), w(&["random", "-5", "12", "99", ""]));
        assert_eq!(Instruction::decode(&r.encode(), opts).unwrap(), r);

        let b = w(&["24", "1", "rejected", "abcd"]);
        assert!(matches!(Instruction::decode(&b, opts).unwrap(), Instruction::Bridge(_)));
        assert!(Instruction::decode(&w(&["24", "1", "maybe", ""]), opts).is_err());

        assert_eq!(
            Instruction::decode(&w(&["bogus"]), opts),
            Err(InstructionError::UnknownAction("bogus".into()))
        );
        assert_eq!(Instruction::decode(&[], opts), Err(InstructionError::Empty));

        let rs = w(&["returnstaking", &ks(1), "tx1", "100"]);
        assert_eq!(Instruction::decode(&rs, opts).unwrap().encode(), rs);
    }
}
