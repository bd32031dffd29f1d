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

//! Node configuration (TOML) and chain parameters.

use crate::core::types::{parse_key_strings, CommitteePublicKey, KeyError, ShardId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Read(String),
    #[error("parse config: {0}")]
    Parse(String),
    #[error("invalid chain params: {0}")]
    Invalid(&'static str),
    #[error("invalid genesis key: {0}")]
    GenesisKey(#[from] KeyError),
}

/// Committee-state representation version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StateVersion {
    /// Slashing-aware base: swapped-out validators re-enter substitutes directly.
    Slashing,
    /// Sync-pool aware: new and re-assigned validators sync before becoming substitutes.
    SyncPool,
}

impl TryFrom<u8> for StateVersion {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            2 => Ok(StateVersion::Slashing),
            3 => Ok(StateVersion::SyncPool),
            other => Err(format!("unsupported state version {other}")),
        }
    }
}

impl From<StateVersion> for u8 {
    fn from(v: StateVersion) -> u8 {
        match v {
            StateVersion::Slashing => 2,
            StateVersion::SyncPool => 3,
        }
    }
}

/// Consensus parameters shared by every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Beacon heights per epoch.
    pub epoch_length: u64,
    /// Offset inside an epoch after which the random instruction may be produced.
    pub random_time: u64,
    /// Number of active shards.
    pub active_shards: u8,
    /// Minimum shard committee size.
    pub min_shard_committee_size: usize,
    /// Maximum shard committee size.
    pub max_shard_committee_size: usize,
    /// Minimum beacon committee size.
    pub min_beacon_committee_size: usize,
    /// Maximum beacon committee size.
    pub max_beacon_committee_size: usize,
    /// Leading shard committee members that are never swapped.
    #[serde(default)]
    pub fixed_shard_validators: usize,
    /// Leading beacon committee members that are never swapped.
    #[serde(default)]
    pub fixed_beacon_validators: usize,
    /// Maximum number of validators swapped out per swap.
    pub swap_offset: usize,
    /// Maximum number of candidates assigned to one shard per epoch.
    pub assign_offset: usize,
    /// Substitute list cap per shard (0 = unlimited).
    #[serde(default)]
    pub max_substitute_size: usize,
    /// Committee term limit in beacon heights (0 = disabled).
    #[serde(default)]
    pub max_term_length: u64,
    /// Percent of stake returned to punished validators.
    #[serde(default = "default_punished_return_percent")]
    pub punished_return_percent: u8,
    /// Committee-state version.
    pub state_version: StateVersion,
    /// Require every stake sub-list to have the same length.
    ///
    /// When false the legacy check is kept: an entry is rejected only if all
    /// three adjacent length pairs differ.
    #[serde(default = "default_true")]
    pub strict_stake_field_counts: bool,
    /// Custodian reward share (percent) when locked collateral is above the minimum.
    #[serde(default)]
    pub max_percent_custodian_rewards: u64,
    /// Custodian reward share (percent) when locked collateral is below the minimum.
    #[serde(default)]
    pub min_percent_custodian_rewards: u64,
    /// Collateral threshold switching between the two custodian shares.
    #[serde(default)]
    pub min_lock_collateral_in_epoch: u64,
    /// Committed views retained for revert.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_punished_return_percent() -> u8 {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_history() -> usize {
    64
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            epoch_length: 100,
            random_time: 50,
            active_shards: 2,
            min_shard_committee_size: 4,
            max_shard_committee_size: 8,
            min_beacon_committee_size: 4,
            max_beacon_committee_size: 8,
            fixed_shard_validators: 0,
            fixed_beacon_validators: 0,
            swap_offset: 1,
            assign_offset: 2,
            max_substitute_size: 0,
            max_term_length: 0,
            punished_return_percent: default_punished_return_percent(),
            state_version: StateVersion::SyncPool,
            strict_stake_field_counts: true,
            max_percent_custodian_rewards: 10,
            min_percent_custodian_rewards: 5,
            min_lock_collateral_in_epoch: 0,
            max_history: default_max_history(),
        }
    }
}

impl ChainParams {
    /// Reject inconsistent parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_length < 2 {
            return Err(ConfigError::Invalid("epoch_length must be >= 2"));
        }
        if self.random_time >= self.epoch_length {
            return Err(ConfigError::Invalid("random_time must be inside the epoch"));
        }
        if self.active_shards == 0 {
            return Err(ConfigError::Invalid("active_shards must be > 0"));
        }
        if self.min_shard_committee_size > self.max_shard_committee_size {
            return Err(ConfigError::Invalid("shard committee min > max"));
        }
        if self.min_beacon_committee_size > self.max_beacon_committee_size {
            return Err(ConfigError::Invalid("beacon committee min > max"));
        }
        if self.fixed_shard_validators > self.min_shard_committee_size {
            return Err(ConfigError::Invalid("fixed shard validators exceed min committee size"));
        }
        if self.fixed_beacon_validators > self.min_beacon_committee_size {
            return Err(ConfigError::Invalid("fixed beacon validators exceed min committee size"));
        }
        if self.punished_return_percent > 100 {
            return Err(ConfigError::Invalid("punished_return_percent > 100"));
        }
        if self.max_percent_custodian_rewards > 100 || self.min_percent_custodian_rewards > 100 {
            return Err(ConfigError::Invalid("custodian reward percent > 100"));
        }
        Ok(())
    }

    /// True for the first height of an epoch.
    pub fn is_epoch_start(&self, height: u64) -> bool {
        height % self.epoch_length == 1
    }

    /// True for the last height of an epoch (beacon and shard swaps happen here).
    pub fn is_epoch_end(&self, height: u64) -> bool {
        height % self.epoch_length == 0
    }
}

/// Source of chain parameters by height.
pub trait ChainParamProvider: Send + Sync {
    /// Parameters in force at `beacon_height`.
    fn params_at(&self, beacon_height: u64) -> &ChainParams;
}

impl ChainParamProvider for ChainParams {
    fn params_at(&self, _beacon_height: u64) -> &ChainParams {
        self
    }
}

/// Genesis committee lists (key strings).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Genesis beacon committee.
    pub beacon_committee: Vec<String>,
    /// Genesis shard committees, keyed by decimal shard id.
    pub shard_committee: BTreeMap<String, Vec<String>>,
    /// Genesis shard substitutes, keyed by decimal shard id.
    #[serde(default)]
    pub shard_substitute: BTreeMap<String, Vec<String>>,
    /// Genesis timestamp (seconds).
    #[serde(default)]
    pub timestamp: i64,
}

/// Parsed genesis committees.
#[derive(Clone, Debug, Default)]
pub struct GenesisCommittees {
    /// Beacon committee.
    pub beacon_committee: Vec<CommitteePublicKey>,
    /// Shard committees.
    pub shard_committee: BTreeMap<ShardId, Vec<CommitteePublicKey>>,
    /// Shard substitutes.
    pub shard_substitute: BTreeMap<ShardId, Vec<CommitteePublicKey>>,
}

fn parse_shard_map(
    m: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<ShardId, Vec<CommitteePublicKey>>, ConfigError> {
    let mut out = BTreeMap::new();
    for (sid, keys) in m.iter() {
        let shard: ShardId = sid
            .parse()
            .map_err(|_| ConfigError::Invalid("genesis shard id"))?;
        out.insert(shard, parse_key_strings(keys)?);
    }
    Ok(out)
}

impl GenesisConfig {
    /// Parse key strings.
    pub fn committees(&self) -> Result<GenesisCommittees, ConfigError> {
        Ok(GenesisCommittees {
            beacon_committee: parse_key_strings(&self.beacon_committee)?,
            shard_committee: parse_shard_map(&self.shard_committee)?,
            shard_substitute: parse_shard_map(&self.shard_substitute)?,
        })
    }
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (stake-info db).
    pub data_dir: String,
    /// Beacon block interval in milliseconds.
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
}

fn default_block_interval_ms() -> u64 {
    10_000
}

/// Logging settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level filter, e.g. "info".
    #[serde(default)]
    pub level: Option<String>,
    /// JSON output instead of compact text.
    #[serde(default)]
    pub json: bool,
}

/// Node configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    pub node: NodeSettings,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
    /// Chain parameters.
    pub chain: ChainParams,
    /// Genesis committees.
    pub genesis: GenesisConfig,
}

impl NodeConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: NodeConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.chain.validate()?;
        for sid in cfg.genesis.shard_committee.keys() {
            let shard: u8 = sid
                .parse()
                .map_err(|_| ConfigError::Invalid("genesis shard id"))?;
            if shard >= cfg.chain.active_shards {
                return Err(ConfigError::Invalid("genesis shard id out of range"));
            }
        }
        Ok(cfg)
    }

    /// Load from a file path.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_toml_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[node]
name = "beacon-0"
data_dir = "./data"

[log]
level = "debug"

[chain]
epoch_length = 10
random_time = 5
active_shards = 2
min_shard_committee_size = 4
max_shard_committee_size = 6
min_beacon_committee_size = 4
max_beacon_committee_size = 4
swap_offset = 1
assign_offset = 2
state_version = 3

[genesis]
beacon_committee = []

[genesis.shard_committee]
"0" = []
"1" = []
"#;

    #[test]
    fn parses_sample_config() {
        let cfg = NodeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.chain.epoch_length, 10);
        assert_eq!(cfg.chain.state_version, StateVersion::SyncPool);
        assert!(cfg.chain.strict_stake_field_counts);
        assert_eq!(cfg.chain.punished_return_percent, 100);
        assert_eq!(cfg.node.block_interval_ms, 10_000);
    }

    #[test]
    fn rejects_bad_params() {
        let bad = SAMPLE.replace("random_time = 5", "random_time = 10");
        assert!(matches!(NodeConfig::from_toml_str(&bad), Err(ConfigError::Invalid(_))));

        let bad = SAMPLE.replace("state_version = 3", "state_version = 7");
        assert!(matches!(NodeConfig::from_toml_str(&bad), Err(ConfigError::Parse(_))));

        let bad = SAMPLE.replace("\"1\" = []", "\"5\" = []");
        assert!(matches!(NodeConfig::from_toml_str(&bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn epoch_boundaries() {
        let p = ChainParams { epoch_length: 10, random_time: 5, ..ChainParams::default() };
        assert!(p.is_epoch_start(1));
        assert!(p.is_epoch_start(11));
        assert!(!p.is_epoch_start(10));
        assert!(p.is_epoch_end(20));
    }
}
