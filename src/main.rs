#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shardbeacon node entrypoint (systemd-friendly).
//! Loads the chain config, restores genesis and produces beacon blocks on a timer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn, Level};

use shardbeacon::core::committee::engine::CommitteeEngine;
use shardbeacon::core::committee::state::CommitteeState;
use shardbeacon::core::committee::store::{BeaconView, CommitteeStore};
use shardbeacon::core::config::{LogConfig, NodeConfig};
use shardbeacon::core::economics::reward::MemoryRewardAccumulator;
use shardbeacon::core::producer::beacon::BeaconProducer;
use shardbeacon::core::producer::bridge::{DefaultBridgeBuilder, MemoryFeatureState};
use shardbeacon::core::producer::insert::BlockInserter;
use shardbeacon::core::producer::pool::MemoryShardPool;
use shardbeacon::core::state::stake_store::{StakeInfo, StakeInfoWriter, StakeStore};
use shardbeacon::core::types::{encode_canonical, sha256, CommitteePublicKey, H256};
use shardbeacon::monitoring::metrics::Metrics;

const SHARD_POOL_CAPACITY: usize = 1024;
const COMMITTEE_KEY_FILE: &str = "committee.key";

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn init_tracing(log: &LogConfig) {
    let level = log
        .level
        .as_deref()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level);
    let _ = if log.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

fn load_producer_key(data_dir: &Path) -> Result<CommitteePublicKey> {
    let path = data_dir.join(COMMITTEE_KEY_FILE);
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("read {} (run keygen first)", path.display()))?;
    CommitteePublicKey::from_key_string(s.trim()).context("parse committee key")
}

fn genesis_view(cfg: &NodeConfig) -> Result<BeaconView> {
    let committees = cfg.genesis.committees()?;
    let state = CommitteeState::genesis(
        cfg.chain.state_version,
        cfg.chain.active_shards,
        &committees,
        1,
    );
    if let Err(e) = state.check_invariants() {
        bail!("genesis committee: {e}");
    }
    let genesis_hash = sha256(&encode_canonical(&cfg.genesis)?);
    Ok(BeaconView::genesis(
        state,
        cfg.chain.active_shards,
        genesis_hash,
        cfg.genesis.timestamp,
    ))
}

fn genesis_stake_infos(view: &BeaconView) -> Vec<StakeInfo> {
    view.committee
        .all_members()
        .into_iter()
        .map(|(k, _)| StakeInfo {
            committee_key: k.to_key_string(),
            tx_stake: H256::ZERO.to_string(),
            reward_receiver: String::new(),
            auto_stake: true,
            beacon_height: view.beacon_height,
        })
        .collect()
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg_path = env("SHARDBEACON_CONFIG", "./shardbeacon.toml");
    let mut cfg = NodeConfig::load(&cfg_path).with_context(|| format!("load config {cfg_path}"))?;
    if let Ok(dir) = std::env::var("SHARDBEACON_DATA_DIR") {
        cfg.node.data_dir = dir;
    }
    init_tracing(&cfg.log);

    info!(
        node = %cfg.node.name,
        data_dir = %cfg.node.data_dir,
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
        "shardbeacon node starting"
    );

    let data_dir = PathBuf::from(&cfg.node.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("create {}", data_dir.display()))?;
    let producer_key = load_producer_key(&data_dir)?;

    let stake_path = data_dir.join("stake");
    let stake_store = Arc::new(StakeStore::open(&stake_path.to_string_lossy())?);
    let genesis = genesis_view(&cfg)?;
    stake_store.put_all(&genesis_stake_infos(&genesis))?;

    let metrics = Arc::new(Metrics::new()?);
    let params = Arc::new(cfg.chain.clone());
    let engine = Arc::new(CommitteeEngine::new(
        params,
        stake_store.clone(),
        tracing::info_span!("engine"),
    ));
    let pool = Arc::new(MemoryShardPool::new(SHARD_POOL_CAPACITY));
    let rewards = Arc::new(MemoryRewardAccumulator::default());
    let store = Arc::new(CommitteeStore::new(genesis, cfg.chain.max_history));
    let producer = BeaconProducer::new(
        engine.clone(),
        pool.clone(),
        rewards.clone(),
        Arc::new(DefaultBridgeBuilder::new(Arc::new(MemoryFeatureState::default()))),
        metrics.clone(),
        tracing::info_span!("producer"),
    );
    let inserter = BlockInserter::new(
        engine,
        store.clone(),
        stake_store,
        pool,
        rewards,
        metrics.clone(),
        tracing::info_span!("insert"),
    );

    let mut tick = tokio::time::interval(Duration::from_millis(cfg.node.block_interval_ms));
    let mut round: u32 = 0;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            r = tokio::signal::ctrl_c() => {
                if let Err(e) = r {
                    error!(error = %e, "signal handler failed");
                }
                break;
            }
        }

        let parent = match store.snapshot() {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "committee store unavailable");
                break;
            }
        };
        let produced = match producer.produce(&parent, producer_key.clone(), round, unix_now()) {
            Ok(p) => p,
            Err(_) => {
                round = round.saturating_add(1);
                continue;
            }
        };
        match inserter.insert(&produced.block) {
            Ok(change) => {
                round = 0;
                if !change.is_empty() {
                    info!(height = produced.view.beacon_height, churn = change.committee_churn(), "committee changed");
                }
            }
            Err(e) => {
                warn!(height = produced.view.beacon_height, error = %e, "own block not inserted");
                round = round.saturating_add(1);
            }
        }
    }

    let metrics_path = data_dir.join("metrics.prom");
    std::fs::write(&metrics_path, metrics.render()?)
        .with_context(|| format!("write {}", metrics_path.display()))?;
    let (height, hash) = store.tip()?;
    info!(height, hash = %hash, "shardbeacon node stopped");
    Ok(())
}
