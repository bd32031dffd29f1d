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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Canonical beacon height.
    pub beacon_height: IntGauge,
    /// Beacon blocks produced.
    pub blocks_produced_total: IntCounter,
    /// Beacon blocks inserted.
    pub blocks_inserted_total: IntCounter,
    /// Shard instructions dropped as malformed or invalid.
    pub instructions_dropped_total: IntCounter,
    /// Shard blocks left in the pool for a later height.
    pub shard_blocks_deferred_total: IntCounter,
    /// Bridge requests turned into rejected instructions.
    pub bridge_rejected_total: IntCounter,
    /// Validators whose stake was returned.
    pub stake_returned_total: IntCounter,
    /// Pool pruning or fee recording that failed after a block was committed.
    pub insert_followup_failures_total: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let beacon_height = IntGauge::new("shardbeacon_beacon_height", "Canonical beacon height")
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(beacon_height.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            blocks_produced_total: counter(
                &registry,
                "shardbeacon_blocks_produced_total",
                "Beacon blocks produced",
            )?,
            blocks_inserted_total: counter(
                &registry,
                "shardbeacon_blocks_inserted_total",
                "Beacon blocks inserted",
            )?,
            instructions_dropped_total: counter(
                &registry,
                "shardbeacon_instructions_dropped_total",
                "Dropped shard instructions",
            )?,
            shard_blocks_deferred_total: counter(
                &registry,
                "shardbeacon_shard_blocks_deferred_total",
                "Shard blocks deferred to a later height",
            )?,
            bridge_rejected_total: counter(
                &registry,
                "shardbeacon_bridge_rejected_total",
                "Rejected bridge requests",
            )?,
            stake_returned_total: counter(
                &registry,
                "shardbeacon_stake_returned_total",
                "Validators with returned stake",
            )?,
            insert_followup_failures_total: counter(
                &registry,
                "shardbeacon_insert_followup_failures_total",
                "Post-commit insert steps that failed",
            )?,
            beacon_height,
            registry,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_registered_names() {
        let m = Metrics::new().unwrap();
        m.beacon_height.set(7);
        m.blocks_produced_total.inc();
        let text = m.render().unwrap();
        assert!(text.contains("shardbeacon_beacon_height 7"));
        assert!(text.contains("shardbeacon_blocks_produced_total 1"));
    }
}
