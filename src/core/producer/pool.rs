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

//! Shard-to-beacon pool: validated shard blocks waiting for a beacon block.

use crate::core::producer::shard_state::ShardBlock;
use crate::core::types::ShardId;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Pool errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Lock poisoned.
    #[error("pool lock poisoned")]
    Poisoned,
    /// A block at that height is already pooled.
    #[error("shard {shard} height {height} already pooled")]
    Duplicate {
        /// Shard.
        shard: ShardId,
        /// Height.
        height: u64,
    },
    /// Height already included in the beacon chain.
    #[error("shard {shard} height {height} already included")]
    Stale {
        /// Shard.
        shard: ShardId,
        /// Height.
        height: u64,
    },
    /// Shard queue full.
    #[error("shard {0} pool full")]
    Full(ShardId),
}

/// Height-contiguous blocks of one shard plus the count left behind a gap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardBatch {
    /// Blocks starting right after the requested height, without gaps.
    pub blocks: Vec<ShardBlock>,
    /// Pooled blocks beyond the first gap.
    pub deferred: usize,
}

/// Source of shard blocks for beacon production.
pub trait ShardToBeaconPool: Send + Sync {
    /// Add a validated shard block.
    fn add_block(&self, block: ShardBlock) -> Result<(), PoolError>;
    /// Contiguous blocks of `shard` after `after_height`.
    fn valid_blocks(&self, shard: ShardId, after_height: u64) -> Result<ShardBatch, PoolError>;
    /// Forget blocks of `shard` up to `height` once included.
    fn prune(&self, shard: ShardId, height: u64) -> Result<(), PoolError>;
    /// Drop blocks of `shard` above `height` and allow re-adding them.
    fn revert(&self, shard: ShardId, height: u64) -> Result<(), PoolError>;
}

#[derive(Default)]
struct ShardQueue {
    blocks: BTreeMap<u64, ShardBlock>,
    included: u64,
}

/// In-memory pool with a per-shard capacity.
pub struct MemoryShardPool {
    shards: RwLock<BTreeMap<ShardId, ShardQueue>>,
    capacity: usize,
}

impl MemoryShardPool {
    /// Pool holding at most `capacity` blocks per shard.
    pub fn new(capacity: usize) -> Self {
        Self {
            shards: RwLock::new(BTreeMap::new()),
            capacity,
        }
    }
}

impl ShardToBeaconPool for MemoryShardPool {
    fn add_block(&self, block: ShardBlock) -> Result<(), PoolError> {
        let mut g = self.shards.write().map_err(|_| PoolError::Poisoned)?;
        let shard = block.header.shard_id;
        let height = block.header.height;
        let q = g.entry(shard).or_default();
        if height <= q.included {
            return Err(PoolError::Stale { shard, height });
        }
        if q.blocks.contains_key(&height) {
            return Err(PoolError::Duplicate { shard, height });
        }
        if q.blocks.len() >= self.capacity {
            return Err(PoolError::Full(shard));
        }
        q.blocks.insert(height, block);
        Ok(())
    }

    fn valid_blocks(&self, shard: ShardId, after_height: u64) -> Result<ShardBatch, PoolError> {
        let g = self.shards.read().map_err(|_| PoolError::Poisoned)?;
        let Some(q) = g.get(&shard) else {
            return Ok(ShardBatch::default());
        };
        let mut out = ShardBatch::default();
        let mut next = after_height + 1;
        for (h, b) in q.blocks.range(next..) {
            if *h == next && out.deferred == 0 {
                out.blocks.push(b.clone());
                next += 1;
            } else {
                out.deferred += 1;
            }
        }
        Ok(out)
    }

    fn prune(&self, shard: ShardId, height: u64) -> Result<(), PoolError> {
        let mut g = self.shards.write().map_err(|_| PoolError::Poisoned)?;
        let q = g.entry(shard).or_default();
        q.blocks.retain(|h, _| *h > height);
        q.included = q.included.max(height);
        Ok(())
    }

    fn revert(&self, shard: ShardId, height: u64) -> Result<(), PoolError> {
        let mut g = self.shards.write().map_err(|_| PoolError::Poisoned)?;
        let q = g.entry(shard).or_default();
        q.blocks.retain(|h, _| *h <= height);
        q.included = q.included.min(height);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_blocks::block;
    use super::*;

    #[test]
    fn contiguous_batches_stop_at_gap() {
        let pool = MemoryShardPool::new(16);
        for h in [1, 2, 4, 5] {
            pool.add_block(block(0, h)).unwrap();
        }
        let b = pool.valid_blocks(0, 0).unwrap();
        assert_eq!(b.blocks.iter().map(|b| b.header.height).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.deferred, 2);
        assert_eq!(pool.valid_blocks(1, 0).unwrap(), ShardBatch::default());
    }

    #[test]
    fn prune_rejects_included_heights_and_revert_reopens_them() {
        let pool = MemoryShardPool::new(16);
        pool.add_block(block(0, 1)).unwrap();
        pool.add_block(block(0, 2)).unwrap();
        assert_eq!(
            pool.add_block(block(0, 2)),
            Err(PoolError::Duplicate { shard: 0, height: 2 })
        );
        pool.prune(0, 1).unwrap();
        assert_eq!(pool.add_block(block(0, 1)), Err(PoolError::Stale { shard: 0, height: 1 }));
        assert_eq!(pool.valid_blocks(0, 1).unwrap().blocks.len(), 1);

        pool.revert(0, 0).unwrap();
        assert!(pool.valid_blocks(0, 0).unwrap().blocks.is_empty());
        pool.add_block(block(0, 1)).unwrap();
    }

    #[test]
    fn capacity_is_per_shard() {
        let pool = MemoryShardPool::new(1);
        pool.add_block(block(0, 1)).unwrap();
        assert_eq!(pool.add_block(block(0, 2)), Err(PoolError::Full(0)));
        pool.add_block(block(1, 1)).unwrap();
    }
}
