#![forbid(unsafe_code)]

//! Beacon block production and insertion.

pub mod beacon;
pub mod bridge;
pub mod insert;
pub mod pool;
pub mod shard_state;
