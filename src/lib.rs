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

//! Shardbeacon - beacon committee-state machine and block producer for a sharded chain.
//!
//! This repository provides:
//! - The consensus wire codec for committee instructions (stake, swap, assign, random, ...)
//! - A versioned committee state (slashing base and sync-pool v3) with clone/commit semantics
//! - Pluggable swap rules and a deterministic committee-state transition engine
//! - A beacon block producer that aggregates shard blocks and commits to the derived
//!   state through Merkle-style header roots
//! - Monitoring via Prometheus metrics and structured logging

/// Core protocol primitives (types, instructions, committee state, producer).
pub mod core;
/// Observability (metrics).
pub mod monitoring;
