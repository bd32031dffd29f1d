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

//! Bridge request handling.
//!
//! Request content is the hex of a canonically encoded [`BridgeAction`].
//! Issuing requests are rejected when their unique id was already used in the
//! block or the feature state reports it issued (or cannot answer). Contracting
//! requests are always accepted. Content that does not decode is dropped.

use crate::core::instruction::extract::BridgeRequest;
use crate::core::instruction::{BridgeInstruction, BridgeStatus};
use crate::core::types::{decode_canonical_limited, encode_canonical, CodecError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Issue wrapped tokens on this chain.
pub const ISSUING_META_TYPE: u32 = 80;
/// Burn wrapped tokens to release them on the other chain.
pub const CONTRACTING_META_TYPE: u32 = 81;

const MAX_CONTENT_BYTES: usize = 4 * 1024;

/// Bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Feature-state lock poisoned.
    #[error("feature state poisoned")]
    Poisoned,
    /// Feature-state backend failure.
    #[error("feature state: {0}")]
    Backend(String),
    /// Content is not hex.
    #[error("content hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// Content does not decode.
    #[error("content: {0}")]
    Codec(#[from] CodecError),
    /// Request names no receiver or amount.
    #[error("invalid request")]
    Invalid,
}

/// Decoded bridge request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeAction {
    /// External transaction id; issuing is allowed once per id.
    pub unique_id: String,
    /// Payment address on this chain.
    pub receiver: String,
    /// Amount in base units.
    pub amount: u64,
}

impl BridgeAction {
    /// Hex content string.
    pub fn to_content(&self) -> Result<String, BridgeError> {
        Ok(hex::encode(encode_canonical(self)?))
    }

    /// Parse a hex content string.
    pub fn from_content(content: &str) -> Result<Self, BridgeError> {
        let bytes = hex::decode(content)?;
        Ok(decode_canonical_limited(&bytes, MAX_CONTENT_BYTES)?)
    }
}

/// Bridge feature state: which unique ids were already issued.
pub trait FeatureState: Send + Sync {
    /// Whether `unique_id` was issued before.
    fn is_issued(&self, unique_id: &str) -> Result<bool, BridgeError>;
}

/// In-memory feature state.
#[derive(Debug, Default)]
pub struct MemoryFeatureState {
    issued: RwLock<BTreeSet<String>>,
}

impl MemoryFeatureState {
    /// Record an issuance.
    pub fn mark_issued(&self, unique_id: &str) -> Result<(), BridgeError> {
        let mut g = self.issued.write().map_err(|_| BridgeError::Poisoned)?;
        g.insert(unique_id.to_string());
        Ok(())
    }
}

impl FeatureState for MemoryFeatureState {
    fn is_issued(&self, unique_id: &str) -> Result<bool, BridgeError> {
        let g = self.issued.read().map_err(|_| BridgeError::Poisoned)?;
        Ok(g.contains(unique_id))
    }
}

/// Builds bridge instructions for one beacon block.
pub trait BridgeBuilder: Send + Sync {
    /// One instruction per usable request, in request order.
    fn build(&self, requests: &[BridgeRequest]) -> Vec<BridgeInstruction>;
}

/// Builder backed by a [`FeatureState`].
pub struct DefaultBridgeBuilder {
    feature_state: Arc<dyn FeatureState>,
}

impl DefaultBridgeBuilder {
    /// Builder consulting `feature_state`.
    pub fn new(feature_state: Arc<dyn FeatureState>) -> Self {
        Self { feature_state }
    }

    fn check_issuing(&self, action: &BridgeAction, used: &BTreeSet<String>) -> Result<(), BridgeError> {
        if action.receiver.is_empty() || action.amount == 0 || used.contains(&action.unique_id) {
            return Err(BridgeError::Invalid);
        }
        if self.feature_state.is_issued(&action.unique_id)? {
            return Err(BridgeError::Invalid);
        }
        Ok(())
    }
}

impl BridgeBuilder for DefaultBridgeBuilder {
    fn build(&self, requests: &[BridgeRequest]) -> Vec<BridgeInstruction> {
        let mut used = BTreeSet::new();
        let mut out = Vec::new();
        for req in requests.iter() {
            let action = match BridgeAction::from_content(&req.content) {
                Ok(a) => a,
                Err(e) => {
                    debug!(tx = %req.tx_hash, error = %e, "drop undecodable bridge request");
                    continue;
                }
            };
            let status = match req.meta_type {
                ISSUING_META_TYPE => match self.check_issuing(&action, &used) {
                    Ok(()) => {
                        used.insert(action.unique_id.clone());
                        BridgeStatus::Accepted
                    }
                    Err(e) => {
                        warn!(tx = %req.tx_hash, unique_id = %action.unique_id, error = %e, "bridge issuing rejected");
                        BridgeStatus::Rejected
                    }
                },
                CONTRACTING_META_TYPE => BridgeStatus::Accepted,
                other => {
                    debug!(tx = %req.tx_hash, meta_type = other, "drop unknown bridge request");
                    continue;
                }
            };
            out.push(BridgeInstruction {
                meta_type: req.meta_type,
                shard_id: req.shard_id,
                status,
                content: req.content.clone(),
            });
        }
        out
    }
}
