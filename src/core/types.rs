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

//! Deterministic core types and canonical encoding helpers.

use bincode::Options;
use ring::digest;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// SHA-256, the chain's standard hash.
pub fn sha256(data: &[u8]) -> H256 {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    H256(out)
}

/// 256-bit hash type (32 bytes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct H256([u8; 32]);

impl H256 {
    /// All-zero hash.
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Hash parse error.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid hash hex")]
pub struct HashParseError;

impl FromStr for H256 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| HashParseError)?;
        if raw.len() != 32 {
            return Err(HashParseError);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(Self(out))
    }
}

/// Shard identifier.
pub type ShardId = u8;

/// Canonical map type alias.
pub type CanonicalMap<K, V> = BTreeMap<K, V>;

/// Committee key errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("empty key string")]
    Empty,
    #[error("invalid base58")]
    Base58,
    #[error("bad key layout")]
    Layout,
}

const KEY_VERSION: u8 = 1;

/// Validator identity: incognito signing key plus mining (consensus) key.
///
/// Equality is byte equality of both parts. The canonical string form is
/// `base58(version || len(inc) || inc || mining)` and is what every map and
/// wire instruction uses.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitteePublicKey {
    inc_pub_key: Vec<u8>,
    mining_pub_key: Vec<u8>,
}

impl CommitteePublicKey {
    /// Build from raw key material.
    pub fn new(inc_pub_key: Vec<u8>, mining_pub_key: Vec<u8>) -> Result<Self, KeyError> {
        if inc_pub_key.is_empty() || inc_pub_key.len() > u8::MAX as usize {
            return Err(KeyError::Layout);
        }
        if mining_pub_key.is_empty() {
            return Err(KeyError::Layout);
        }
        Ok(Self {
            inc_pub_key,
            mining_pub_key,
        })
    }

    /// Incognito (payment side) public key.
    pub fn inc_pub_key(&self) -> &[u8] {
        &self.inc_pub_key
    }

    /// Mining (consensus) public key.
    pub fn mining_pub_key(&self) -> &[u8] {
        &self.mining_pub_key
    }

    /// Canonical key string.
    pub fn to_key_string(&self) -> String {
        let mut raw = Vec::with_capacity(2 + self.inc_pub_key.len() + self.mining_pub_key.len());
        raw.push(KEY_VERSION);
        raw.push(self.inc_pub_key.len() as u8);
        raw.extend_from_slice(&self.inc_pub_key);
        raw.extend_from_slice(&self.mining_pub_key);
        bs58::encode(raw).into_string()
    }

    /// Parse a canonical key string.
    pub fn from_key_string(s: &str) -> Result<Self, KeyError> {
        if s.is_empty() {
            return Err(KeyError::Empty);
        }
        let raw = bs58::decode(s).into_vec().map_err(|_| KeyError::Base58)?;
        if raw.len() < 3 || raw[0] != KEY_VERSION {
            return Err(KeyError::Layout);
        }
        let inc_len = raw[1] as usize;
        if inc_len == 0 || raw.len() <= 2 + inc_len {
            return Err(KeyError::Layout);
        }
        Self::new(raw[2..2 + inc_len].to_vec(), raw[2 + inc_len..].to_vec())
    }
}

impl fmt::Display for CommitteePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

/// Convert a key list to key strings (order preserved).
pub fn key_strings(keys: &[CommitteePublicKey]) -> Vec<String> {
    keys.iter().map(CommitteePublicKey::to_key_string).collect()
}

/// Parse a key-string list; any malformed entry fails the whole list.
pub fn parse_key_strings<S: AsRef<str>>(keys: &[S]) -> Result<Vec<CommitteePublicKey>, KeyError> {
    keys.iter()
        .map(|k| CommitteePublicKey::from_key_string(k.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_string_round_trips_and_rejects_garbage() {
        let k = CommitteePublicKey::new(vec![7u8; 32], vec![9u8; 48]).unwrap();
        let s = k.to_key_string();
        assert_eq!(CommitteePublicKey::from_key_string(&s).unwrap(), k);

        assert_eq!(CommitteePublicKey::from_key_string(""), Err(KeyError::Empty));
        assert_eq!(CommitteePublicKey::from_key_string("0OIl"), Err(KeyError::Base58));
        let short = bs58::encode([KEY_VERSION, 40, 1, 2]).into_string();
        assert_eq!(CommitteePublicKey::from_key_string(&short), Err(KeyError::Layout));
    }

    #[test]
    fn hash_hex_parse() {
        let h = sha256(b"abc");
        let parsed: H256 = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert!("zz".parse::<H256>().is_err());
    }
}
