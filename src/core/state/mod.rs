#![forbid(unsafe_code)]

//! Header roots, the binary Merkle tree and persisted stake info.

pub mod merkle;
pub mod roots;
pub mod stake_store;
