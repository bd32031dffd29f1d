#![forbid(unsafe_code)]

//! Epoch reward accounting.

pub mod reward;
