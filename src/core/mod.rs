#![forbid(unsafe_code)]

//! Core protocol: types, configuration, instructions, committee state and block production.

pub mod committee;
pub mod config;
pub mod economics;
pub mod instruction;
pub mod producer;
pub mod state;
pub mod types;
