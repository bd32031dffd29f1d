#![forbid(unsafe_code)]

//! Committee state, swap rules, assignment and the transition engine.

pub mod assign;
pub mod change;
pub mod engine;
pub mod state;
pub mod store;
pub mod swap_rule;
