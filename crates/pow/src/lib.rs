//! Compact targets, chain work and the proof-of-work header check.

pub mod difficulty;
pub mod validation;
