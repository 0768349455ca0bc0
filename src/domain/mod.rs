//! Domain layer types and invariants.

pub mod compile;
pub mod error;
pub mod types;
