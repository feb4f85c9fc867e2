//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod geo;
pub mod signature;
pub mod types;
