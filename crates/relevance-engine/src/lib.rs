//! Portfolio Relevance Engine
//!
//! Deterministic multi-factor scoring of a market event against one
//! portfolio snapshot: entity match, sector correlation, sentiment impact
//! and position weight, combined with fixed weights and a position-size
//! multiplier.

pub mod engine;
pub mod sectors;

pub use engine::{RelevanceEngine, RelevanceWeights};
pub use sectors::{sector_correlation, SectorLexicon};
