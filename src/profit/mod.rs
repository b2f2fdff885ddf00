// src/profit/mod.rs
//! Profitability evaluation and market data
//!
//! This module turns per-coin rig characteristics and market prices into
//! a ranked list of daily profit estimates, which the orchestrator uses
//! for reporting and automatic coin switching.

/// Profitability computation and ranking
///
/// Contains [`ProfitabilityEvaluator`], the [`PriceSource`] collaborator
/// seam, and the record type describing one coin's daily economics.
pub mod evaluator;

/// CoinGecko-backed price source with a short-lived cache
pub mod coingecko;

// Re-export main components for cleaner imports
pub use self::coingecko::CoinGeckoSource;
pub use self::evaluator::{PriceSource, ProfitabilityEvaluator, ProfitabilityRecord};
