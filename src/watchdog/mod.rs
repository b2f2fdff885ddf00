// src/watchdog/mod.rs
//! Safety watchdog
//!
//! The periodic loop that enforces temperature thresholds, restarts a
//! crashed miner with backoff, and keeps the miner aligned with the
//! optional mining-hours schedule.

/// Watchdog loop, cooldown interlock, and schedule window
pub mod watchdog;

// Re-export main components for cleaner imports
pub use self::watchdog::{SafetyInterlock, ScheduleWindow, Watchdog};
