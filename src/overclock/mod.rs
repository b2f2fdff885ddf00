// src/overclock/mod.rs
//! Overclock profile management
//!
//! This module contains the governor that applies per-coin clock/power
//! profiles to GPUs, enforces configured hard limits, and guarantees any
//! applied profile can be rolled back or reset to vendor defaults.

/// Apply/rollback governor implementation
///
/// Contains [`OverclockGovernor`], the [`HardwareControl`] collaborator
/// seam, and the profile/application record types.
pub mod governor;

// Re-export main components for cleaner imports
pub use self::governor::{
    HardwareControl, LoggingHardwareControl, OverclockApplication, OverclockGovernor,
    OverclockProfile,
};
