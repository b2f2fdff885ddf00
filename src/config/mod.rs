// src/config/mod.rs
//! Configuration management for the rig orchestrator
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Generating configuration templates
//! - Coin, safety, and policy settings
//!
//! The configuration uses TOML format. It is loaded once at startup and
//! held process-wide behind an `ArcSwap` so settings updates are an atomic
//! pointer swap rather than in-place mutation.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and related types that define
/// the orchestrator's configuration structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::{
    AutoSwitchConfig, ClockLimits, CoinConfig, Config, GeneralConfig, MinerConfig,
    NotificationsConfig, SafetyConfig, TelemetryConfig, WatchdogConfig,
};

use crate::utils::error::RigError;
use std::path::PathBuf;

/// Loads orchestrator configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(RigError)` - If the file couldn't be read or parsed
pub fn load(path: impl Into<PathBuf>) -> Result<Config, RigError> {
    Config::load(path)
}

/// Generates a commented configuration template
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
