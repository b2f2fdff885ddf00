// src/cli/mod.rs
//! Command-line interface definitions
//!
//! Defines the clap command tree the binary entry point dispatches on.

/// Command and option structures
pub mod commands;

// Re-export for easier access
pub use commands::{Action, Commands, ConfigOptions, ProfitOptions, RunOptions};
