// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! This module contains shared utilities used throughout the orchestrator,
//! including error handling and logging infrastructure.

/// Error types and handling utilities
///
/// Contains the [`RigError`] enum which defines all possible error conditions
/// for the orchestration core, along with conversion implementations.
pub mod error;

/// Logging configuration and utilities
///
/// Provides logging initialization and configuration for the application,
/// including formatting and output destinations.
pub mod logging;

// Re-export for easier access
pub use error::RigError;
pub use logging::init_logging;
