// src/supervisor/mod.rs
//! Miner process supervision
//!
//! This module contains all components related to the external miner
//! process:
//! - The lifecycle state machine (start, stop, restart, crash detection)
//! - Process launching primitives over `tokio::process`
//! - Best-effort output-stream parsing for hashrate and share counters

/// Miner lifecycle state machine
///
/// Contains [`MinerSupervisor`], the only owner of the miner process
/// state, and the snapshot types it exposes.
pub mod miner;

/// Process launching primitives
///
/// Defines the [`Launcher`]/[`ProcessControl`] seam between the
/// supervisor and the operating system, plus the production
/// implementation.
pub mod launcher;

/// Miner log-line pattern extraction
///
/// Turns recognized output lines into structured hashrate/share updates;
/// unrecognized lines are ignored.
pub mod parser;

// Re-export main components for cleaner imports
pub use self::launcher::{Launcher, MinerCommand, ProcessControl, SpawnedProcess, TokioLauncher};
pub use self::miner::{MinerSession, MinerSnapshot, MinerSupervisor};
pub use self::parser::{ShareOutcome, StatUpdate, parse_line};
