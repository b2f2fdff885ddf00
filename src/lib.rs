//! Rig Orchestrator - GPU mining orchestration core in Rust
//!
//! This crate provides the control plane of a single-host GPU mining rig:
//! - Miner process supervision (start/stop/restart, crash detection)
//! - Rolling GPU telemetry with a pluggable sensor adapter
//! - A safety watchdog with emergency stop, cooldown, and crash recovery
//! - Overclock profile management with hard limits and rollback
//! - Profitability evaluation and automatic coin switching

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner process supervision: lifecycle state machine, process launching,
/// and output-stream parsing
pub mod supervisor;

/// GPU telemetry collection: rolling sample store and sensor adapters
pub mod telemetry;

/// Safety watchdog: temperature enforcement, crash recovery, scheduling
pub mod watchdog;

/// Overclock profile management with limit validation and rollback
pub mod overclock;

/// Profitability evaluation and market price sources
pub mod profit;

/// Event notification delivery (log and webhook sinks)
pub mod notify;

/// Top-level orchestration facade and command surface
pub mod orchestrator;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use notify::{EventBus, LogSink, NotificationSink, WebhookSink};
pub use orchestrator::{Orchestrator, RigStatus};
pub use overclock::{HardwareControl, LoggingHardwareControl, OverclockGovernor, OverclockProfile};
pub use profit::{CoinGeckoSource, PriceSource, ProfitabilityEvaluator, ProfitabilityRecord};
pub use supervisor::{Launcher, MinerSupervisor, TokioLauncher};
pub use telemetry::{NvidiaSmiSensor, SensorAdapter, TelemetryStore};
pub use types::{GpuSample, MinerPhase, RigEvent};
pub use utils::{RigError, init_logging};
pub use watchdog::{SafetyInterlock, Watchdog};
