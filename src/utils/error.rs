// src/utils/error.rs
use serde_json;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use url;

/// Main error type for the orchestration core
///
/// This enum represents all error conditions that can occur while
/// supervising the miner process, applying overclocks, evaluating
/// profitability, or talking to external collaborators.
///
/// The variants fall into three groups:
/// - configuration errors (unknown coin, missing binary, unsafe profile)
///   which are surfaced to the caller and never retried automatically,
/// - transient operational errors (spawn failure, sensor read failure)
///   which the watchdog treats as a missed tick,
/// - busy/interlock conditions which signal that a corrective action is
///   already in progress or temporarily forbidden.
#[derive(Error, Debug)]
pub enum RigError {
    /// The requested coin has no entry in the configuration
    #[error("Unknown coin: {0}")]
    UnknownCoin(String),

    /// The miner executable for the requested coin is absent on disk
    #[error("Miner binary missing: {}", .0.display())]
    MinerBinaryMissing(PathBuf),

    /// `start()` was called while the miner is Running or Starting
    #[error("Miner is already running")]
    AlreadyRunning,

    /// `stop()` was called while the miner is Stopped
    #[error("Miner is not running")]
    NotRunning,

    /// Another lifecycle operation (start/stop/restart) is in flight
    #[error("Another miner lifecycle operation is in progress")]
    Busy,

    /// No overclock profile is registered under the given name
    #[error("Unknown overclock profile: {0}")]
    UnknownProfile(String),

    /// The profile's offsets exceed the configured hard limits
    #[error("Unsafe overclock profile: {0}")]
    UnsafeProfile(String),

    /// `rollback()` was called for a GPU that never had a profile applied
    #[error("No overclock application recorded for GPU {0}")]
    NothingToRollback(usize),

    /// `start()` is blocked while a GPU cools down after an emergency stop
    #[error("GPU {0} is cooling down after an emergency stop")]
    CoolingDown(usize),

    /// No price inputs were available for the profitability evaluation
    #[error("No price data available")]
    NoPriceData,

    /// The GPU sensor source could not be read
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The hardware control collaborator rejected a clock programming call
    #[error("Hardware rejected clock programming: {0}")]
    HardwareRejected(String),

    /// The miner subprocess could not be spawned
    #[error("Failed to spawn miner process: {0}")]
    SpawnError(String),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors (pool address validation)
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// HTTP request/response errors (price source, webhook sink)
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

impl RigError {
    /// Whether this error means "a lifecycle action is already underway"
    ///
    /// The watchdog uses this to distinguish a corrective action that is
    /// already in progress (log and move on) from a genuine failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, RigError::Busy)
    }
}
