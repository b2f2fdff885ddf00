// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One GPU health sample taken by the sensor adapter
///
/// Immutable once recorded. Produced on every telemetry poll and owned
/// by the [`TelemetryStore`](crate::telemetry::TelemetryStore) afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpuSample {
    /// Index of the GPU this sample was read from
    pub gpu_index: usize,
    /// Core temperature in degrees Celsius
    pub temperature_c: f64,
    /// Fan speed as a percentage of maximum
    pub fan_speed_pct: f64,
    /// Board power draw in watts
    pub power_draw_w: f64,
    /// GPU core utilization percentage
    pub utilization_pct: f64,
    /// Video memory currently in use, in megabytes
    pub memory_used_mb: u64,
    /// Total video memory, in megabytes
    pub memory_total_mb: u64,
    /// Current core clock in MHz
    pub core_clock_mhz: u64,
    /// Current memory clock in MHz
    pub memory_clock_mhz: u64,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle phase of the supervised miner process
///
/// Transitions happen only through
/// [`MinerSupervisor`](crate::supervisor::MinerSupervisor) operations:
///
/// ```text
/// Stopped --start--> Starting --first parsed line--> Running
/// Running --stop--> Stopping --process exit--> Stopped
/// Running --unexpected exit--> Crashed --start--> Starting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerPhase {
    /// No miner process is running
    Stopped,
    /// Process spawned, waiting for the first recognized output line
    Starting,
    /// Process is alive and producing recognized output
    Running,
    /// A termination sequence is in progress
    Stopping,
    /// The process exited without an explicit `stop()`
    Crashed,
}

impl fmt::Display for MinerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerPhase::Stopped => write!(f, "stopped"),
            MinerPhase::Starting => write!(f, "starting"),
            MinerPhase::Running => write!(f, "running"),
            MinerPhase::Stopping => write!(f, "stopping"),
            MinerPhase::Crashed => write!(f, "crashed"),
        }
    }
}

/// Severity classes of safety events raised by the watchdog
///
/// Escalation is strictly by threshold ordering:
/// warn < throttle-notify < emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyEventKind {
    /// Temperature reached the warning threshold; notification only
    Warning,
    /// Temperature reached the throttle threshold; notification only
    ThrottleRequest,
    /// Temperature reached the emergency threshold; miner stopped and
    /// overclocks reset
    EmergencyStop,
}

impl fmt::Display for SafetyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyEventKind::Warning => write!(f, "warning"),
            SafetyEventKind::ThrottleRequest => write!(f, "throttle_request"),
            SafetyEventKind::EmergencyStop => write!(f, "emergency_stop"),
        }
    }
}

/// A temperature-related event emitted by the safety watchdog
///
/// Ephemeral: delivered to the notification sinks and kept in the
/// orchestrator's bounded recent-event log, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyEvent {
    /// Severity of the event
    pub kind: SafetyEventKind,
    /// GPU the triggering sample came from
    pub gpu_index: usize,
    /// Temperature that triggered the event
    pub temperature_c: f64,
    /// When the watchdog observed the condition
    pub timestamp: DateTime<Utc>,
}

/// Emitted when the miner process exits without an explicit `stop()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashEvent {
    /// Coin that was being mined when the process died
    pub coin: String,
    /// Exit code of the dead process, if one was observable
    pub exit_code: Option<i32>,
    /// When the exit was detected
    pub timestamp: DateTime<Utc>,
}

/// Union of events delivered to notification sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RigEvent {
    /// A temperature safety event
    Safety(SafetyEvent),
    /// A miner process crash
    Crash(CrashEvent),
}

impl fmt::Display for RigEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigEvent::Safety(e) => write!(
                f,
                "{} on GPU {} at {:.1}°C",
                e.kind, e.gpu_index, e.temperature_c
            ),
            RigEvent::Crash(e) => match e.exit_code {
                Some(code) => write!(f, "miner crashed while mining {} (exit code {})", e.coin, code),
                None => write!(f, "miner crashed while mining {}", e.coin),
            },
        }
    }
}
