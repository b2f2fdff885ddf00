// src/telemetry/mod.rs
//! GPU telemetry collection
//!
//! This module contains the components that keep the orchestrator aware of
//! GPU health:
//! - The rolling sample history consumed by the watchdog and the web layer
//! - The sensor adapters that produce one sample per GPU per poll

/// Fixed-capacity rolling sample history
///
/// Holds the per-GPU FIFO rings of [`GpuSample`](crate::types::GpuSample)
/// values read by the watchdog and the dashboard endpoints.
pub mod store;

/// GPU sensor adapters
///
/// Defines the [`SensorAdapter`] contract and the production `nvidia-smi`
/// implementation.
pub mod sensor;

// Re-export main components for cleaner imports
pub use self::sensor::{NvidiaSmiSensor, SensorAdapter};
pub use self::store::TelemetryStore;
