// src/telemetry/sensor.rs
//! GPU sensor adapters
//!
//! The orchestration core treats the physical metric source as opaque:
//! anything implementing [`SensorAdapter`] can feed the telemetry store.
//! The production adapter shells out to `nvidia-smi` in CSV mode.

use crate::types::GpuSample;
use crate::utils::error::RigError;
use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;

/// Source of GPU health samples, polled by the sampler loop
#[async_trait]
pub trait SensorAdapter: Send + Sync {
    /// Reads one sample per visible GPU
    ///
    /// # Errors
    /// Returns `RigError::SensorUnavailable` when the underlying source
    /// cannot be read. The sampler treats this as a missed tick.
    async fn poll(&self) -> Result<Vec<GpuSample>, RigError>;
}

/// Sensor adapter backed by the `nvidia-smi` query interface
pub struct NvidiaSmiSensor;

const QUERY_FIELDS: &str = "index,temperature.gpu,fan.speed,power.draw,\
utilization.gpu,memory.used,memory.total,clocks.sm,clocks.mem";

#[async_trait]
impl SensorAdapter for NvidiaSmiSensor {
    async fn poll(&self) -> Result<Vec<GpuSample>, RigError> {
        let output = Command::new("nvidia-smi")
            .arg(format!("--query-gpu={}", QUERY_FIELDS))
            .arg("--format=csv,noheader,nounits")
            .output()
            .await
            .map_err(|e| RigError::SensorUnavailable(format!("nvidia-smi: {}", e)))?;

        if !output.status.success() {
            return Err(RigError::SensorUnavailable(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let now = Utc::now();
        let mut samples = Vec::new();

        for line in stdout.lines() {
            match parse_csv_line(line, now) {
                Some(sample) => samples.push(sample),
                None => log::warn!("Unparseable nvidia-smi line: {}", line),
            }
        }

        if samples.is_empty() {
            return Err(RigError::SensorUnavailable(
                "nvidia-smi reported no GPUs".into(),
            ));
        }
        Ok(samples)
    }
}

/// Parses one CSV row of the nvidia-smi query output
///
/// Fields that fail to parse individually (e.g. "[N/A]" fan speed on
/// passively cooled cards) fall back to zero; a row only fails as a whole
/// when the GPU index itself is missing.
fn parse_csv_line(line: &str, now: chrono::DateTime<Utc>) -> Option<GpuSample> {
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() < 9 {
        return None;
    }

    let gpu_index: usize = parts[0].parse().ok()?;
    Some(GpuSample {
        gpu_index,
        temperature_c: parts[1].parse().unwrap_or(0.0),
        fan_speed_pct: parts[2].parse().unwrap_or(0.0),
        power_draw_w: parts[3].parse().unwrap_or(0.0),
        utilization_pct: parts[4].parse().unwrap_or(0.0),
        memory_used_mb: parts[5].parse().unwrap_or(0),
        memory_total_mb: parts[6].parse().unwrap_or(0),
        core_clock_mhz: parts[7].parse().unwrap_or(0),
        memory_clock_mhz: parts[8].parse().unwrap_or(0),
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_row() {
        let now = Utc::now();
        let sample =
            parse_csv_line("0, 63, 72, 91.42, 100, 4012, 6144, 1830, 7001", now).unwrap();
        assert_eq!(sample.gpu_index, 0);
        assert_eq!(sample.temperature_c, 63.0);
        assert_eq!(sample.power_draw_w, 91.42);
        assert_eq!(sample.memory_total_mb, 6144);
        assert_eq!(sample.timestamp, now);
    }

    #[test]
    fn not_available_fields_default_to_zero() {
        let now = Utc::now();
        let sample =
            parse_csv_line("1, 55, [N/A], 80.0, 95, 3000, 8192, 1700, 6800", now).unwrap();
        assert_eq!(sample.gpu_index, 1);
        assert_eq!(sample.fan_speed_pct, 0.0);
    }

    #[test]
    fn short_row_is_rejected() {
        assert!(parse_csv_line("0, 63, 72", Utc::now()).is_none());
    }
}
