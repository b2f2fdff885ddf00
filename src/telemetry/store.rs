// src/telemetry/store.rs
//! Rolling telemetry history
//!
//! Fixed-capacity ring of GPU samples per GPU index. Writes come from the
//! single sampler loop; reads come from any number of request handlers, so
//! everything hands out copied snapshots rather than references into the
//! ring.

use crate::types::GpuSample;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

/// Fixed-capacity rolling history of GPU samples
///
/// Insertion beyond capacity evicts the oldest sample first (strict FIFO).
/// Samples within one GPU's ring are strictly increasing in timestamp;
/// a sample that does not advance the clock is dropped with a warning.
pub struct TelemetryStore {
    capacity: usize,
    rings: RwLock<BTreeMap<usize, VecDeque<GpuSample>>>,
}

impl TelemetryStore {
    /// Creates a store that keeps `capacity` samples per GPU
    ///
    /// A zero capacity is bumped to one so `latest()` can always reflect
    /// the most recent poll.
    pub fn new(capacity: usize) -> Self {
        TelemetryStore {
            capacity: capacity.max(1),
            rings: RwLock::new(BTreeMap::new()),
        }
    }

    /// Appends a sample to the ring for its GPU index
    ///
    /// Evicts the oldest sample when the ring is full. Drops the sample
    /// if its timestamp does not advance past the newest recorded one.
    pub fn record(&self, sample: GpuSample) {
        let mut rings = self.rings.write().expect("telemetry lock poisoned");
        let ring = rings.entry(sample.gpu_index).or_default();

        if let Some(last) = ring.back() {
            if sample.timestamp <= last.timestamp {
                log::warn!(
                    "Dropping non-monotonic sample for GPU {} ({} <= {})",
                    sample.gpu_index,
                    sample.timestamp,
                    last.timestamp
                );
                return;
            }
        }

        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(sample);
    }

    /// Returns the most recent sample for a GPU, if any was ever recorded
    pub fn latest(&self, gpu_index: usize) -> Option<GpuSample> {
        let rings = self.rings.read().expect("telemetry lock poisoned");
        rings.get(&gpu_index).and_then(|r| r.back().copied())
    }

    /// Returns the most recent sample of every known GPU, ordered by index
    pub fn latest_all(&self) -> Vec<GpuSample> {
        let rings = self.rings.read().expect("telemetry lock poisoned");
        rings.values().filter_map(|r| r.back().copied()).collect()
    }

    /// Returns the samples for a GPU newer than `now - duration`
    ///
    /// # Arguments
    /// * `gpu_index` - GPU to read
    /// * `duration` - How far back from now the window reaches
    ///
    /// # Returns
    /// Chronologically ordered samples; empty if the GPU is unknown.
    pub fn window(&self, gpu_index: usize, duration: Duration) -> Vec<GpuSample> {
        self.window_at(gpu_index, duration, Utc::now())
    }

    /// Like [`window`](Self::window) but with an explicit reference time,
    /// so tests can pin "now"
    pub fn window_at(
        &self,
        gpu_index: usize,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Vec<GpuSample> {
        let cutoff = now - duration;
        let rings = self.rings.read().expect("telemetry lock poisoned");
        rings
            .get(&gpu_index)
            .map(|ring| {
                ring.iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of samples currently held for a GPU
    pub fn len(&self, gpu_index: usize) -> usize {
        let rings = self.rings.read().expect("telemetry lock poisoned");
        rings.get(&gpu_index).map(|r| r.len()).unwrap_or(0)
    }

    /// Whether any sample was ever recorded for a GPU
    pub fn is_empty(&self, gpu_index: usize) -> bool {
        self.len(gpu_index) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(gpu: usize, secs: i64, temp: f64) -> GpuSample {
        GpuSample {
            gpu_index: gpu,
            temperature_c: temp,
            fan_speed_pct: 60.0,
            power_draw_w: 90.0,
            utilization_pct: 99.0,
            memory_used_mb: 4000,
            memory_total_mb: 6144,
            core_clock_mhz: 1800,
            memory_clock_mhz: 7000,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn capacity_is_enforced_fifo() {
        let store = TelemetryStore::new(3);
        for i in 0..10 {
            store.record(sample(0, i, 60.0 + i as f64));
        }
        assert_eq!(store.len(0), 3);
        let now = Utc.timestamp_opt(1_700_000_000 + 10, 0).unwrap();
        let window = store.window_at(0, Duration::hours(1), now);
        assert_eq!(window.len(), 3);
        // Oldest evicted first, survivors in chronological order
        assert_eq!(window[0].temperature_c, 67.0);
        assert_eq!(window[2].temperature_c, 69.0);
        assert!(window.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn latest_returns_newest_sample() {
        let store = TelemetryStore::new(60);
        assert!(store.latest(0).is_none());
        store.record(sample(0, 0, 55.0));
        store.record(sample(0, 5, 58.0));
        assert_eq!(store.latest(0).unwrap().temperature_c, 58.0);
    }

    #[test]
    fn non_monotonic_samples_are_dropped() {
        let store = TelemetryStore::new(60);
        store.record(sample(0, 10, 55.0));
        store.record(sample(0, 10, 70.0)); // same timestamp
        store.record(sample(0, 5, 80.0)); // goes backwards
        assert_eq!(store.len(0), 1);
        assert_eq!(store.latest(0).unwrap().temperature_c, 55.0);
    }

    #[test]
    fn window_cuts_at_duration() {
        let store = TelemetryStore::new(60);
        for i in 0..30 {
            store.record(sample(0, i * 10, 60.0));
        }
        let now = Utc.timestamp_opt(1_700_000_000 + 290, 0).unwrap();
        let window = store.window_at(0, Duration::seconds(60), now);
        // cutoff at t=230; samples at 230..=290 survive
        assert_eq!(window.len(), 7);
    }

    #[test]
    fn gpus_are_tracked_independently() {
        let store = TelemetryStore::new(2);
        store.record(sample(0, 0, 50.0));
        store.record(sample(1, 1, 70.0));
        store.record(sample(0, 2, 52.0));
        let all = store.latest_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].gpu_index, 0);
        assert_eq!(all[0].temperature_c, 52.0);
        assert_eq!(all[1].gpu_index, 1);
    }
}
