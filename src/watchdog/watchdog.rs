// src/watchdog/watchdog.rs
//! Safety watchdog and crash recovery
//!
//! A periodic control loop with four independent checks per tick:
//! temperature thresholds, crash recovery with capped exponential
//! backoff, a low-hashrate restart, and the optional mining-hours
//! schedule. Each check is isolated; a failure in one never skips the
//! others.
//!
//! All time-dependent decisions take the tick time as a parameter, so
//! tests drive the loop one tick at a time with a pinned clock instead
//! of sleeping through backoff windows.

use crate::config::{Config, WatchdogConfig};
use crate::notify::EventBus;
use crate::overclock::OverclockGovernor;
use crate::supervisor::MinerSupervisor;
use crate::telemetry::TelemetryStore;
use crate::types::{MinerPhase, RigEvent, SafetyEvent, SafetyEventKind};
use crate::utils::error::RigError;
use arc_swap::ArcSwap;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Per-GPU cooldown flags shared between the watchdog and the command
/// surface
///
/// A GPU enters cooldown when it triggers an emergency stop and leaves
/// only after its temperature falls below the hysteresis threshold.
/// While any GPU is cooling, mining must not start.
pub struct SafetyInterlock {
    cooling: Mutex<BTreeSet<usize>>,
}

impl SafetyInterlock {
    /// Creates an interlock with no GPU in cooldown
    pub fn new() -> Self {
        SafetyInterlock {
            cooling: Mutex::new(BTreeSet::new()),
        }
    }

    /// Whether this GPU is currently in cooldown
    pub fn is_cooling(&self, gpu_index: usize) -> bool {
        self.cooling
            .lock()
            .expect("interlock lock poisoned")
            .contains(&gpu_index)
    }

    /// Lowest-indexed GPU in cooldown, if any
    pub fn any_cooling(&self) -> Option<usize> {
        self.cooling
            .lock()
            .expect("interlock lock poisoned")
            .iter()
            .next()
            .copied()
    }

    /// All GPUs currently in cooldown, ordered by index
    pub fn cooling_gpus(&self) -> Vec<usize> {
        self.cooling
            .lock()
            .expect("interlock lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Puts a GPU into cooldown
    pub fn set_cooling(&self, gpu_index: usize) {
        self.cooling
            .lock()
            .expect("interlock lock poisoned")
            .insert(gpu_index);
    }

    /// Releases a GPU from cooldown (normally done by the watchdog once
    /// the temperature falls below the hysteresis threshold)
    pub fn clear_cooling(&self, gpu_index: usize) {
        self.cooling
            .lock()
            .expect("interlock lock poisoned")
            .remove(&gpu_index);
    }
}

impl Default for SafetyInterlock {
    fn default() -> Self {
        SafetyInterlock::new()
    }
}

/// A daily "HH:MM-HH:MM" time window
///
/// Windows whose end precedes their start wrap past midnight, so
/// "22:00-06:00" covers late evening through early morning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleWindow {
    /// Parses a window from "HH:MM-HH:MM"
    ///
    /// # Errors
    /// Returns `RigError::ConfigError` when the string is not two valid
    /// times joined by a dash.
    pub fn parse(raw: &str) -> Result<Self, RigError> {
        let (start, end) = raw
            .split_once('-')
            .ok_or_else(|| RigError::ConfigError(format!("Invalid mining window: {}", raw)))?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| {
                RigError::ConfigError(format!("Invalid time {:?} in mining window: {}", s, e))
            })
        };
        Ok(ScheduleWindow {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// Whether a time of day falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            // Overnight window
            time >= self.start || time < self.end
        }
    }
}

/// Recovery bookkeeping carried across ticks
struct RecoveryState {
    attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
    low_hashrate_ticks: u32,
}

/// Periodic safety and recovery loop
pub struct Watchdog {
    config: Arc<ArcSwap<Config>>,
    store: Arc<TelemetryStore>,
    supervisor: Arc<MinerSupervisor>,
    governor: Arc<OverclockGovernor>,
    interlock: Arc<SafetyInterlock>,
    events: Arc<EventBus>,
    state: Mutex<RecoveryState>,
}

impl Watchdog {
    /// Creates a watchdog over the given collaborators
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        store: Arc<TelemetryStore>,
        supervisor: Arc<MinerSupervisor>,
        governor: Arc<OverclockGovernor>,
        interlock: Arc<SafetyInterlock>,
        events: Arc<EventBus>,
    ) -> Self {
        Watchdog {
            config,
            store,
            supervisor,
            governor,
            interlock,
            events,
            state: Mutex::new(RecoveryState {
                attempts: 0,
                last_attempt: None,
                low_hashrate_ticks: 0,
            }),
        }
    }

    /// Runs the watchdog until the shutdown channel flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let tick_secs = self.config.load().watchdog.tick_interval_secs.max(1);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!("Watchdog running, tick every {}s", tick_secs);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Utc::now()).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Watchdog stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Executes one watchdog pass at the given time
    ///
    /// Public so tests (and one-shot tooling) can single-step the loop.
    pub async fn tick(&self, now: DateTime<Utc>) {
        self.check_temperatures(now).await;
        self.check_crash_recovery(now).await;
        self.check_hashrate().await;
        self.check_schedule(now).await;
    }

    /// Evaluates the latest sample of every GPU against the thresholds
    ///
    /// A GPU at or above the emergency threshold stops the miner, resets
    /// its clocks, and enters cooldown; while cooling it produces no
    /// further events until it drops below the hysteresis threshold.
    async fn check_temperatures(&self, now: DateTime<Utc>) {
        let cfg = self.config.load();
        for sample in self.store.latest_all() {
            let gpu = sample.gpu_index;
            let temp = sample.temperature_c;

            if self.interlock.is_cooling(gpu) {
                if temp < cfg.safety.hysteresis_c {
                    self.interlock.clear_cooling(gpu);
                    log::info!(
                        "GPU {} cooled to {:.1}°C, mining interlock released",
                        gpu,
                        temp
                    );
                }
                continue;
            }

            if temp >= cfg.safety.emergency_c {
                log::error!(
                    "GPU {} at {:.1}°C (emergency threshold {:.1}°C), stopping miner",
                    gpu,
                    temp,
                    cfg.safety.emergency_c
                );
                match self.supervisor.stop().await {
                    Ok(()) | Err(RigError::NotRunning) => {}
                    Err(e) if e.is_busy() => {
                        log::info!("Emergency stop: a lifecycle operation is already in flight")
                    }
                    Err(e) => log::warn!("Emergency stop failed: {}", e),
                }
                self.governor.reset(gpu).await;
                self.interlock.set_cooling(gpu);
                self.publish_safety(SafetyEventKind::EmergencyStop, gpu, temp, now);
            } else if temp >= cfg.safety.throttle_c {
                self.publish_safety(SafetyEventKind::ThrottleRequest, gpu, temp, now);
            } else if temp >= cfg.safety.warn_c {
                self.publish_safety(SafetyEventKind::Warning, gpu, temp, now);
            }
        }
    }

    /// Restarts a crashed miner with capped exponential backoff
    ///
    /// Attempts double the delay each time up to the configured cap and
    /// stop entirely at the attempt limit. A quiet period without
    /// attempts resets the counter, so the next crash episode starts
    /// from the base delay again.
    async fn check_crash_recovery(&self, now: DateTime<Utc>) {
        let cfg = self.config.load();
        if !cfg.watchdog.auto_restart {
            return;
        }
        if self.supervisor.phase() != MinerPhase::Crashed {
            return;
        }
        if let Some(gpu) = self.interlock.any_cooling() {
            log::debug!("Crash recovery deferred while GPU {} is cooling", gpu);
            return;
        }
        if let Some(window) = self.mining_window(&cfg) {
            if !window.contains(now.time()) {
                log::debug!("Crash recovery deferred outside the mining window");
                return;
            }
        }
        let Some(session) = self.supervisor.last_session() else {
            return;
        };

        let attempt = {
            let mut state = self.state.lock().expect("watchdog state lock poisoned");
            if let Some(last) = state.last_attempt {
                if now - last > ChronoDuration::seconds(cfg.watchdog.restart_reset_secs as i64) {
                    state.attempts = 0;
                }
            }
            if state.attempts >= cfg.watchdog.max_restart_attempts {
                log::debug!(
                    "Crash recovery exhausted ({} attempts), waiting for operator",
                    state.attempts
                );
                return;
            }
            if let Some(last) = state.last_attempt {
                let ready_at = last + backoff_delay(&cfg.watchdog, state.attempts);
                if now < ready_at {
                    return;
                }
            }
            state.attempts += 1;
            state.last_attempt = Some(now);
            state.attempts
        };

        log::warn!(
            "Restarting crashed miner for {} (attempt {}/{})",
            session.coin,
            attempt,
            cfg.watchdog.max_restart_attempts
        );
        match self
            .supervisor
            .start(&session.coin, &session.pool, &session.wallet)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_busy() => {
                log::info!("Crash restart skipped, another operation is in flight")
            }
            Err(e) => log::warn!("Crash restart failed: {}", e),
        }
    }

    /// Restarts a running miner whose hashrate has collapsed
    ///
    /// A reading below the configured threshold while Running bumps a
    /// counter; the second consecutive low reading restarts the session.
    /// Any healthy reading, or a phase other than Running, resets the
    /// counter. A zero threshold disables the check.
    async fn check_hashrate(&self) {
        let cfg = self.config.load();
        let threshold = cfg.watchdog.hashrate_threshold_mhs;
        if threshold <= 0.0 {
            return;
        }
        let status = self.supervisor.status();

        let trigger = {
            let mut state = self.state.lock().expect("watchdog state lock poisoned");
            if status.phase != MinerPhase::Running || status.hashrate_mhs >= threshold {
                state.low_hashrate_ticks = 0;
                false
            } else {
                state.low_hashrate_ticks += 1;
                if state.low_hashrate_ticks >= 2 {
                    state.low_hashrate_ticks = 0;
                    true
                } else {
                    false
                }
            }
        };
        if !trigger {
            return;
        }

        log::warn!(
            "Hashrate {:.2} MH/s below {:.2} MH/s on consecutive ticks, restarting miner",
            status.hashrate_mhs,
            threshold
        );
        match self.supervisor.restart().await {
            Ok(()) => {}
            Err(e) if e.is_busy() => {
                log::info!("Low-hashrate restart skipped, another operation is in flight")
            }
            Err(e) => log::warn!("Low-hashrate restart failed: {}", e),
        }
    }

    /// Synchronizes the miner with the configured mining-hours window
    ///
    /// Idempotent: inside the window a stopped miner starts on the
    /// default coin, outside it a running miner stops. Without a
    /// configured window this check does nothing.
    async fn check_schedule(&self, now: DateTime<Utc>) {
        let cfg = self.config.load();
        let Some(window) = self.mining_window(&cfg) else {
            return;
        };
        let inside = window.contains(now.time());
        let phase = self.supervisor.phase();

        if !inside && matches!(phase, MinerPhase::Running | MinerPhase::Starting) {
            log::info!("Outside the mining window, stopping miner");
            match self.supervisor.stop().await {
                Ok(()) | Err(RigError::NotRunning) => {}
                Err(e) if e.is_busy() => {
                    log::info!("Schedule stop skipped, another operation is in flight")
                }
                Err(e) => log::warn!("Schedule stop failed: {}", e),
            }
        } else if inside && phase == MinerPhase::Stopped {
            if self.interlock.any_cooling().is_some() {
                log::debug!("Schedule start deferred while a GPU is cooling");
                return;
            }
            let coin = cfg.general.default_coin.clone();
            let coin_cfg = match cfg.coin(&coin) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("Schedule start skipped: {}", e);
                    return;
                }
            };
            log::info!("Inside the mining window, starting miner on {}", coin);
            match self
                .supervisor
                .start(&coin, &coin_cfg.pool, &coin_cfg.wallet)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_busy() => {
                    log::info!("Schedule start skipped, another operation is in flight")
                }
                Err(e) => log::warn!("Schedule start failed: {}", e),
            }
        }
    }

    fn mining_window(&self, cfg: &Config) -> Option<ScheduleWindow> {
        let raw = cfg.watchdog.mining_hours.as_ref()?;
        match ScheduleWindow::parse(raw) {
            Ok(window) => Some(window),
            Err(e) => {
                log::warn!("Ignoring mining window: {}", e);
                None
            }
        }
    }

    fn publish_safety(
        &self,
        kind: SafetyEventKind,
        gpu_index: usize,
        temperature_c: f64,
        timestamp: DateTime<Utc>,
    ) {
        self.events.publish(RigEvent::Safety(SafetyEvent {
            kind,
            gpu_index,
            temperature_c,
            timestamp,
        }));
    }
}

/// Delay before the next restart, doubled per completed attempt and
/// capped
fn backoff_delay(cfg: &WatchdogConfig, completed_attempts: u32) -> ChronoDuration {
    let doublings = completed_attempts.saturating_sub(1).min(16);
    let secs = cfg
        .restart_backoff_secs
        .saturating_mul(1u64 << doublings)
        .min(cfg.restart_backoff_cap_secs);
    ChronoDuration::seconds(secs as i64)
}
