// src/orchestrator/mod.rs
//! Rig orchestration facade
//!
//! Wires the telemetry sampler, miner supervisor, overclock governor,
//! watchdog, and profitability evaluator together and exposes the
//! command surface the CLI talks to. The orchestrator owns no policy of
//! its own beyond auto-switching; everything else is delegated to the
//! component responsible for it.

use crate::config::Config;
use crate::notify::{EventBus, NotificationSink};
use crate::overclock::{HardwareControl, OverclockApplication, OverclockGovernor};
use crate::profit::{PriceSource, ProfitabilityEvaluator, ProfitabilityRecord};
use crate::supervisor::{Launcher, MinerSnapshot, MinerSupervisor};
use crate::telemetry::{SensorAdapter, TelemetryStore};
use crate::types::{GpuSample, MinerPhase, RigEvent};
use crate::utils::error::RigError;
use crate::watchdog::{SafetyInterlock, Watchdog};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Combined status snapshot served to the operator
#[derive(Debug, Clone, Serialize)]
pub struct RigStatus {
    /// Miner lifecycle and stream counters
    pub miner: MinerSnapshot,
    /// Latest sample of every known GPU
    pub gpus: Vec<GpuSample>,
    /// GPUs currently locked out by the thermal interlock
    pub cooling_gpus: Vec<usize>,
    /// Overclock applications recorded per GPU
    pub overclocks: HashMap<usize, OverclockApplication>,
}

/// Top-level coordinator of all rig components
pub struct Orchestrator {
    config: Arc<ArcSwap<Config>>,
    store: Arc<TelemetryStore>,
    sensor: Arc<dyn SensorAdapter>,
    supervisor: Arc<MinerSupervisor>,
    governor: Arc<OverclockGovernor>,
    evaluator: ProfitabilityEvaluator,
    watchdog: Arc<Watchdog>,
    interlock: Arc<SafetyInterlock>,
    events: Arc<EventBus>,
}

impl Orchestrator {
    /// Builds the full component graph from configuration
    ///
    /// Per-coin overclock profiles found in the configuration are
    /// registered with the governor under their coin symbol.
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        sensor: Arc<dyn SensorAdapter>,
        launcher: Arc<dyn Launcher>,
        hardware: Arc<dyn HardwareControl>,
        prices: Arc<dyn PriceSource>,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Arc<Self> {
        let cfg = config.load();
        let events = Arc::new(EventBus::new(sinks));
        let store = Arc::new(TelemetryStore::new(cfg.telemetry.capacity));
        let supervisor = Arc::new(MinerSupervisor::new(
            Arc::clone(&config),
            launcher,
            Arc::clone(&events),
        ));
        let governor = Arc::new(OverclockGovernor::new(hardware, cfg.limits.clone()));
        for (symbol, coin) in &cfg.coins {
            if let Some(profile) = &coin.overclock {
                governor.register(symbol.clone(), profile.clone());
            }
        }
        let interlock = Arc::new(SafetyInterlock::new());
        let watchdog = Arc::new(Watchdog::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&supervisor),
            Arc::clone(&governor),
            Arc::clone(&interlock),
            Arc::clone(&events),
        ));
        let evaluator = ProfitabilityEvaluator::new(Arc::clone(&config), prices);

        Arc::new(Orchestrator {
            config,
            store,
            sensor,
            supervisor,
            governor,
            evaluator,
            watchdog,
            interlock,
            events,
        })
    }

    /// Starts mining a coin
    ///
    /// Missing arguments fall back to the configuration: the default
    /// coin, and the coin's configured pool and wallet.
    ///
    /// # Errors
    /// * `CoolingDown` - a GPU is locked out by the thermal interlock
    /// * any error [`MinerSupervisor::start`] can produce
    pub async fn start(
        &self,
        coin: Option<&str>,
        pool: Option<&str>,
        wallet: Option<&str>,
    ) -> Result<(), RigError> {
        if let Some(gpu) = self.interlock.any_cooling() {
            return Err(RigError::CoolingDown(gpu));
        }
        let cfg = self.config.load();
        let coin = coin.unwrap_or(&cfg.general.default_coin);
        let coin_cfg = cfg.coin(coin)?;
        let pool = pool.unwrap_or(&coin_cfg.pool);
        let wallet = wallet.unwrap_or(&coin_cfg.wallet);
        self.supervisor.start(coin, pool, wallet).await
    }

    /// Stops the miner
    ///
    /// # Errors
    /// See [`MinerSupervisor::stop`].
    pub async fn stop(&self) -> Result<(), RigError> {
        self.supervisor.stop().await
    }

    /// Restarts the current mining session
    ///
    /// # Errors
    /// * `CoolingDown` - a GPU is locked out by the thermal interlock
    /// * any error [`MinerSupervisor::restart`] can produce
    pub async fn restart(&self) -> Result<(), RigError> {
        if let Some(gpu) = self.interlock.any_cooling() {
            return Err(RigError::CoolingDown(gpu));
        }
        self.supervisor.restart().await
    }

    /// Switches mining to another coin
    ///
    /// Applies the coin's overclock profile (when one is registered) to
    /// every known GPU before the miner comes up on the new coin, so the
    /// new algorithm never runs on the old coin's clocks.
    ///
    /// # Errors
    /// * `CoolingDown` - a GPU is locked out by the thermal interlock
    /// * `UnknownCoin` - the target coin has no configuration entry
    /// * profile or lifecycle errors from the governor and supervisor
    pub async fn switch(&self, coin: &str) -> Result<(), RigError> {
        if let Some(gpu) = self.interlock.any_cooling() {
            return Err(RigError::CoolingDown(gpu));
        }
        let cfg = self.config.load();
        let coin_cfg = cfg.coin(coin)?;
        let (pool, wallet) = (coin_cfg.pool.clone(), coin_cfg.wallet.clone());
        drop(cfg);

        match self.supervisor.stop().await {
            Ok(()) | Err(RigError::NotRunning) => {}
            Err(e) => return Err(e),
        }

        if self.governor.profile(coin).is_some() {
            for gpu in self.known_gpus() {
                self.governor.apply(gpu, coin).await?;
            }
        }

        self.supervisor.start(coin, &pool, &wallet).await
    }

    /// Returns the combined rig status
    pub fn status(&self) -> RigStatus {
        RigStatus {
            miner: self.supervisor.status(),
            gpus: self.store.latest_all(),
            cooling_gpus: self.interlock.cooling_gpus(),
            overclocks: self.governor.all_applications(),
        }
    }

    /// Latest telemetry sample of every known GPU
    pub fn gpu_stats(&self) -> Vec<GpuSample> {
        self.store.latest_all()
    }

    /// Telemetry history of one GPU over the trailing window
    pub fn gpu_history(&self, gpu_index: usize, window_secs: i64) -> Vec<GpuSample> {
        self.store
            .window(gpu_index, chrono::Duration::seconds(window_secs))
    }

    /// Ranked profitability of every configured coin
    ///
    /// # Errors
    /// Returns `RigError::NoPriceData` when no price input is available.
    pub async fn profitability(&self) -> Result<Vec<ProfitabilityRecord>, RigError> {
        let cost = self.config.load().general.electricity_cost_per_kwh;
        self.evaluator.evaluate(cost).await
    }

    /// The most profitable coin right now
    ///
    /// # Errors
    /// Returns `RigError::NoPriceData` when no price input is available.
    pub async fn best_coin(&self) -> Result<ProfitabilityRecord, RigError> {
        let cost = self.config.load().general.electricity_cost_per_kwh;
        self.evaluator.best_coin(cost).await
    }

    /// Applies a registered overclock profile to one GPU
    ///
    /// # Errors
    /// See [`OverclockGovernor::apply`].
    pub async fn apply_overclock(&self, gpu_index: usize, name: &str) -> Result<(), RigError> {
        self.governor.apply(gpu_index, name).await
    }

    /// Reverts one GPU to its previously applied profile
    ///
    /// # Errors
    /// See [`OverclockGovernor::rollback`].
    pub async fn rollback_overclock(&self, gpu_index: usize) -> Result<(), RigError> {
        self.governor.rollback(gpu_index).await
    }

    /// Resets one GPU to vendor default clocks
    pub async fn reset_overclock(&self, gpu_index: usize) {
        self.governor.reset(gpu_index).await
    }

    /// Overclock applications recorded per GPU
    pub fn current_overclocks(&self) -> HashMap<usize, OverclockApplication> {
        self.governor.all_applications()
    }

    /// Recent safety and crash events, oldest first
    pub fn last_events(&self) -> Vec<RigEvent> {
        self.events.recent()
    }

    /// One auto-switch evaluation
    ///
    /// Switches to the most profitable coin only when the miner is
    /// running, auto-switching is enabled, and the profit advantage over
    /// the currently mined coin exceeds the configured margin.
    pub async fn auto_switch_tick(&self) {
        let cfg = self.config.load();
        if !cfg.autoswitch.enabled {
            return;
        }
        if self.supervisor.phase() != MinerPhase::Running {
            return;
        }
        let Some(session) = self.supervisor.last_session() else {
            return;
        };
        let cost = cfg.general.electricity_cost_per_kwh;
        let margin = cfg.autoswitch.margin_usd;
        drop(cfg);

        let ranked = match self.evaluator.evaluate(cost).await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Auto-switch skipped: {}", e);
                return;
            }
        };
        let best = &ranked[0];
        if best.coin == session.coin {
            return;
        }
        let Some(current) = ranked.iter().find(|r| r.coin == session.coin) else {
            log::debug!(
                "Auto-switch skipped: no price data for current coin {}",
                session.coin
            );
            return;
        };
        let advantage = best.daily_profit_usd - current.daily_profit_usd;
        if advantage <= margin {
            log::debug!(
                "Staying on {}: {} is only {:.2} USD/day ahead (margin {:.2})",
                session.coin,
                best.coin,
                advantage,
                margin
            );
            return;
        }

        log::info!(
            "Auto-switching {} -> {} ({:.2} USD/day advantage)",
            session.coin,
            best.coin,
            advantage
        );
        if let Err(e) = self.switch(&best.coin).await {
            log::warn!("Auto-switch to {} failed: {}", best.coin, e);
        }
    }

    /// Runs the sampler, watchdog, and auto-switch loops until shutdown
    ///
    /// The loops are independent: a sensor failure is a missed telemetry
    /// tick and nothing more.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let sampler = tokio::spawn(Arc::clone(&self).sampler_loop(shutdown.clone()));
        let watchdog = tokio::spawn(Arc::clone(&self.watchdog).run(shutdown.clone()));
        let autoswitch = tokio::spawn(Arc::clone(&self).autoswitch_loop(shutdown));

        let _ = sampler.await;
        let _ = watchdog.await;
        let _ = autoswitch.await;
        log::info!("Orchestrator stopped");
    }

    async fn sampler_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let poll_secs = self.config.load().telemetry.poll_interval_secs.max(1);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(poll_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!("Telemetry sampler running, poll every {}s", poll_secs);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sensor.poll().await {
                    Ok(samples) => {
                        for sample in samples {
                            self.store.record(sample);
                        }
                    }
                    Err(e) => log::warn!("Telemetry poll failed: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Telemetry sampler stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn autoswitch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval_mins = self.config.load().autoswitch.check_interval_mins.max(1);
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_mins * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.auto_switch_tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// GPU indexes known to the telemetry store, or GPU 0 before the
    /// first successful poll
    fn known_gpus(&self) -> Vec<usize> {
        let known: Vec<usize> = self
            .store
            .latest_all()
            .iter()
            .map(|s| s.gpu_index)
            .collect();
        if known.is_empty() { vec![0] } else { known }
    }
}
