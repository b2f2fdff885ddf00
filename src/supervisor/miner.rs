// src/supervisor/miner.rs
//! Miner process supervisor
//!
//! Owns the lifecycle of the external mining subprocess: start, stop,
//! restart, output parsing, and crash detection. The supervisor is pure
//! mechanism — it detects crashes and records them as state, but the
//! decision to restart (how many times, how fast) belongs to the watchdog.
//!
//! Concurrency model: at most one lifecycle operation is in flight at a
//! time (`try_lock` on an operation mutex, concurrent callers get `Busy`).
//! Observable state is handed out as copied snapshots. The output-stream
//! consumer and the exit observer run as detached tasks tagged with a
//! generation counter so a stale task can never corrupt a newer session.

use crate::config::{CoinConfig, Config};
use crate::notify::EventBus;
use crate::supervisor::launcher::{Launcher, MinerCommand, ProcessControl};
use crate::supervisor::parser::{self, ShareOutcome, StatUpdate};
use crate::types::{CrashEvent, MinerPhase, RigEvent};
use crate::utils::error::RigError;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

/// The coin/pool/wallet triple a mining session was started with
///
/// Remembered across crashes so `restart()` and the watchdog's crash
/// recovery can resume the same session.
#[derive(Debug, Clone)]
pub struct MinerSession {
    /// Coin symbol being mined
    pub coin: String,
    /// Pool address as "host:port"
    pub pool: String,
    /// Payout wallet address
    pub wallet: String,
}

/// Copy-on-read snapshot of the supervisor's observable state
#[derive(Debug, Clone, Serialize)]
pub struct MinerSnapshot {
    /// Current lifecycle phase
    pub phase: MinerPhase,
    /// Active coin symbol, if a session exists
    pub coin: Option<String>,
    /// Active pool address, if a session exists
    pub pool: Option<String>,
    /// Active wallet address, if a session exists
    pub wallet: Option<String>,
    /// When the current process was started, if one is alive
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since the process was started (zero unless Starting/Running)
    pub uptime_secs: u64,
    /// Last hashrate parsed from the output stream, in MH/s
    pub hashrate_mhs: f64,
    /// Accepted share count parsed from the output stream
    pub shares_accepted: u64,
    /// Rejected share count parsed from the output stream
    pub shares_rejected: u64,
    /// Most recent output line seen, parsed or not
    pub last_line: Option<String>,
    /// Exit code recorded by the last crash, if any
    pub last_exit_code: Option<i32>,
}

/// Counters updated by the output-stream consumer task
///
/// The consumer only touches these; it never reaches into the state
/// machine beyond the Starting→Running promotion.
struct StreamStats {
    hashrate_mhs_bits: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    last_line: Mutex<Option<String>>,
}

impl StreamStats {
    fn new() -> Self {
        StreamStats {
            hashrate_mhs_bits: AtomicU64::new(0f64.to_bits()),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            last_line: Mutex::new(None),
        }
    }

    fn reset(&self) {
        self.hashrate_mhs_bits
            .store(0f64.to_bits(), Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        *self.last_line.lock().expect("stats lock poisoned") = None;
    }

    fn observe_line(&self, line: &str) {
        *self.last_line.lock().expect("stats lock poisoned") = Some(line.to_string());
    }

    fn apply(&self, update: StatUpdate) {
        if let Some(rate) = update.hashrate_mhs {
            self.hashrate_mhs_bits
                .store(rate.to_bits(), Ordering::Relaxed);
        }
        match update.share {
            Some(ShareOutcome::Accepted) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Some(ShareOutcome::Rejected) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }

    fn hashrate_mhs(&self) -> f64 {
        f64::from_bits(self.hashrate_mhs_bits.load(Ordering::Relaxed))
    }
}

/// State owned exclusively by the supervisor, mutated only through its
/// lifecycle operations
struct Inner {
    phase: MinerPhase,
    session: Option<MinerSession>,
    started_at: Option<DateTime<Utc>>,
    last_exit_code: Option<i32>,
    /// Bumped on every start/stop so detached observer tasks from an
    /// older session become no-ops
    generation: u64,
}

/// Supervises the external miner subprocess
pub struct MinerSupervisor {
    config: Arc<ArcSwap<Config>>,
    launcher: Arc<dyn Launcher>,
    events: Arc<EventBus>,
    inner: Arc<Mutex<Inner>>,
    stats: Arc<StreamStats>,
    control: Mutex<Option<Arc<dyn ProcessControl>>>,
    /// Serializes lifecycle operations; concurrent attempts get `Busy`
    op_lock: AsyncMutex<()>,
}

impl MinerSupervisor {
    /// Creates a supervisor with no process running
    ///
    /// # Arguments
    /// * `config` - Process-wide configuration handle
    /// * `launcher` - Process spawning collaborator
    /// * `events` - Bus receiving crash events
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        launcher: Arc<dyn Launcher>,
        events: Arc<EventBus>,
    ) -> Self {
        MinerSupervisor {
            config,
            launcher,
            events,
            inner: Arc::new(Mutex::new(Inner {
                phase: MinerPhase::Stopped,
                session: None,
                started_at: None,
                last_exit_code: None,
                generation: 0,
            })),
            stats: Arc::new(StreamStats::new()),
            control: Mutex::new(None),
            op_lock: AsyncMutex::new(()),
        }
    }

    /// Starts mining the given coin
    ///
    /// Spawns the miner executable with coin-specific arguments, then
    /// transitions Stopped/Crashed → Starting. The phase advances to
    /// Running once the output consumer parses the first recognized line.
    ///
    /// # Errors
    /// * `UnknownCoin` - the coin has no configuration entry
    /// * `MinerBinaryMissing` - the executable is absent on disk
    /// * `AlreadyRunning` - current phase is Running or Starting
    /// * `Busy` - another lifecycle operation is in flight
    /// * `SpawnError` - the OS refused the spawn
    pub async fn start(&self, coin: &str, pool: &str, wallet: &str) -> Result<(), RigError> {
        let _op = self.op_lock.try_lock().map_err(|_| RigError::Busy)?;

        let cfg = self.config.load();
        let coin_cfg = cfg.coin(coin)?;
        let binary = binary_path(&cfg);
        if !binary.exists() {
            return Err(RigError::MinerBinaryMissing(binary));
        }

        {
            let inner = self.inner.lock().expect("supervisor lock poisoned");
            match inner.phase {
                MinerPhase::Stopped | MinerPhase::Crashed => {}
                MinerPhase::Starting | MinerPhase::Running => {
                    return Err(RigError::AlreadyRunning);
                }
                MinerPhase::Stopping => return Err(RigError::Busy),
            }
        }

        let command = build_command(&cfg, coin_cfg, binary, pool, wallet)?;
        log::info!(
            "Starting miner for {} on {} ({})",
            coin,
            pool,
            command.binary.display()
        );

        let spawned = self.launcher.spawn(&command)?;

        let generation = {
            let mut inner = self.inner.lock().expect("supervisor lock poisoned");
            inner.generation += 1;
            inner.phase = MinerPhase::Starting;
            inner.session = Some(MinerSession {
                coin: coin.to_string(),
                pool: pool.to_string(),
                wallet: wallet.to_string(),
            });
            inner.started_at = Some(Utc::now());
            inner.last_exit_code = None;
            inner.generation
        };
        self.stats.reset();
        *self.control.lock().expect("control lock poisoned") = Some(Arc::clone(&spawned.control));

        self.spawn_output_consumer(spawned.lines, generation);
        self.spawn_exit_observer(Arc::clone(&spawned.control), generation);

        Ok(())
    }

    /// Stops the miner process
    ///
    /// Sends a graceful termination signal, waits up to the configured
    /// grace period, escalates to a forceful kill, and ends in Stopped
    /// regardless of which path was used. The termination sequence runs
    /// on a detached task, so a cancelled caller cannot orphan the child.
    ///
    /// On a Crashed miner this merely acknowledges the crash (the process
    /// is already gone) and resets to Stopped.
    ///
    /// # Errors
    /// * `NotRunning` - current phase is Stopped
    /// * `Busy` - another lifecycle operation is in flight
    pub async fn stop(&self) -> Result<(), RigError> {
        let _op = self.op_lock.try_lock().map_err(|_| RigError::Busy)?;

        let control = {
            let mut inner = self.inner.lock().expect("supervisor lock poisoned");
            match inner.phase {
                MinerPhase::Stopped => return Err(RigError::NotRunning),
                MinerPhase::Crashed => {
                    inner.phase = MinerPhase::Stopped;
                    inner.started_at = None;
                    self.control.lock().expect("control lock poisoned").take();
                    return Ok(());
                }
                _ => {
                    inner.phase = MinerPhase::Stopping;
                    // Invalidate the exit observer: the coming exit is ours
                    inner.generation += 1;
                }
            }
            self.control.lock().expect("control lock poisoned").take()
        };

        let grace =
            std::time::Duration::from_secs(self.config.load().miner.grace_period_secs);
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            if let Some(control) = control {
                control.terminate().await;
                if tokio::time::timeout(grace, control.wait()).await.is_err() {
                    log::warn!(
                        "Miner did not exit within {}s; force killing",
                        grace.as_secs()
                    );
                    control.kill().await;
                    control.wait().await;
                }
            }
            let mut inner = inner.lock().expect("supervisor lock poisoned");
            inner.phase = MinerPhase::Stopped;
            inner.started_at = None;
            log::info!("Miner stopped");
        });

        handle.await?;
        Ok(())
    }

    /// Stops, then starts again with the same coin/pool/wallet
    ///
    /// The stop is awaited to completion before the new process spawns,
    /// so two miner processes are never alive at once.
    ///
    /// # Errors
    /// * `NotRunning` - no session was ever started
    /// * any error `start()` can produce
    pub async fn restart(&self) -> Result<(), RigError> {
        match self.stop().await {
            Ok(()) | Err(RigError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        let session = self
            .last_session()
            .ok_or(RigError::NotRunning)?;
        self.start(&session.coin, &session.pool, &session.wallet)
            .await
    }

    /// Returns a snapshot of the observable supervisor state
    pub fn status(&self) -> MinerSnapshot {
        let inner = self.inner.lock().expect("supervisor lock poisoned");
        let uptime_secs = match (inner.phase, inner.started_at) {
            (MinerPhase::Starting | MinerPhase::Running, Some(started)) => {
                (Utc::now() - started).num_seconds().max(0) as u64
            }
            _ => 0,
        };
        MinerSnapshot {
            phase: inner.phase,
            coin: inner.session.as_ref().map(|s| s.coin.clone()),
            pool: inner.session.as_ref().map(|s| s.pool.clone()),
            wallet: inner.session.as_ref().map(|s| s.wallet.clone()),
            started_at: inner.started_at,
            uptime_secs,
            hashrate_mhs: self.stats.hashrate_mhs(),
            shares_accepted: self.stats.accepted.load(Ordering::Relaxed),
            shares_rejected: self.stats.rejected.load(Ordering::Relaxed),
            last_line: self
                .stats
                .last_line
                .lock()
                .expect("stats lock poisoned")
                .clone(),
            last_exit_code: inner.last_exit_code,
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> MinerPhase {
        self.inner.lock().expect("supervisor lock poisoned").phase
    }

    /// The coin/pool/wallet of the most recent session, crashed or not
    pub fn last_session(&self) -> Option<MinerSession> {
        self.inner
            .lock()
            .expect("supervisor lock poisoned")
            .session
            .clone()
    }

    fn spawn_output_consumer(
        &self,
        mut lines: tokio::sync::mpsc::Receiver<String>,
        generation: u64,
    ) {
        let inner = Arc::clone(&self.inner);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                {
                    let guard = inner.lock().expect("supervisor lock poisoned");
                    if guard.generation != generation {
                        return;
                    }
                }
                stats.observe_line(&line);
                if let Some(update) = parser::parse_line(&line) {
                    stats.apply(update);
                    let mut guard = inner.lock().expect("supervisor lock poisoned");
                    if guard.generation == generation && guard.phase == MinerPhase::Starting {
                        guard.phase = MinerPhase::Running;
                        log::info!("Miner produced recognized output, now running");
                    }
                } else {
                    log::trace!("Unparsed miner output: {}", line);
                }
            }
        });
    }

    fn spawn_exit_observer(&self, control: Arc<dyn ProcessControl>, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let events = Arc::clone(&self.events);

        tokio::spawn(async move {
            let code = control.wait().await;

            let coin = {
                let mut guard = inner.lock().expect("supervisor lock poisoned");
                if guard.generation != generation {
                    // A stop() or newer start() superseded this session
                    return;
                }
                match guard.phase {
                    MinerPhase::Stopping | MinerPhase::Stopped => return,
                    _ => {
                        guard.phase = MinerPhase::Crashed;
                        guard.last_exit_code = code;
                        guard.started_at = None;
                        guard
                            .session
                            .as_ref()
                            .map(|s| s.coin.clone())
                            .unwrap_or_default()
                    }
                }
            };

            log::error!(
                "Miner process exited unexpectedly (exit code {:?}) while mining {}",
                code,
                coin
            );
            events.publish(RigEvent::Crash(CrashEvent {
                coin,
                exit_code: code,
                timestamp: Utc::now(),
            }));
        });
    }
}

/// Resolves the miner executable path from the configuration
fn binary_path(cfg: &Config) -> PathBuf {
    let name = if cfg!(windows) {
        format!("{}.exe", cfg.miner.binary)
    } else {
        cfg.miner.binary.clone()
    };
    cfg.general.miner_dir.join(name)
}

/// Builds the miner invocation for a coin (t-rex argument shape)
///
/// The pool address is substituted into a stratum URL template and
/// validated before the spawn.
fn build_command(
    cfg: &Config,
    coin_cfg: &CoinConfig,
    binary: PathBuf,
    pool: &str,
    wallet: &str,
) -> Result<MinerCommand, RigError> {
    let pool_url = format!("stratum+tcp://{}", pool);
    Url::parse(&pool_url)?;

    Ok(MinerCommand {
        binary,
        args: vec![
            "-a".into(),
            coin_cfg.algorithm.clone(),
            "-o".into(),
            pool_url,
            "-u".into(),
            format!("{}.{}", wallet, cfg.general.worker_name),
            "-p".into(),
            "x".into(),
        ],
        workdir: Some(cfg.general.miner_dir.clone()),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::supervisor::launcher::SpawnedProcess;
    use async_trait::async_trait;
    use tokio::sync::{mpsc, watch};

    /// Scripted process handle; tests drive exits through `exit_tx`
    ///
    /// A process with `ignore_terminate` set survives the graceful
    /// signal and dies only to `kill()`, like a hung miner.
    pub struct FakeControl {
        pub exit_tx: watch::Sender<Option<i32>>,
        pub ignore_terminate: std::sync::atomic::AtomicBool,
        /// Keeps the channel open so `exit_tx.send` cannot fail before the
        /// exit observer task gets polled and subscribes
        _exit_rx: watch::Receiver<Option<i32>>,
    }

    #[async_trait]
    impl ProcessControl for FakeControl {
        async fn wait(&self) -> Option<i32> {
            let mut rx = self.exit_tx.subscribe();
            loop {
                if let Some(code) = *rx.borrow() {
                    return Some(code);
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        }

        async fn terminate(&self) {
            if self.ignore_terminate.load(Ordering::Relaxed) {
                return;
            }
            let _ = self.exit_tx.send(Some(0));
        }

        async fn kill(&self) {
            let _ = self.exit_tx.send(Some(137));
        }

        fn pid(&self) -> Option<u32> {
            None
        }
    }

    /// One spawned fake process, visible to the test
    pub struct FakeHandle {
        pub control: Arc<FakeControl>,
        pub line_tx: mpsc::Sender<String>,
        pub command: MinerCommand,
    }

    impl FakeHandle {
        pub fn is_alive(&self) -> bool {
            self.control.exit_tx.borrow().is_none()
        }
    }

    /// Launcher that records every spawn and hands out scripted handles
    pub struct FakeLauncher {
        pub spawned: Mutex<Vec<Arc<FakeHandle>>>,
    }

    impl FakeLauncher {
        pub fn new() -> Arc<Self> {
            Arc::new(FakeLauncher {
                spawned: Mutex::new(Vec::new()),
            })
        }

        pub fn handle(&self, index: usize) -> Arc<FakeHandle> {
            Arc::clone(&self.spawned.lock().unwrap()[index])
        }

        pub fn spawn_count(&self) -> usize {
            self.spawned.lock().unwrap().len()
        }

        pub fn alive_count(&self) -> usize {
            self.spawned
                .lock()
                .unwrap()
                .iter()
                .filter(|h| h.is_alive())
                .count()
        }
    }

    impl Launcher for FakeLauncher {
        fn spawn(&self, command: &MinerCommand) -> Result<SpawnedProcess, RigError> {
            let (line_tx, lines) = mpsc::channel(32);
            let (exit_tx, exit_rx) = watch::channel(None);
            let control = Arc::new(FakeControl {
                exit_tx,
                ignore_terminate: std::sync::atomic::AtomicBool::new(false),
                _exit_rx: exit_rx,
            });
            let handle = Arc::new(FakeHandle {
                control: Arc::clone(&control),
                line_tx,
                command: command.clone(),
            });
            self.spawned.lock().unwrap().push(handle);
            Ok(SpawnedProcess {
                lines,
                control,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeLauncher;
    use super::*;
    use crate::config::CoinConfig;
    use std::time::Duration;

    fn test_config(miner_dir: &std::path::Path) -> Config {
        let mut cfg = Config::default();
        cfg.general.miner_dir = miner_dir.to_path_buf();
        cfg.miner.grace_period_secs = 1;
        cfg.coins.insert(
            "RVN".into(),
            CoinConfig {
                algorithm: "kawpow".into(),
                pool: "rvn.pool.example:6060".into(),
                wallet: "RWallet".into(),
                expected_hashrate_mhs: 15.5,
                power_draw_w: 90.0,
                api_id: Some("ravencoin".into()),
                revenue_per_mhs_day: 0.5,
                overclock: None,
            },
        );
        cfg
    }

    fn miner_dir_with_binary() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rig-orchestrator-test-{}-{}",
            std::process::id(),
            rand_suffix()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("t-rex"), b"").unwrap();
        dir
    }

    fn rand_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    fn make_supervisor(cfg: Config) -> (Arc<MinerSupervisor>, Arc<FakeLauncher>, Arc<EventBus>) {
        let launcher = FakeLauncher::new();
        let events = Arc::new(EventBus::new(vec![]));
        let supervisor = Arc::new(MinerSupervisor::new(
            Arc::new(ArcSwap::from_pointee(cfg)),
            launcher.clone(),
            Arc::clone(&events),
        ));
        (supervisor, launcher, events)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn start_reaches_running_after_first_parsed_line() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        assert_eq!(supervisor.phase(), MinerPhase::Starting);

        let handle = launcher.handle(0);
        handle
            .line_tx
            .send("t-rex 0.26.8, NVIDIA driver".into())
            .await
            .unwrap();
        settle().await;
        // Unrecognized banner line does not advance the phase
        assert_eq!(supervisor.phase(), MinerPhase::Starting);

        handle
            .line_tx
            .send("GPU #0: 15.43 MH/s".into())
            .await
            .unwrap();
        settle().await;

        let status = supervisor.status();
        assert_eq!(status.phase, MinerPhase::Running);
        assert_eq!(status.hashrate_mhs, 15.43);
        assert_eq!(status.coin.as_deref(), Some("RVN"));
    }

    #[tokio::test]
    async fn start_while_running_fails_with_already_running() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        let err = supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::AlreadyRunning));
        assert_eq!(launcher.spawn_count(), 1);
        assert_eq!(supervisor.phase(), MinerPhase::Starting);
    }

    #[tokio::test]
    async fn unknown_coin_is_rejected_before_spawn() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        let err = supervisor
            .start("DOGE", "pool:1", "wallet")
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::UnknownCoin(_)));
        assert_eq!(launcher.spawn_count(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_rejected_before_spawn() {
        let dir = std::env::temp_dir().join(format!("rig-no-binary-{}", rand_suffix()));
        std::fs::create_dir_all(&dir).unwrap();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        let err = supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::MinerBinaryMissing(_)));
        assert_eq!(launcher.spawn_count(), 0);
    }

    #[tokio::test]
    async fn stop_on_stopped_supervisor_fails_with_not_running() {
        let dir = miner_dir_with_binary();
        let (supervisor, _, _) = make_supervisor(test_config(&dir));
        assert!(matches!(
            supervisor.stop().await.unwrap_err(),
            RigError::NotRunning
        ));
    }

    #[tokio::test]
    async fn restart_never_leaves_two_processes_alive() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        supervisor.restart().await.unwrap();
        settle().await;

        assert_eq!(launcher.spawn_count(), 2);
        assert_eq!(launcher.alive_count(), 1);
        assert!(!launcher.handle(0).is_alive());
        assert_eq!(supervisor.phase(), MinerPhase::Starting);
    }

    #[tokio::test]
    async fn unexpected_exit_flips_to_crashed_and_publishes_event() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, events) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        launcher
            .handle(0)
            .control
            .exit_tx
            .send(Some(1))
            .unwrap();
        settle().await;

        let status = supervisor.status();
        assert_eq!(status.phase, MinerPhase::Crashed);
        assert_eq!(status.last_exit_code, Some(1));

        let recent = events.recent();
        assert_eq!(recent.len(), 1);
        assert!(matches!(&recent[0], RigEvent::Crash(e) if e.coin == "RVN"));
    }

    #[tokio::test]
    async fn start_is_permitted_from_crashed() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        launcher.handle(0).control.exit_tx.send(Some(1)).unwrap();
        settle().await;
        assert_eq!(supervisor.phase(), MinerPhase::Crashed);

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        assert_eq!(supervisor.phase(), MinerPhase::Starting);
        assert_eq!(launcher.spawn_count(), 2);
    }

    #[tokio::test]
    async fn explicit_stop_does_not_count_as_crash() {
        let dir = miner_dir_with_binary();
        let (supervisor, _, events) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        supervisor.stop().await.unwrap();
        settle().await;

        assert_eq!(supervisor.phase(), MinerPhase::Stopped);
        assert!(events.recent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_escalates_to_kill_when_terminate_is_ignored() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        let handle = launcher.handle(0);
        handle
            .control
            .ignore_terminate
            .store(true, Ordering::Relaxed);

        // The grace period elapses, then the kill lands
        supervisor.stop().await.unwrap();

        assert_eq!(*handle.control.exit_tx.borrow(), Some(137));
        assert!(!handle.is_alive());
        assert_eq!(supervisor.phase(), MinerPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lifecycle_operation_is_rejected_as_busy() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        // Keep the stop in flight for the whole grace period
        launcher
            .handle(0)
            .control
            .ignore_terminate
            .store(true, Ordering::Relaxed);

        let stopper = Arc::clone(&supervisor);
        let stop_task = tokio::spawn(async move { stopper.stop().await });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let err = supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::Busy));
        assert_eq!(launcher.spawn_count(), 1);

        stop_task.await.unwrap().unwrap();
        assert_eq!(supervisor.phase(), MinerPhase::Stopped);
    }

    #[tokio::test]
    async fn shares_are_counted_from_output() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        let handle = launcher.handle(0);
        handle
            .line_tx
            .send("[ OK ] 1/1 - 15.43 MH/s".into())
            .await
            .unwrap();
        handle
            .line_tx
            .send("share rejected by pool".into())
            .await
            .unwrap();
        settle().await;

        let status = supervisor.status();
        assert_eq!(status.shares_accepted, 1);
        assert_eq!(status.shares_rejected, 1);
        assert_eq!(
            status.last_line.as_deref(),
            Some("share rejected by pool")
        );
    }

    #[tokio::test]
    async fn command_is_built_with_templated_pool_url() {
        let dir = miner_dir_with_binary();
        let (supervisor, launcher, _) = make_supervisor(test_config(&dir));

        supervisor
            .start("RVN", "rvn.pool.example:6060", "RWallet")
            .await
            .unwrap();
        let cmd = launcher.handle(0).command.clone();
        assert!(cmd.args.contains(&"stratum+tcp://rvn.pool.example:6060".to_string()));
        assert!(cmd.args.contains(&"RWallet.worker".to_string()));
        assert!(cmd.args.contains(&"kawpow".to_string()));
    }
}
