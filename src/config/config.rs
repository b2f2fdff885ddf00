// src/config/config.rs
use crate::{overclock::OverclockProfile, utils::error::RigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for the orchestrator
///
/// Contains all settings needed to run the orchestration core: coin
/// definitions (pool/wallet defaults, expected hashrates, overclock
/// profiles), safety thresholds, watchdog policy, and auto-switch policy.
///
/// Loaded once at startup and held process-wide behind an
/// `ArcSwap<Config>`; settings updates atomically replace the whole
/// structure rather than mutating it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General rig settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Telemetry sampling settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Temperature safety thresholds
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Watchdog tick/recovery policy
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Profitability auto-switch policy
    #[serde(default)]
    pub autoswitch: AutoSwitchConfig,

    /// Hard limits for overclock profiles
    #[serde(default)]
    pub limits: ClockLimits,

    /// Miner executable settings
    #[serde(default)]
    pub miner: MinerConfig,

    /// Notification delivery settings
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Supported coins, keyed by symbol (e.g. "RVN", "ETC")
    #[serde(default)]
    pub coins: BTreeMap<String, CoinConfig>,
}

/// General rig settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker name appended to the wallet in the miner's user field
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    /// Coin mined when no explicit coin is requested (schedule window entry)
    #[serde(default = "default_coin")]
    pub default_coin: String,

    /// Directory containing the miner executables
    #[serde(default = "default_miner_dir")]
    pub miner_dir: PathBuf,

    /// Electricity price in USD per kWh, used for profitability
    #[serde(default = "default_electricity_cost")]
    pub electricity_cost_per_kwh: f64,
}

/// Telemetry sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Seconds between sensor polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Samples kept per GPU before FIFO eviction kicks in
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Temperature thresholds in degrees Celsius
///
/// Invariant: `warn_c <= throttle_c <= emergency_c` and
/// `hysteresis_c < emergency_c`. Violations are rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Emit a Warning safety event at or above this temperature
    #[serde(default = "default_warn_c")]
    pub warn_c: f64,

    /// Emit a ThrottleRequest safety event at or above this temperature
    #[serde(default = "default_throttle_c")]
    pub throttle_c: f64,

    /// Emergency stop at or above this temperature
    #[serde(default = "default_emergency_c")]
    pub emergency_c: f64,

    /// Cooldown clears once temperature falls below this threshold
    #[serde(default = "default_hysteresis_c")]
    pub hysteresis_c: f64,
}

/// Watchdog tick and crash-recovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between watchdog ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Restart the miner automatically after a crash
    #[serde(default = "default_true")]
    pub auto_restart: bool,

    /// Give up after this many restart attempts in one crash episode
    #[serde(default = "default_max_restarts")]
    pub max_restart_attempts: u32,

    /// Base delay between consecutive restart attempts, doubled per attempt
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_secs: u64,

    /// Ceiling for the doubled backoff delay
    #[serde(default = "default_restart_backoff_cap")]
    pub restart_backoff_cap_secs: u64,

    /// Quiet period after which the attempt counter resets
    #[serde(default = "default_restart_reset")]
    pub restart_reset_secs: u64,

    /// Restart the miner when its reported hashrate stays below this
    /// (MH/s) for two consecutive ticks. Zero disables the check.
    #[serde(default = "default_hashrate_threshold")]
    pub hashrate_threshold_mhs: f64,

    /// Optional "HH:MM-HH:MM" window (UTC) during which mining is allowed.
    /// Overnight windows such as "22:00-06:00" wrap past midnight.
    #[serde(default)]
    pub mining_hours: Option<String>,
}

/// Profitability auto-switch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSwitchConfig {
    /// Switch to the most profitable coin automatically
    #[serde(default)]
    pub enabled: bool,

    /// Minimum daily-profit advantage (USD) before a switch is made,
    /// to avoid thrashing on price noise
    #[serde(default = "default_switch_margin")]
    pub margin_usd: f64,

    /// Minutes between profitability checks
    #[serde(default = "default_switch_interval")]
    pub check_interval_mins: u64,
}

/// Hard limits every overclock profile must satisfy before it is
/// programmed into hardware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockLimits {
    /// Maximum magnitude of the core clock offset in MHz
    #[serde(default = "default_max_core_offset")]
    pub max_core_offset_mhz: i32,

    /// Lowest allowed memory clock offset in MHz
    #[serde(default = "default_min_memory_offset")]
    pub min_memory_offset_mhz: i32,

    /// Highest allowed memory clock offset in MHz
    #[serde(default = "default_max_memory_offset")]
    pub max_memory_offset_mhz: i32,

    /// Lowest allowed power limit percentage
    #[serde(default = "default_min_power_pct")]
    pub min_power_limit_pct: u32,

    /// Highest allowed power limit percentage
    #[serde(default = "default_max_power_pct")]
    pub max_power_limit_pct: u32,
}

/// Miner executable settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Executable name looked up inside `general.miner_dir`
    #[serde(default = "default_miner_binary")]
    pub binary: String,

    /// Seconds to wait for a graceful exit before force-killing
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

/// Notification delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    /// Discord webhook URL; events are posted there when set
    #[serde(default)]
    pub discord_webhook: Option<String>,
}

/// Per-coin configuration: how to mine it and how to value it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinConfig {
    /// Algorithm name passed to the miner (e.g. "kawpow")
    pub algorithm: String,

    /// Default pool address as "host:port"
    pub pool: String,

    /// Default payout wallet address
    pub wallet: String,

    /// Hashrate this rig is expected to produce for the coin, in MH/s
    #[serde(default)]
    pub expected_hashrate_mhs: f64,

    /// Board power draw while mining this coin, in watts
    #[serde(default = "default_power_draw")]
    pub power_draw_w: f64,

    /// Identifier of the coin at the market price source (CoinGecko id)
    #[serde(default)]
    pub api_id: Option<String>,

    /// Coins earned per MH/s per day at current network conditions,
    /// multiplied by the USD price to estimate daily revenue
    #[serde(default)]
    pub revenue_per_mhs_day: f64,

    /// Overclock profile tuned for this coin's algorithm
    #[serde(default)]
    pub overclock: Option<OverclockProfile>,
}

fn default_worker_name() -> String {
    "worker".into()
}

fn default_coin() -> String {
    "RVN".into()
}

fn default_miner_dir() -> PathBuf {
    "miners".into()
}

fn default_electricity_cost() -> f64 {
    0.12
}

fn default_poll_interval() -> u64 {
    5
}

fn default_capacity() -> usize {
    60
}

fn default_warn_c() -> f64 {
    75.0
}

fn default_throttle_c() -> f64 {
    80.0
}

fn default_emergency_c() -> f64 {
    85.0
}

fn default_hysteresis_c() -> f64 {
    75.0
}

fn default_tick_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_backoff() -> u64 {
    60
}

fn default_restart_backoff_cap() -> u64 {
    600
}

fn default_restart_reset() -> u64 {
    300
}

fn default_hashrate_threshold() -> f64 {
    20.0
}

fn default_switch_margin() -> f64 {
    0.25
}

fn default_switch_interval() -> u64 {
    60
}

fn default_max_core_offset() -> i32 {
    300
}

fn default_min_memory_offset() -> i32 {
    -500
}

fn default_max_memory_offset() -> i32 {
    1500
}

fn default_min_power_pct() -> u32 {
    50
}

fn default_max_power_pct() -> u32 {
    120
}

fn default_miner_binary() -> String {
    "t-rex".into()
}

fn default_grace_period() -> u64 {
    10
}

fn default_power_draw() -> f64 {
    90.0
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            worker_name: default_worker_name(),
            default_coin: default_coin(),
            miner_dir: default_miner_dir(),
            electricity_cost_per_kwh: default_electricity_cost(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            poll_interval_secs: default_poll_interval(),
            capacity: default_capacity(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            warn_c: default_warn_c(),
            throttle_c: default_throttle_c(),
            emergency_c: default_emergency_c(),
            hysteresis_c: default_hysteresis_c(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            tick_interval_secs: default_tick_interval(),
            auto_restart: true,
            max_restart_attempts: default_max_restarts(),
            restart_backoff_secs: default_restart_backoff(),
            restart_backoff_cap_secs: default_restart_backoff_cap(),
            restart_reset_secs: default_restart_reset(),
            hashrate_threshold_mhs: default_hashrate_threshold(),
            mining_hours: None,
        }
    }
}

impl Default for AutoSwitchConfig {
    fn default() -> Self {
        AutoSwitchConfig {
            enabled: false,
            margin_usd: default_switch_margin(),
            check_interval_mins: default_switch_interval(),
        }
    }
}

impl Default for ClockLimits {
    fn default() -> Self {
        ClockLimits {
            max_core_offset_mhz: default_max_core_offset(),
            min_memory_offset_mhz: default_min_memory_offset(),
            max_memory_offset_mhz: default_max_memory_offset(),
            min_power_limit_pct: default_min_power_pct(),
            max_power_limit_pct: default_max_power_pct(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            binary: default_miner_binary(),
            grace_period_secs: default_grace_period(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig::default(),
            telemetry: TelemetryConfig::default(),
            safety: SafetyConfig::default(),
            watchdog: WatchdogConfig::default(),
            autoswitch: AutoSwitchConfig::default(),
            limits: ClockLimits::default(),
            miner: MinerConfig::default(),
            notifications: NotificationsConfig::default(),
            coins: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(RigError)` - If the file couldn't be read, parsed, or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RigError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            RigError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_str)
            .map_err(|e| RigError::ConfigError(format!("Invalid config format: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants that serde cannot express
    ///
    /// # Errors
    /// Returns `RigError::ConfigError` when thresholds are mis-ordered,
    /// limit ranges are inverted, or the default coin has no entry.
    pub fn validate(&self) -> Result<(), RigError> {
        let s = &self.safety;
        if !(s.warn_c <= s.throttle_c && s.throttle_c <= s.emergency_c) {
            return Err(RigError::ConfigError(format!(
                "Safety thresholds must be ordered warn <= throttle <= emergency, got {}/{}/{}",
                s.warn_c, s.throttle_c, s.emergency_c
            )));
        }
        if s.hysteresis_c >= s.emergency_c {
            return Err(RigError::ConfigError(format!(
                "Hysteresis threshold {} must be below the emergency threshold {}",
                s.hysteresis_c, s.emergency_c
            )));
        }
        if self.limits.min_memory_offset_mhz > self.limits.max_memory_offset_mhz {
            return Err(RigError::ConfigError(
                "Memory offset limit range is inverted".into(),
            ));
        }
        if self.limits.min_power_limit_pct > self.limits.max_power_limit_pct {
            return Err(RigError::ConfigError(
                "Power limit range is inverted".into(),
            ));
        }
        if !self.coins.is_empty() && !self.coins.contains_key(&self.general.default_coin) {
            return Err(RigError::ConfigError(format!(
                "Default coin {} has no [coins.{}] entry",
                self.general.default_coin, self.general.default_coin
            )));
        }
        Ok(())
    }

    /// Looks up the configuration for a coin symbol
    ///
    /// # Errors
    /// Returns `RigError::UnknownCoin` if the symbol has no entry.
    pub fn coin(&self, symbol: &str) -> Result<&CoinConfig, RigError> {
        self.coins
            .get(symbol)
            .ok_or_else(|| RigError::UnknownCoin(symbol.to_string()))
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Rig Orchestrator Configuration\n\n");
        template.push_str("[general]\n");
        template.push_str("worker_name = \"worker\"\n");
        template.push_str("default_coin = \"RVN\"\n");
        template.push_str("# Directory containing the miner executables\n");
        template.push_str("miner_dir = \"miners\"\n");
        template.push_str("electricity_cost_per_kwh = 0.12\n\n");

        template.push_str("[telemetry]\n");
        template.push_str("poll_interval_secs = 5\n");
        template.push_str("# Rolling window size per GPU\n");
        template.push_str("capacity = 60\n\n");

        template.push_str("[safety]\n");
        template.push_str("warn_c = 75.0\n");
        template.push_str("throttle_c = 80.0\n");
        template.push_str("emergency_c = 85.0\n");
        template.push_str("hysteresis_c = 75.0\n\n");

        template.push_str("[watchdog]\n");
        template.push_str("tick_interval_secs = 30\n");
        template.push_str("auto_restart = true\n");
        template.push_str("max_restart_attempts = 5\n");
        template.push_str("restart_backoff_secs = 60\n");
        template.push_str("restart_backoff_cap_secs = 600\n");
        template.push_str("restart_reset_secs = 300\n");
        template.push_str("# Restart after two consecutive ticks below this (0 disables)\n");
        template.push_str("hashrate_threshold_mhs = 20.0\n");
        template.push_str("# Uncomment to mine only inside a daily window (UTC)\n");
        template.push_str("# mining_hours = \"22:00-06:00\"\n\n");

        template.push_str("[autoswitch]\n");
        template.push_str("enabled = false\n");
        template.push_str("margin_usd = 0.25\n");
        template.push_str("check_interval_mins = 60\n\n");

        template.push_str("[limits]\n");
        template.push_str("max_core_offset_mhz = 300\n");
        template.push_str("min_memory_offset_mhz = -500\n");
        template.push_str("max_memory_offset_mhz = 1500\n");
        template.push_str("min_power_limit_pct = 50\n");
        template.push_str("max_power_limit_pct = 120\n\n");

        template.push_str("[miner]\n");
        template.push_str("binary = \"t-rex\"\n");
        template.push_str("grace_period_secs = 10\n\n");

        template.push_str("[notifications]\n");
        template.push_str("# discord_webhook = \"https://discord.com/api/webhooks/...\"\n\n");

        template.push_str("[coins.RVN]\n");
        template.push_str("algorithm = \"kawpow\"\n");
        template.push_str("pool = \"rvn.2miners.com:6060\"\n");
        template.push_str("wallet = \"your_rvn_wallet\"\n");
        template.push_str("expected_hashrate_mhs = 15.5\n");
        template.push_str("power_draw_w = 90\n");
        template.push_str("api_id = \"ravencoin\"\n");
        template.push_str("revenue_per_mhs_day = 0.5\n");
        template.push_str("[coins.RVN.overclock]\n");
        template.push_str("core_clock_offset = -100\n");
        template.push_str("memory_clock_offset = 800\n");
        template.push_str("power_limit_pct = 80\n\n");

        template.push_str("[coins.ETC]\n");
        template.push_str("algorithm = \"etchash\"\n");
        template.push_str("pool = \"etc.2miners.com:1010\"\n");
        template.push_str("wallet = \"your_etc_wallet\"\n");
        template.push_str("expected_hashrate_mhs = 28.0\n");
        template.push_str("power_draw_w = 85\n");
        template.push_str("api_id = \"ethereum-classic\"\n");
        template.push_str("revenue_per_mhs_day = 0.003\n");

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_round_trips_through_toml() {
        let template = Config::generate_template();
        let config: Config = toml::from_str(&template).expect("template must parse");
        config.validate().expect("template must validate");
        assert_eq!(config.general.default_coin, "RVN");
        assert_eq!(config.safety.emergency_c, 85.0);
        assert!(config.coins.contains_key("ETC"));
        let rvn = config.coin("RVN").unwrap();
        assert_eq!(rvn.algorithm, "kawpow");
        assert_eq!(rvn.overclock.as_ref().unwrap().power_limit_pct, 80);
    }

    #[test]
    fn misordered_thresholds_are_rejected() {
        let mut config = Config::default();
        config.safety.warn_c = 90.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RigError::ConfigError(_)));
    }

    #[test]
    fn unknown_coin_lookup_fails() {
        let config = Config::default();
        assert!(matches!(
            config.coin("DOGE"),
            Err(RigError::UnknownCoin(sym)) if sym == "DOGE"
        ));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.telemetry.capacity, 60);
        assert_eq!(config.watchdog.max_restart_attempts, 5);
        assert_eq!(config.limits.max_power_limit_pct, 120);
        assert!(config.watchdog.mining_hours.is_none());
    }
}
