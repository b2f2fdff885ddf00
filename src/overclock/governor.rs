// src/overclock/governor.rs
//! Overclock apply/rollback governor
//!
//! Applies named clock/power profiles per GPU, validates them against
//! configured hard limits before anything touches hardware, and tracks
//! what is applied so every change can be safely reversed.

use crate::config::ClockLimits;
use crate::utils::error::RigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A named set of GPU clock/power adjustments tuned for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverclockProfile {
    /// Core clock offset in MHz (may be negative)
    #[serde(default)]
    pub core_clock_offset: i32,
    /// Memory clock offset in MHz (may be negative)
    #[serde(default)]
    pub memory_clock_offset: i32,
    /// Power limit as a percentage of the board default
    #[serde(default = "default_power_limit")]
    pub power_limit_pct: u32,
}

fn default_power_limit() -> u32 {
    100
}

impl OverclockProfile {
    /// The vendor-default profile: zero offsets, default power limit
    pub fn safe_default() -> Self {
        OverclockProfile {
            core_clock_offset: 0,
            memory_clock_offset: 0,
            power_limit_pct: 100,
        }
    }
}

/// Record of which profile is applied to a GPU and what came before it
#[derive(Debug, Clone, Serialize)]
pub struct OverclockApplication {
    /// Profile currently programmed into the GPU
    pub current: OverclockProfile,
    /// Profile that was applied immediately before, kept for rollback
    pub previous: Option<OverclockProfile>,
}

/// Collaborator that programs clocks into the actual hardware
#[async_trait]
pub trait HardwareControl: Send + Sync {
    /// Programs the given offsets and power limit into one GPU
    ///
    /// # Errors
    /// Returns `RigError::HardwareRejected` when the driver or vendor
    /// tool refuses the setting.
    async fn apply_clocks(
        &self,
        gpu_index: usize,
        core_offset: i32,
        memory_offset: i32,
        power_limit_pct: u32,
    ) -> Result<(), RigError>;
}

/// Hardware control that only logs the intended programming
///
/// Used when no vendor overclocking tool is available; the governor's
/// bookkeeping still works so the rest of the system behaves identically.
pub struct LoggingHardwareControl;

#[async_trait]
impl HardwareControl for LoggingHardwareControl {
    async fn apply_clocks(
        &self,
        gpu_index: usize,
        core_offset: i32,
        memory_offset: i32,
        power_limit_pct: u32,
    ) -> Result<(), RigError> {
        log::info!(
            "GPU {}: core {:+} MHz, memory {:+} MHz, power limit {}% (simulated)",
            gpu_index,
            core_offset,
            memory_offset,
            power_limit_pct
        );
        Ok(())
    }
}

/// Applies and reverses overclock profiles, one application per GPU
pub struct OverclockGovernor {
    hardware: Arc<dyn HardwareControl>,
    limits: ClockLimits,
    profiles: Mutex<HashMap<String, OverclockProfile>>,
    applied: Mutex<HashMap<usize, OverclockApplication>>,
}

impl OverclockGovernor {
    /// Creates a governor with no profiles registered
    ///
    /// # Arguments
    /// * `hardware` - The clock programming collaborator
    /// * `limits` - Hard limits every profile must satisfy
    pub fn new(hardware: Arc<dyn HardwareControl>, limits: ClockLimits) -> Self {
        OverclockGovernor {
            hardware,
            limits,
            profiles: Mutex::new(HashMap::new()),
            applied: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a profile under a name (normally the coin symbol)
    ///
    /// Registration does not validate; validation happens on `apply` so
    /// limit changes take effect without re-registering.
    pub fn register(&self, name: impl Into<String>, profile: OverclockProfile) {
        self.profiles
            .lock()
            .expect("profile lock poisoned")
            .insert(name.into(), profile);
    }

    /// Names of all registered profiles, sorted
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profiles
            .lock()
            .expect("profile lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Looks up a registered profile by name
    pub fn profile(&self, name: &str) -> Option<OverclockProfile> {
        self.profiles
            .lock()
            .expect("profile lock poisoned")
            .get(name)
            .cloned()
    }

    /// Applies a registered profile to a GPU
    ///
    /// On success the new application is recorded with the prior profile
    /// retained for rollback. A validation or hardware failure leaves the
    /// recorded application untouched.
    ///
    /// # Errors
    /// * `UnknownProfile` - no profile registered under that name
    /// * `UnsafeProfile` - offsets exceed the configured hard limits
    /// * `HardwareRejected` - the hardware collaborator refused
    pub async fn apply(&self, gpu_index: usize, name: &str) -> Result<(), RigError> {
        let profile = self
            .profile(name)
            .ok_or_else(|| RigError::UnknownProfile(name.to_string()))?;
        self.validate(&profile)?;

        self.hardware
            .apply_clocks(
                gpu_index,
                profile.core_clock_offset,
                profile.memory_clock_offset,
                profile.power_limit_pct,
            )
            .await?;

        let mut applied = self.applied.lock().expect("application lock poisoned");
        let previous = applied.get(&gpu_index).map(|a| a.current.clone());
        applied.insert(
            gpu_index,
            OverclockApplication {
                current: profile,
                previous,
            },
        );
        log::info!("Applied overclock profile {} to GPU {}", name, gpu_index);
        Ok(())
    }

    /// Reapplies the profile recorded before the current one
    ///
    /// Falls back to the safe-default profile when the record has no
    /// previous entry. After a rollback the application has no further
    /// previous profile to return to.
    ///
    /// # Errors
    /// * `NothingToRollback` - no application was ever recorded
    /// * `HardwareRejected` - the hardware collaborator refused
    pub async fn rollback(&self, gpu_index: usize) -> Result<(), RigError> {
        let target = {
            let applied = self.applied.lock().expect("application lock poisoned");
            let record = applied
                .get(&gpu_index)
                .ok_or(RigError::NothingToRollback(gpu_index))?;
            record
                .previous
                .clone()
                .unwrap_or_else(OverclockProfile::safe_default)
        };

        self.hardware
            .apply_clocks(
                gpu_index,
                target.core_clock_offset,
                target.memory_clock_offset,
                target.power_limit_pct,
            )
            .await?;

        let mut applied = self.applied.lock().expect("application lock poisoned");
        applied.insert(
            gpu_index,
            OverclockApplication {
                current: target,
                previous: None,
            },
        );
        log::info!("Rolled back overclock on GPU {}", gpu_index);
        Ok(())
    }

    /// Clears all offsets back to vendor defaults
    ///
    /// A safety action that never fails: hardware errors are logged and
    /// the application record is cleared regardless, so the governor's
    /// view matches the requested state.
    pub async fn reset(&self, gpu_index: usize) {
        let default = OverclockProfile::safe_default();
        if let Err(e) = self
            .hardware
            .apply_clocks(
                gpu_index,
                default.core_clock_offset,
                default.memory_clock_offset,
                default.power_limit_pct,
            )
            .await
        {
            log::warn!("Reset of GPU {} was rejected by hardware: {}", gpu_index, e);
        }
        self.applied
            .lock()
            .expect("application lock poisoned")
            .remove(&gpu_index);
        log::info!("Reset GPU {} to vendor defaults", gpu_index);
    }

    /// Currently recorded application for a GPU, if any
    pub fn current(&self, gpu_index: usize) -> Option<OverclockApplication> {
        self.applied
            .lock()
            .expect("application lock poisoned")
            .get(&gpu_index)
            .cloned()
    }

    /// All recorded applications, keyed by GPU index
    pub fn all_applications(&self) -> HashMap<usize, OverclockApplication> {
        self.applied
            .lock()
            .expect("application lock poisoned")
            .clone()
    }

    fn validate(&self, profile: &OverclockProfile) -> Result<(), RigError> {
        let limits = &self.limits;
        if profile.core_clock_offset.abs() > limits.max_core_offset_mhz {
            return Err(RigError::UnsafeProfile(format!(
                "core offset {:+} MHz exceeds ±{} MHz",
                profile.core_clock_offset, limits.max_core_offset_mhz
            )));
        }
        if profile.memory_clock_offset < limits.min_memory_offset_mhz
            || profile.memory_clock_offset > limits.max_memory_offset_mhz
        {
            return Err(RigError::UnsafeProfile(format!(
                "memory offset {:+} MHz outside {}..{} MHz",
                profile.memory_clock_offset,
                limits.min_memory_offset_mhz,
                limits.max_memory_offset_mhz
            )));
        }
        if profile.power_limit_pct < limits.min_power_limit_pct
            || profile.power_limit_pct > limits.max_power_limit_pct
        {
            return Err(RigError::UnsafeProfile(format!(
                "power limit {}% outside {}..{}%",
                profile.power_limit_pct,
                limits.min_power_limit_pct,
                limits.max_power_limit_pct
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Hardware control that records every call and can be told to fail
    pub struct RecordingControl {
        pub calls: Mutex<Vec<(usize, i32, i32, u32)>>,
        pub fail: Mutex<bool>,
    }

    impl RecordingControl {
        pub fn new() -> Arc<Self> {
            Arc::new(RecordingControl {
                calls: Mutex::new(Vec::new()),
                fail: Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl HardwareControl for RecordingControl {
        async fn apply_clocks(
            &self,
            gpu_index: usize,
            core_offset: i32,
            memory_offset: i32,
            power_limit_pct: u32,
        ) -> Result<(), RigError> {
            if *self.fail.lock().unwrap() {
                return Err(RigError::HardwareRejected("driver said no".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((gpu_index, core_offset, memory_offset, power_limit_pct));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingControl;
    use super::*;

    fn governor() -> (OverclockGovernor, Arc<RecordingControl>) {
        let hw = RecordingControl::new();
        let gov = OverclockGovernor::new(hw.clone(), ClockLimits::default());
        gov.register(
            "RVN",
            OverclockProfile {
                core_clock_offset: -100,
                memory_clock_offset: 800,
                power_limit_pct: 80,
            },
        );
        gov.register(
            "ETC",
            OverclockProfile {
                core_clock_offset: -150,
                memory_clock_offset: 1000,
                power_limit_pct: 75,
            },
        );
        (gov, hw)
    }

    #[tokio::test]
    async fn apply_records_application_and_programs_hardware() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();

        let record = gov.current(0).unwrap();
        assert_eq!(record.current.memory_clock_offset, 800);
        assert!(record.previous.is_none());
        assert_eq!(hw.calls.lock().unwrap().as_slice(), &[(0, -100, 800, 80)]);
    }

    #[tokio::test]
    async fn unknown_profile_is_rejected() {
        let (gov, hw) = governor();
        let err = gov.apply(0, "KAS").await.unwrap_err();
        assert!(matches!(err, RigError::UnknownProfile(_)));
        assert!(hw.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_bound_power_limit_leaves_prior_application_untouched() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();

        gov.register(
            "HOT",
            OverclockProfile {
                core_clock_offset: 0,
                memory_clock_offset: 0,
                power_limit_pct: 200,
            },
        );
        let err = gov.apply(0, "HOT").await.unwrap_err();
        assert!(matches!(err, RigError::UnsafeProfile(_)));

        let record = gov.current(0).unwrap();
        assert_eq!(record.current.power_limit_pct, 80);
        assert_eq!(hw.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_previous_profile() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();
        gov.apply(0, "ETC").await.unwrap();

        gov.rollback(0).await.unwrap();
        let record = gov.current(0).unwrap();
        assert_eq!(record.current.memory_clock_offset, 800);
        assert!(record.previous.is_none());
        assert_eq!(hw.calls.lock().unwrap().last(), Some(&(0, -100, 800, 80)));
    }

    #[tokio::test]
    async fn rollback_without_previous_uses_safe_default() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();
        gov.rollback(0).await.unwrap();
        assert_eq!(hw.calls.lock().unwrap().last(), Some(&(0, 0, 0, 100)));
    }

    #[tokio::test]
    async fn rollback_with_no_history_fails() {
        let (gov, _) = governor();
        assert!(matches!(
            gov.rollback(3).await.unwrap_err(),
            RigError::NothingToRollback(3)
        ));
    }

    #[tokio::test]
    async fn reset_clears_record_even_when_hardware_rejects() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();
        *hw.fail.lock().unwrap() = true;

        gov.reset(0).await;
        assert!(gov.current(0).is_none());
    }

    #[tokio::test]
    async fn hardware_rejection_propagates_and_keeps_record() {
        let (gov, hw) = governor();
        gov.apply(0, "RVN").await.unwrap();
        *hw.fail.lock().unwrap() = true;

        let err = gov.apply(0, "ETC").await.unwrap_err();
        assert!(matches!(err, RigError::HardwareRejected(_)));
        assert_eq!(gov.current(0).unwrap().current.power_limit_pct, 80);
    }
}
