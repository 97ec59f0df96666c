//! Fleet settings — the configuration snapshot the coordinator synchronizes
//! its runtime registry against.
//!
//! Settings are immutable at rest: the coordinator never writes back into
//! them. Live updates are applied by handing a fresh snapshot to the
//! coordinator.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlugwatchError, ValidationError};
use crate::plug::{Plug, PlugAddress, PlugPolicy};

/// Longest supported polling cadence; longer configured intervals are clamped.
pub const MAX_POLLING_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Everything the coordinator needs to know about the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub plugs: Vec<PlugSettings>,
    pub polling_enabled: bool,
    /// Polling cadence; zero or negative disables polling.
    pub polling_interval_minutes: i64,
    /// Upper bound for a single driver call.
    pub command_timeout_secs: u64,
    /// Power on plugs flagged `power_on_at_startup` when the coordinator starts.
    pub startup_power_on: bool,
    /// Power on plugs flagged `power_on_at_upload` when a job is uploaded for printing.
    pub upload_power_on: bool,
    pub shutdown: ShutdownSettings,
    pub thermal: ThermalSettings,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            plugs: Vec::new(),
            polling_enabled: false,
            polling_interval_minutes: 15,
            command_timeout_secs: 5,
            startup_power_on: false,
            upload_power_on: false,
            shutdown: ShutdownSettings::default(),
            thermal: ThermalSettings::default(),
        }
    }
}

impl FleetSettings {
    /// Effective polling interval, `None` when polling is disabled.
    ///
    /// Capped at [`MAX_POLLING_INTERVAL`].
    #[must_use]
    pub fn polling_interval(&self) -> Option<Duration> {
        if !self.polling_enabled || self.polling_interval_minutes <= 0 {
            return None;
        }
        let minutes = u64::try_from(self.polling_interval_minutes).ok()?;
        let interval = Duration::from_secs(minutes.saturating_mul(60));
        Some(interval.min(MAX_POLLING_INTERVAL))
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Check invariants across the whole snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when a plug address is empty or
    /// duplicated, or when the command timeout or the countdown length is zero.
    pub fn validate(&self) -> Result<(), PlugwatchError> {
        if self.command_timeout_secs == 0 {
            return Err(ValidationError::ZeroCommandTimeout.into());
        }
        if self.shutdown.abort_timeout_secs == 0 {
            return Err(ValidationError::ZeroCountdown.into());
        }
        let mut seen = HashSet::new();
        for plug in &self.plugs {
            if plug.address.is_empty() {
                return Err(ValidationError::EmptyAddress.into());
            }
            if !seen.insert(&plug.address) {
                return Err(ValidationError::DuplicateAddress(plug.address.clone()).into());
            }
        }
        Ok(())
    }
}

/// Configuration of a single plug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlugSettings {
    pub address: PlugAddress,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(flatten)]
    pub policy: PlugPolicy,
}

impl PlugSettings {
    /// Build the runtime record for this plug, starting in `unknown` state.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the address is empty.
    pub fn to_plug(&self) -> Result<Plug, PlugwatchError> {
        Plug::builder()
            .address(self.address.clone())
            .label(self.label.clone())
            .icon(self.icon.clone())
            .policy(self.policy.clone())
            .build()
    }
}

/// Automatic power off when the machine goes idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub enabled: bool,
    /// Length of the abortable countdown, in seconds.
    pub abort_timeout_secs: u64,
    /// How long the machine must stay idle before the countdown starts.
    pub idle_timeout_minutes: u64,
    /// G-code words that do not count as machine activity.
    pub idle_ignore_commands: Vec<String>,
    /// Extruders must cool down to this temperature, in degrees Celsius,
    /// before the countdown starts.
    pub idle_timeout_wait_temp: f64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            abort_timeout_secs: 30,
            idle_timeout_minutes: 30,
            idle_ignore_commands: vec!["M105".to_string()],
            idle_timeout_wait_temp: 50.0,
        }
    }
}

impl ShutdownSettings {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes.saturating_mul(60))
    }
}

/// Thermal runaway protection limits, in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalSettings {
    pub enabled: bool,
    pub max_bed: f64,
    pub max_extruder: f64,
}

impl Default for ThermalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_bed: 120.0,
            max_extruder: 280.0,
        }
    }
}
