//! Plug — a network-addressable power switch controlling one peripheral.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlugwatchError, ValidationError};

/// Stable network identity of a plug (`host` or `host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlugAddress(String);

impl PlugAddress {
    /// Wrap an address, trimming surrounding whitespace.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self(address.trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Host part, without any `:port` suffix.
    #[must_use]
    pub fn host(&self) -> &str {
        self.split().0
    }

    /// Explicit port, when the address carries a valid one.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.split().1
    }

    fn split(&self) -> (&str, Option<u16>) {
        match self.0.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, Some(port)),
                Err(_) => (&self.0, None),
            },
            None => (&self.0, None),
        }
    }
}

impl fmt::Display for PlugAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlugAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlugAddress {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Last-known power state of a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlugState {
    #[default]
    Unknown,
    On,
    Off,
}

impl PlugState {
    /// Command that flips the plug, or `None` when the state is unknown.
    #[must_use]
    pub fn toggled(self) -> Option<DesiredState> {
        match self {
            Self::On => Some(DesiredState::Off),
            Self::Off => Some(DesiredState::On),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for PlugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

/// A state a plug can be commanded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    On,
    Off,
}

impl From<DesiredState> for PlugState {
    fn from(value: DesiredState) -> Self {
        match value {
            DesiredState::On => Self::On,
            DesiredState::Off => Self::Off,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PlugState::from(*self).fmt(f)
    }
}

/// Per-plug automation flags.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlugPolicy {
    /// Power off when the shutdown countdown expires.
    pub automatic_shutdown: bool,
    /// Ask the operator before a manual power off.
    pub warn_before_off: bool,
    /// Refuse G-code power off while the machine is printing.
    pub warn_printing: bool,
    /// Power off when a thermal runaway is detected.
    pub thermal_runaway: bool,
    /// Honor `M80`/`M81`/`@PLUGON`/`@PLUGOFF` directives.
    pub gcode_enabled: bool,
    pub gcode_on_delay_secs: u64,
    pub gcode_off_delay_secs: u64,
    /// Power on when the coordinator starts.
    pub power_on_at_startup: bool,
    /// Power on when a job is uploaded for printing.
    pub power_on_at_upload: bool,
}

/// A configured plug together with its runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plug {
    pub address: PlugAddress,
    pub label: String,
    pub icon: String,
    pub state: PlugState,
    pub policy: PlugPolicy,
}

impl Plug {
    /// Create a builder for constructing a [`Plug`].
    #[must_use]
    pub fn builder() -> PlugBuilder {
        PlugBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the address is empty.
    pub fn validate(&self) -> Result<(), PlugwatchError> {
        if self.address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }
        Ok(())
    }
}

const DEFAULT_ICON: &str = "plug";

/// Step-by-step builder for [`Plug`].
#[derive(Debug, Default)]
pub struct PlugBuilder {
    address: Option<PlugAddress>,
    label: Option<String>,
    icon: Option<String>,
    state: PlugState,
    policy: PlugPolicy,
}

impl PlugBuilder {
    #[must_use]
    pub fn address(mut self, address: impl Into<PlugAddress>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: PlugState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: PlugPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Consume the builder, validate, and return a [`Plug`].
    ///
    /// An empty label falls back to the address.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] if the address is missing or empty.
    pub fn build(self) -> Result<Plug, PlugwatchError> {
        let address = self.address.unwrap_or_else(|| PlugAddress::new(""));
        let label = match self.label {
            Some(label) if !label.trim().is_empty() => label,
            _ => address.to_string(),
        };
        let icon = match self.icon {
            Some(icon) if !icon.trim().is_empty() => icon,
            _ => DEFAULT_ICON.to_string(),
        };
        let plug = Plug {
            address,
            label,
            icon,
            state: self.state,
            policy: self.policy,
        };
        plug.validate()?;
        Ok(plug)
    }
}
