//! Error taxonomy used across the workspace.
//!
//! Every variant is `Clone`: a single lane outcome is handed to each caller
//! that was waiting on it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::countdown::Generation;
use crate::plug::PlugAddress;

/// Top-level error for every plugwatch operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlugwatchError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownDevice(#[from] UnknownDeviceError),

    #[error("device {address} is unreachable: {source}")]
    DeviceUnreachable {
        address: PlugAddress,
        source: DriverError,
    },

    #[error("command for {address} timed out after {timeout:?}")]
    CommandTimeout {
        address: PlugAddress,
        timeout: Duration,
    },

    #[error("command for {address} was superseded by a newer request")]
    ConflictingOperation { address: PlugAddress },

    #[error("countdown generation {0} is no longer active")]
    StaleGeneration(Generation),
}

impl PlugwatchError {
    /// Serializable category reported to observers.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::UnknownDevice(_) => ErrorCategory::UnknownDevice,
            Self::DeviceUnreachable { .. } => ErrorCategory::DeviceUnreachable,
            Self::CommandTimeout { .. } => ErrorCategory::CommandTimeout,
            Self::ConflictingOperation { .. } => ErrorCategory::ConflictingOperation,
            Self::StaleGeneration(_) => ErrorCategory::StaleGeneration,
        }
    }
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("plug address must not be empty")]
    EmptyAddress,

    #[error("a plug with address {0} is already registered")]
    DuplicateAddress(PlugAddress),

    #[error("countdown duration must be greater than zero")]
    ZeroCountdown,

    #[error("command timeout must be greater than zero")]
    ZeroCommandTimeout,

    #[error("unknown busy reason: {0}")]
    UnknownBusyReason(String),
}

/// The address is not present in the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device {address}")]
pub struct UnknownDeviceError {
    pub address: PlugAddress,
}

/// Opaque failure reported by a device driver (network failure, malformed
/// response, unreachable host, …).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(Arc<dyn std::error::Error + Send + Sync>);

impl DriverError {
    /// Wrap any error (or message) produced by a driver.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(Arc::from(err.into()))
    }
}

/// Human-facing error category carried by `CommandFailed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DeviceUnreachable,
    CommandTimeout,
    UnknownDevice,
    ConflictingOperation,
    StaleGeneration,
    Validation,
}

impl ErrorCategory {
    /// Short operator-facing hint.
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::DeviceUnreachable => "device unreachable, double-check the device address",
            Self::CommandTimeout => "device did not answer in time",
            Self::UnknownDevice => "device is not configured",
            Self::ConflictingOperation => "superseded by a newer command",
            Self::StaleGeneration => "countdown is no longer active",
            Self::Validation => "invalid request",
        }
    }
}
