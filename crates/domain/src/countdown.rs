//! Countdown session — a generation-tagged automatic-shutdown timer.
//!
//! Only one session may be active at a time. Every new session receives a
//! strictly greater [`Generation`], so ticks and cancellations addressed to an
//! older session can be recognised and dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlugwatchError, ValidationError};
use crate::event::Timestamp;
use crate::plug::PlugAddress;

/// Monotonic tag distinguishing successive countdown sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// The generation that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Controller state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownPhase {
    #[default]
    Idle,
    Armed,
    Cancelled,
    Expired,
}

/// Why a countdown was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// An observer asked to abort the pending power off.
    Aborted,
    /// The monitored machine became busy again.
    MachineBusy,
    /// Automatic shutdown was switched off.
    Disabled,
    /// A newer session replaced this one.
    Superseded,
}

/// One running countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownSession {
    pub generation: Generation,
    pub total: u64,
    pub remaining: u64,
    pub targets: Vec<PlugAddress>,
    pub started_at: Timestamp,
}

impl CountdownSession {
    /// Start a session of `total` ticks powering off `targets` on expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroCountdown`] when `total` is zero.
    pub fn new(
        generation: Generation,
        total: u64,
        targets: Vec<PlugAddress>,
    ) -> Result<Self, PlugwatchError> {
        if total == 0 {
            return Err(ValidationError::ZeroCountdown.into());
        }
        Ok(Self {
            generation,
            total,
            remaining: total,
            targets,
            started_at: chrono::Utc::now(),
        })
    }

    /// Consume one tick and return what remains.
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }
}

/// Point-in-time view of the countdown controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownStatus {
    pub enabled: bool,
    pub phase: CountdownPhase,
    pub generation: Generation,
    /// Remaining ticks; `0` means no active countdown.
    pub remaining: u64,
    pub total: u64,
}
