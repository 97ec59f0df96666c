//! Event — an immutable record of something that happened.
//!
//! Events are produced when plug state changes, commands complete or fail,
//! and the shutdown countdown advances. They are fanned out to observers and
//! never stored.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::countdown::{CancelReason, Generation};
use crate::error::ErrorCategory;
use crate::plug::{DesiredState, Plug, PlugAddress, PlugState};

/// UTC timestamp attached to events and sessions.
pub type Timestamp = DateTime<Utc>;

/// Unique identifier for an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(uuid::Uuid);

impl EventId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An event delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with a fresh id and the current time.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The plug this event concerns, if any.
    #[must_use]
    pub fn address(&self) -> Option<&PlugAddress> {
        match &self.payload {
            EventPayload::PlugRegistered { plug } => Some(&plug.address),
            EventPayload::PlugUnregistered { address }
            | EventPayload::StateChanged { address, .. }
            | EventPayload::StatusReported { address, .. }
            | EventPayload::CommandCompleted { address, .. }
            | EventPayload::CommandFailed { address, .. }
            | EventPayload::CommandSuperseded { address, .. } => Some(address),
            _ => None,
        }
    }

    /// The countdown generation this event concerns, if any.
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        match &self.payload {
            EventPayload::CountdownStarted { generation, .. }
            | EventPayload::CountdownTick { generation, .. }
            | EventPayload::CountdownCancelled { generation, .. }
            | EventPayload::CountdownExpired { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    PlugRegistered {
        plug: Plug,
    },
    PlugUnregistered {
        address: PlugAddress,
    },
    /// Registry state moved from `from` to `to`.
    StateChanged {
        address: PlugAddress,
        from: PlugState,
        to: PlugState,
    },
    /// Answer to an explicit status check, published even when unchanged.
    StatusReported {
        address: PlugAddress,
        state: PlugState,
    },
    CommandCompleted {
        address: PlugAddress,
        state: PlugState,
    },
    CommandFailed {
        address: PlugAddress,
        label: String,
        category: ErrorCategory,
        message: String,
    },
    /// A queued command was replaced before it started.
    CommandSuperseded {
        address: PlugAddress,
        requested: DesiredState,
    },
    CountdownStarted {
        generation: Generation,
        total: u64,
        targets: Vec<PlugAddress>,
    },
    CountdownTick {
        generation: Generation,
        remaining: u64,
        total: u64,
    },
    CountdownCancelled {
        generation: Generation,
        reason: CancelReason,
    },
    /// Final countdown event; `remaining` is always `0`.
    CountdownExpired {
        generation: Generation,
        remaining: u64,
        targets: Vec<PlugAddress>,
    },
    AutomaticShutdownChanged {
        enabled: bool,
    },
    ThermalRunaway {
        heater: String,
        actual: f64,
        limit: f64,
    },
    /// The machine went idle with hot extruders; heaters should be switched
    /// off. The countdown starts once every extruder reads `wait_temp` or less.
    HeatersCooling {
        heaters: Vec<String>,
        highest: f64,
        wait_temp: f64,
    },
}
