//! Signals coming from the monitored machine: why it is busy and what its
//! heaters report.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Why the machine counts as busy. It is idle while no reason is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyReason {
    Printing,
    RenderingTimelapse,
}

impl BusyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Printing => "printing",
            Self::RenderingTimelapse => "rendering_timelapse",
        }
    }
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusyReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "printing" => Ok(Self::Printing),
            "rendering_timelapse" => Ok(Self::RenderingTimelapse),
            other => Err(ValidationError::UnknownBusyReason(other.to_string())),
        }
    }
}

/// Heater family a reading belongs to, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterKind {
    Bed,
    Extruder,
}

/// One heater temperature sample, in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// `B` for the bed, `T0`, `T1`… for extruders.
    pub heater: String,
    pub actual: f64,
    /// Zero or negative when the heater is off.
    #[serde(default)]
    pub target: f64,
}

impl TemperatureReading {
    /// `None` for heaters that are not monitored (chamber, auxiliary sensors…).
    #[must_use]
    pub fn kind(&self) -> Option<HeaterKind> {
        match self.heater.as_bytes() {
            [b'B'] => Some(HeaterKind::Bed),
            [b'T', ..] => Some(HeaterKind::Extruder),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_heating(&self) -> bool {
        self.target > 0.0
    }
}

/// A job file handed to the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    /// The job should start printing once the machine is ready.
    #[serde(default)]
    pub print: bool,
    /// The machine is connected and able to accept the job.
    #[serde(default)]
    pub printer_ready: bool,
}

impl FileUpload {
    /// Whether the upload calls for powering the machine on.
    #[must_use]
    pub fn wants_power(&self) -> bool {
        self.print && !self.printer_ready
    }
}
