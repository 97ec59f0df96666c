//! Thermal runaway detection over heater temperature reports.

use plugwatch_domain::machine::{HeaterKind, TemperatureReading};
use plugwatch_domain::settings::ThermalSettings;

/// Temperature ceilings, in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalLimits {
    pub max_bed: f64,
    pub max_extruder: f64,
}

impl From<&ThermalSettings> for ThermalLimits {
    fn from(settings: &ThermalSettings) -> Self {
        Self {
            max_bed: settings.max_bed,
            max_extruder: settings.max_extruder,
        }
    }
}

/// A reading that exceeded its limit.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalTrip {
    pub heater: String,
    pub actual: f64,
    pub limit: f64,
}

impl ThermalLimits {
    #[must_use]
    pub fn limit_for(&self, kind: HeaterKind) -> f64 {
        match kind {
            HeaterKind::Bed => self.max_bed,
            HeaterKind::Extruder => self.max_extruder,
        }
    }

    /// A heater trips only while it is actively heating.
    #[must_use]
    pub fn check(&self, reading: &TemperatureReading) -> Option<ThermalTrip> {
        let limit = self.limit_for(reading.kind()?);
        (reading.is_heating() && reading.actual > limit).then(|| ThermalTrip {
            heater: reading.heater.clone(),
            actual: reading.actual,
            limit,
        })
    }

    /// First tripping reading of a report, in report order.
    #[must_use]
    pub fn first_trip(&self, readings: &[TemperatureReading]) -> Option<ThermalTrip> {
        readings.iter().find_map(|reading| self.check(reading))
    }
}
