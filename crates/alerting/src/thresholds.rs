//! Warning/danger thresholds per metric

use serde::{Deserialize, Serialize};

/// Severity of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Normal,
    Warning,
    Danger,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Warning => "warning",
            Status::Danger => "danger",
        }
    }
}

/// Which way a value has to move to become a problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Too high is bad (temperatures)
    Rising,
    /// Too low is bad (voltages, pressures)
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: f64,
    pub danger: f64,
    pub direction: Direction,
}

impl Threshold {
    pub const fn rising(warning: f64, danger: f64) -> Self {
        Self {
            warning,
            danger,
            direction: Direction::Rising,
        }
    }

    pub const fn falling(warning: f64, danger: f64) -> Self {
        Self {
            warning,
            danger,
            direction: Direction::Falling,
        }
    }

    /// Classify a value; boundaries count as the worse status
    pub fn status(&self, value: f64) -> Status {
        let beyond = |limit: f64| match self.direction {
            Direction::Rising => value >= limit,
            Direction::Falling => value <= limit,
        };
        if beyond(self.danger) {
            Status::Danger
        } else if beyond(self.warning) {
            Status::Warning
        } else {
            Status::Normal
        }
    }
}

/// Thresholds for every monitored metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Coolant temperature (°C)
    pub engine_temp: Threshold,
    /// Battery voltage (V)
    pub battery_voltage: Threshold,
    /// Fuel rail pressure
    pub fuel_pressure: Threshold,
    /// Hybrid battery state of charge (%)
    pub battery_soc: Threshold,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            engine_temp: Threshold::rising(95.0, 105.0),
            battery_voltage: Threshold::falling(12.2, 12.0),
            fuel_pressure: Threshold::falling(150.0, 120.0),
            battery_soc: Threshold::falling(70.0, 50.0),
        }
    }
}

impl Thresholds {
    /// Threshold for a metric key, if it is monitored
    pub fn for_metric(&self, metric: &str) -> Option<&Threshold> {
        match metric {
            "coolant_temp" => Some(&self.engine_temp),
            "battery_voltage" => Some(&self.battery_voltage),
            "fuel_rail_pressure" => Some(&self.fuel_pressure),
            "battery_soc" => Some(&self.battery_soc),
            _ => None,
        }
    }

    /// Status of a metric; unmonitored metrics are always normal
    pub fn status(&self, metric: &str, value: f64) -> Status {
        self.for_metric(metric)
            .map(|t| t.status(value))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_temp_rising() {
        let t = Thresholds::default();
        assert_eq!(t.status("coolant_temp", 90.0), Status::Normal);
        assert_eq!(t.status("coolant_temp", 95.0), Status::Warning);
        assert_eq!(t.status("coolant_temp", 104.9), Status::Warning);
        assert_eq!(t.status("coolant_temp", 105.0), Status::Danger);
    }

    #[test]
    fn test_battery_voltage_falling() {
        let t = Thresholds::default();
        assert_eq!(t.status("battery_voltage", 12.6), Status::Normal);
        assert_eq!(t.status("battery_voltage", 12.2), Status::Warning);
        assert_eq!(t.status("battery_voltage", 11.8), Status::Danger);
    }

    #[test]
    fn test_fuel_pressure_falling() {
        let t = Thresholds::default();
        assert_eq!(t.status("fuel_rail_pressure", 180.0), Status::Normal);
        assert_eq!(t.status("fuel_rail_pressure", 140.0), Status::Warning);
        assert_eq!(t.status("fuel_rail_pressure", 120.0), Status::Danger);
    }

    #[test]
    fn test_unmonitored_metric() {
        assert_eq!(Thresholds::default().status("rpm", 7000.0), Status::Normal);
    }

    #[test]
    fn test_status_ordering() {
        assert!(Status::Danger > Status::Warning);
        assert!(Status::Warning > Status::Normal);
    }
}
