//! OBD-II PID Definitions
//!
//! Defines the polled channel set, its wire commands and the nominal
//! operating range used when a reading has to be substituted.

use crate::mode;
use serde::{Deserialize, Serialize};

/// Channels polled from the adapter every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pid {
    /// Engine RPM (010C)
    Rpm,
    /// Vehicle speed (010D)
    Speed,
    /// Engine coolant temperature (0105)
    CoolantTemp,
    /// Throttle position (0111)
    ThrottlePosition,
    /// Calculated engine load (0104)
    EngineLoad,
    /// Intake air temperature (010F)
    IntakeAirTemp,
    /// Intake manifold absolute pressure (010B)
    IntakeManifoldPressure,
    /// Fuel rail gauge pressure (0123)
    FuelRailPressure,
    /// Adapter supply voltage (ATRV)
    BatteryVoltage,
}

/// Inclusive range a healthy idling engine reports for a channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NominalRange {
    pub min: f64,
    pub max: f64,
}

impl NominalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Midpoint of the range
    pub fn baseline(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

impl Pid {
    /// Every polled channel, in request order
    pub const ALL: [Pid; 9] = [
        Pid::Rpm,
        Pid::Speed,
        Pid::CoolantTemp,
        Pid::ThrottlePosition,
        Pid::EngineLoad,
        Pid::IntakeAirTemp,
        Pid::IntakeManifoldPressure,
        Pid::FuelRailPressure,
        Pid::BatteryVoltage,
    ];

    /// Mode 01 PID byte, `None` for adapter-level readings
    pub fn code(&self) -> Option<u8> {
        match self {
            Pid::Rpm => Some(0x0C),
            Pid::Speed => Some(0x0D),
            Pid::CoolantTemp => Some(0x05),
            Pid::ThrottlePosition => Some(0x11),
            Pid::EngineLoad => Some(0x04),
            Pid::IntakeAirTemp => Some(0x0F),
            Pid::IntakeManifoldPressure => Some(0x0B),
            Pid::FuelRailPressure => Some(0x23),
            Pid::BatteryVoltage => None,
        }
    }

    /// OBD mode the request is issued under
    pub fn mode(&self) -> Option<u8> {
        self.code().map(|_| mode::CURRENT_DATA)
    }

    /// Command text sent to the adapter (without the trailing `\r`)
    pub fn command(&self) -> &'static str {
        match self {
            Pid::Rpm => "010C",
            Pid::Speed => "010D",
            Pid::CoolantTemp => "0105",
            Pid::ThrottlePosition => "0111",
            Pid::EngineLoad => "0104",
            Pid::IntakeAirTemp => "010F",
            Pid::IntakeManifoldPressure => "010B",
            Pid::FuelRailPressure => "0123",
            Pid::BatteryVoltage => "ATRV",
        }
    }

    /// Look up a channel from its command text
    pub fn from_command(command: &str) -> Option<Pid> {
        let command = command.trim().to_ascii_uppercase();
        Pid::ALL.into_iter().find(|pid| pid.command() == command)
    }

    /// Number of data bytes following the mode+PID echo
    pub fn data_bytes(&self) -> usize {
        match self {
            Pid::Rpm | Pid::FuelRailPressure => 2,
            Pid::BatteryVoltage => 0,
            _ => 1,
        }
    }

    /// Metric key used for snapshots and history
    pub fn name(&self) -> &'static str {
        match self {
            Pid::Rpm => "rpm",
            Pid::Speed => "speed",
            Pid::CoolantTemp => "coolant_temp",
            Pid::ThrottlePosition => "throttle_position",
            Pid::EngineLoad => "engine_load",
            Pid::IntakeAirTemp => "intake_air_temp",
            Pid::IntakeManifoldPressure => "map_pressure",
            Pid::FuelRailPressure => "fuel_rail_pressure",
            Pid::BatteryVoltage => "battery_voltage",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Pid::Rpm => "Engine RPM",
            Pid::Speed => "Vehicle Speed",
            Pid::CoolantTemp => "Coolant Temperature",
            Pid::ThrottlePosition => "Throttle Position",
            Pid::EngineLoad => "Engine Load",
            Pid::IntakeAirTemp => "Intake Air Temperature",
            Pid::IntakeManifoldPressure => "MAP Pressure",
            Pid::FuelRailPressure => "Fuel Rail Pressure",
            Pid::BatteryVoltage => "Battery Voltage",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Pid::Rpm => "rpm",
            Pid::Speed => "km/h",
            Pid::CoolantTemp | Pid::IntakeAirTemp => "°C",
            Pid::ThrottlePosition | Pid::EngineLoad => "%",
            Pid::IntakeManifoldPressure | Pid::FuelRailPressure => "kPa",
            Pid::BatteryVoltage => "V",
        }
    }

    /// Range substituted values are drawn from
    pub fn nominal_range(&self) -> NominalRange {
        match self {
            Pid::Rpm => NominalRange::new(800.0, 900.0),
            Pid::Speed => NominalRange::new(0.0, 5.0),
            Pid::CoolantTemp => NominalRange::new(86.0, 90.0),
            Pid::ThrottlePosition => NominalRange::new(0.0, 20.0),
            Pid::EngineLoad => NominalRange::new(15.0, 25.0),
            Pid::IntakeAirTemp => NominalRange::new(19.0, 25.0),
            Pid::IntakeManifoldPressure => NominalRange::new(100.0, 103.0),
            Pid::FuelRailPressure => NominalRange::new(175.0, 185.0),
            Pid::BatteryVoltage => NominalRange::new(12.2, 12.6),
        }
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw request outside the polled channel set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PidRequest {
    /// Mode 01 live data
    Standard(u8),
    /// Mode 22 manufacturer data identifier
    Enhanced(u16),
}

impl PidRequest {
    pub fn enhanced(did: u16) -> Self {
        PidRequest::Enhanced(did)
    }

    pub fn command(&self) -> String {
        match self {
            PidRequest::Standard(pid) => format!("{:02X}{:02X}", mode::CURRENT_DATA, pid),
            PidRequest::Enhanced(did) => format!("{:02X}{:04X}", mode::ENHANCED_DATA, did),
        }
    }

    /// Expected echo at the start of a positive response
    pub fn response_header(&self) -> String {
        match self {
            PidRequest::Standard(pid) => {
                format!("{:02X}{:02X}", mode::CURRENT_DATA + mode::POSITIVE_OFFSET, pid)
            }
            PidRequest::Enhanced(did) => {
                format!("{:02X}{:04X}", mode::ENHANCED_DATA + mode::POSITIVE_OFFSET, did)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_round_trip_through_lookup() {
        for pid in Pid::ALL {
            assert_eq!(Pid::from_command(pid.command()), Some(pid));
        }
        assert_eq!(Pid::from_command(" 010c "), Some(Pid::Rpm));
        assert_eq!(Pid::from_command("0142"), None);
    }

    #[test]
    fn test_battery_voltage_is_adapter_level() {
        assert_eq!(Pid::BatteryVoltage.code(), None);
        assert_eq!(Pid::BatteryVoltage.mode(), None);
        assert_eq!(Pid::Rpm.mode(), Some(0x01));
    }

    #[test]
    fn test_nominal_ranges_are_non_negative() {
        for pid in Pid::ALL {
            let range = pid.nominal_range();
            assert!(range.min >= 0.0);
            assert!(range.min <= range.max);
            assert!(range.contains(range.baseline()));
        }
    }

    #[test]
    fn test_enhanced_request() {
        let req = PidRequest::enhanced(0xF40D);
        assert_eq!(req.command(), "22F40D");
        assert_eq!(req.response_header(), "62F40D");
        assert_eq!(PidRequest::Standard(0x0C).command(), "010C");
        assert_eq!(PidRequest::Standard(0x0C).response_header(), "410C");
    }
}
