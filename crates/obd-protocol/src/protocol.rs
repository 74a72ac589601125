//! OBD-II Protocol Definitions and adapter initialization

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "ATSP0",
            ObdProtocol::J1850Pwm => "ATSP1",
            ObdProtocol::J1850Vpw => "ATSP2",
            ObdProtocol::Iso9141_2 => "ATSP3",
            ObdProtocol::Iso14230_4Kwp => "ATSP4",
            ObdProtocol::Iso14230_4KwpFast => "ATSP5",
            ObdProtocol::Iso15765_4Can11bit500 => "ATSP6",
            ObdProtocol::Iso15765_4Can29bit500 => "ATSP7",
            ObdProtocol::Iso15765_4Can11bit250 => "ATSP8",
            ObdProtocol::Iso15765_4Can29bit250 => "ATSP9",
        }
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
        )
    }

    /// Get the default baud rate for serial communication
    pub fn default_baud_rate(&self) -> u32 {
        // ELM327 adapters typically use 38400 or higher
        if self.is_can() {
            115200
        } else {
            38400
        }
    }
}

/// Reset command
pub const RESET: &str = "ATZ";
/// Echo off
pub const ECHO_OFF: &str = "ATE0";
/// Linefeeds off
pub const LINEFEEDS_OFF: &str = "ATL0";
/// Spaces off
pub const SPACES_OFF: &str = "ATS0";
/// Headers off
pub const HEADERS_OFF: &str = "ATH0";
/// Read adapter supply voltage
pub const READ_VOLTAGE: &str = "ATRV";

/// Minimum time the adapter needs after `ATZ`
pub const RESET_SETTLE: Duration = Duration::from_millis(1000);

/// AT commands sent once after every successful connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSequence {
    /// Protocol selected after the reset
    pub protocol: ObdProtocol,
    /// Pause after `ATZ`
    pub reset_settle: Duration,
    /// Also send `ATS0`/`ATH0`
    pub compact_responses: bool,
}

impl Default for InitSequence {
    fn default() -> Self {
        Self {
            protocol: ObdProtocol::Auto,
            reset_settle: RESET_SETTLE,
            compact_responses: true,
        }
    }
}

impl InitSequence {
    /// Only the four mandatory commands
    pub fn minimal() -> Self {
        Self {
            compact_responses: false,
            ..Default::default()
        }
    }

    /// Commands in transmission order
    pub fn commands(&self) -> Vec<&'static str> {
        let mut commands = vec![RESET, ECHO_OFF, LINEFEEDS_OFF, self.protocol.to_elm_command()];
        if self.compact_responses {
            commands.push(SPACES_OFF);
            commands.push(HEADERS_OFF);
        }
        commands
    }

    /// Delay to apply after `command` has been answered
    pub fn settle_after(&self, command: &str) -> Option<Duration> {
        (command == RESET && !self.reset_settle.is_zero()).then_some(self.reset_settle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_order() {
        let init = InitSequence::minimal();
        assert_eq!(init.commands(), vec!["ATZ", "ATE0", "ATL0", "ATSP0"]);
    }

    #[test]
    fn test_optional_commands_follow_mandatory_ones() {
        let init = InitSequence::default();
        assert_eq!(
            init.commands(),
            vec!["ATZ", "ATE0", "ATL0", "ATSP0", "ATS0", "ATH0"]
        );
    }

    #[test]
    fn test_settle_only_after_reset() {
        let init = InitSequence::default();
        assert_eq!(init.settle_after("ATZ"), Some(Duration::from_millis(1000)));
        assert_eq!(init.settle_after("ATE0"), None);
    }

    #[test]
    fn test_explicit_protocol() {
        let init = InitSequence {
            protocol: ObdProtocol::Iso15765_4Can11bit500,
            ..InitSequence::minimal()
        };
        assert_eq!(init.commands()[3], "ATSP6");
        assert_eq!(ObdProtocol::Iso15765_4Can11bit500.default_baud_rate(), 115200);
    }
}
