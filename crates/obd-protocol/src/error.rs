//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObdError {
    /// The platform refused Bluetooth/network access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No device with the given identifier could be found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The link did not come up within the handshake window
    #[error("Connection timed out after {0}ms")]
    ConnectionTimeout(u64),

    /// A command was issued without an active session
    #[error("Not connected to an adapter")]
    NotConnected,

    /// No `>` prompt was observed for a command
    #[error("Timeout waiting for response to {command} after {ms}ms")]
    CommandTimeout { command: String, ms: u64 },

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The remote end closed the link
    #[error("Transport closed by remote")]
    TransportClosed,

    /// The session was torn down while the command was queued or in flight
    #[error("Disconnected before the command completed")]
    Disconnected,

    /// Link-level read/write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed WiFi/Bluetooth address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Command text that does not name a known PID
    #[error("Unsupported PID: {0}")]
    UnsupportedPid(String),

    /// A connect was requested while another one is still running
    #[error("A connection attempt is already in progress")]
    ConnectInProgress,
}

impl ObdError {
    /// Whether this error ends a connect attempt and should be shown to the user
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ObdError::PermissionDenied(_)
                | ObdError::DeviceNotFound(_)
                | ObdError::ConnectionTimeout(_)
                | ObdError::InvalidAddress(_)
                | ObdError::Transport(_)
                | ObdError::TransportClosed
        )
    }

    /// Whether this error is a timeout of any kind
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ObdError::ConnectionTimeout(_) | ObdError::CommandTimeout { .. }
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ObdError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::NotFound => ObdError::DeviceNotFound(err.to_string()),
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => ObdError::TransportClosed,
            _ => ObdError::Transport(err.to_string()),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ObdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures() {
        assert!(ObdError::PermissionDenied("bt".into()).is_connection_failure());
        assert!(ObdError::ConnectionTimeout(10_000).is_connection_failure());
        assert!(!ObdError::NotConnected.is_connection_failure());
        assert!(!ObdError::InvalidResponse("NO DATA".into()).is_connection_failure());
    }

    #[test]
    fn test_io_error_mapping() {
        let err: ObdError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "rfcomm").into();
        assert!(matches!(err, ObdError::PermissionDenied(_)));

        let err: ObdError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err, ObdError::TransportClosed);
    }
}
