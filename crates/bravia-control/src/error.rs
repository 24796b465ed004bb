//! Error types for device control.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Crate-wide result alias.
pub type Result<T, E = ControlError> = std::result::Result<T, E>;

/// Errors raised by the HTTP transports (IRCC and JSON-RPC).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Map a reqwest failure, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout_ms)
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

/// Phase of the open-app macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppPhase {
    /// `exit home` with the paused delay
    Settle,
    /// Caller-supplied navigation keys
    Navigate,
    /// Final `confirm`
    Confirm,
}

impl AppPhase {
    /// One-based position of the phase within the macro.
    pub fn number(&self) -> u8 {
        match self {
            AppPhase::Settle => 1,
            AppPhase::Navigate => 2,
            AppPhase::Confirm => 3,
        }
    }
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppPhase::Settle => "settle",
            AppPhase::Navigate => "navigate",
            AppPhase::Confirm => "confirm",
        };
        write!(f, "{} (phase {})", name, self.number())
    }
}

/// Caller-facing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("Device error {code}: {message}")]
    DeviceError { code: i64, message: String },

    #[error("TV is not on")]
    DeviceNotOn,

    #[error("Power change failed: {0}")]
    PowerChangeFailed(String),

    #[error("Sequence failed at step {step} ({action}): {source}")]
    SequenceFailed {
        step: usize,
        action: String,
        #[source]
        source: Box<ControlError>,
    },

    #[error("Opening app failed in {phase}: {source}")]
    OpenAppFailed {
        phase: AppPhase,
        #[source]
        source: Box<ControlError>,
    },

    #[error("Wake signal failed: {0}")]
    WakeFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

impl ControlError {
    /// The innermost error, skipping sequence and macro wrappers.
    pub fn root_cause(&self) -> &ControlError {
        match self {
            ControlError::SequenceFailed { source, .. }
            | ControlError::OpenAppFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Phase of the open-app macro that failed, if any.
    pub fn failed_phase(&self) -> Option<AppPhase> {
        match self {
            ControlError::OpenAppFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(5000);
        assert_eq!(err.to_string(), "Request timed out after 5000ms");

        let err = ControlError::from(TransportError::Status(403));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_root_cause_unwraps_wrappers() {
        let inner = ControlError::UnknownAction("Bogus".to_string());
        let seq = ControlError::SequenceFailed {
            step: 1,
            action: "Bogus".to_string(),
            source: Box::new(inner),
        };
        let err = ControlError::OpenAppFailed {
            phase: AppPhase::Navigate,
            source: Box::new(seq),
        };

        assert_eq!(err.failed_phase(), Some(AppPhase::Navigate));
        assert!(matches!(err.root_cause(), ControlError::UnknownAction(name) if name == "Bogus"));
        assert!(err.to_string().contains("navigate (phase 2)"));
    }
}
