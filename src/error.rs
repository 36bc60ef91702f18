//! Session Bring-up Error Types
//!
//! Errors raised while starting display sessions. Most of them are
//! recovered inside the selector by falling back to text mode; only the
//! ones a collaborator considers unrecoverable reach the caller.

use std::time::Duration;
use thiserror::Error;

/// Result type for session bring-up operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session bring-up error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// Display server did not signal readiness in time
    #[error("Timeout waiting for {what} after {}s", .timeout.as_secs())]
    StartupTimeout {
        /// What was being started
        what: String,
        /// Budget that expired
        timeout: Duration,
    },

    /// Display server or helper failed at runtime
    #[error("{what} failed to start: {reason}")]
    StartupFailed {
        /// What was being started
        what: String,
        /// Failure description
        reason: String,
    },

    /// Process could not be spawned
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// Program path
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Resolution string is not `WIDTHxHEIGHT`
    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// D-Bus error
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    /// Interactive prompt could not be rendered or read
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Not enough memory to run the installer at all
    #[error("Not enough memory: {available} MiB available, {required} MiB required")]
    InsufficientMemory {
        /// Total memory in MiB
        available: u64,
        /// Minimum memory in MiB
        required: u64,
    },

    /// User interface initialization failed
    #[error("User interface error: {0}")]
    Interface(String),

    /// OS-level signal or ioctl error
    #[error("System call failed: {0}")]
    Errno(#[from] nix::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for failures that mean the display never became ready in time.
    ///
    /// The selector prints remediation advice only for these.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::StartupTimeout { .. })
    }

    /// Shorthand for a runtime startup failure
    pub fn startup_failed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::StartupFailed {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

impl From<zbus::fdo::Error> for SessionError {
    fn from(e: zbus::fdo::Error) -> Self {
        SessionError::DBus(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let timeout = SessionError::StartupTimeout {
            what: "gnome-kiosk".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert!(timeout.is_timeout());
        assert_eq!(
            timeout.to_string(),
            "Timeout waiting for gnome-kiosk after 60s"
        );

        let failed = SessionError::startup_failed("gnome-kiosk", "exited with status 1");
        assert!(!failed.is_timeout());
    }

    #[test]
    fn test_standard_interface_errors_are_dbus_errors() {
        let err: SessionError =
            zbus::fdo::Error::ServiceUnknown("org.gnome.Mutter.DisplayConfig".to_string()).into();
        assert!(matches!(err, SessionError::DBus(_)));
        assert!(!err.is_timeout());
    }
}
