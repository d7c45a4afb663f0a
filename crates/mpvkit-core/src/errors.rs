//! Error types for the mpvkit binding
//!
//! `MpvError` unifies engine status codes, property access failures, wait-bridge
//! outcomes and user-callback failures. It is `Clone` so a single failure can
//! resolve every waiter that is interested in it.

use crate::types::ErrorCode;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Error type for every fallible handle operation
#[derive(Debug, Clone, thiserror::Error)]
pub enum MpvError {
    /// Engine refused an option or failed to initialise
    #[error("Initialization failed for option {option:?}: {code}")]
    Init { option: Option<String>, code: ErrorCode },

    #[error("Property {name} is unavailable: {code}")]
    PropertyUnavailable { name: String, code: ErrorCode },

    #[error("Property {name} does not exist: {code}")]
    PropertyNotFound { name: String, code: ErrorCode },

    #[error("Error accessing property {name}: {code}")]
    PropertyError { name: String, code: ErrorCode },

    /// Value has the wrong shape for the property's declared type
    #[error("Invalid value for property {name}: {reason}")]
    PropertyFormat {
        name: String,
        code: ErrorCode,
        reason: String,
    },

    #[error("Command {command:?} failed: {code}")]
    Command { command: Vec<String>, code: ErrorCode },

    #[error("Timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Player has been shut down")]
    Shutdown,

    /// Strict decoding met a string that is not valid UTF-8
    #[error("Property {name} is not valid UTF-8: {reason}")]
    Decode { name: String, reason: String },

    #[error("Engine event queue overflowed")]
    EventOverflow,

    /// A user callback returned an error or panicked
    #[error("Callback failed: {0}")]
    Callback(Arc<anyhow::Error>),

    #[error("Engine error: {code}")]
    Engine { code: ErrorCode },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

// ----------------------------------------------------------------------------
// Constructors and Inspection
// ----------------------------------------------------------------------------

impl MpvError {
    /// Map an engine status code to the generic error variant
    pub fn from_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::EventQueueFull => MpvError::EventOverflow,
            code => MpvError::Engine { code },
        }
    }

    /// Map an engine status code raised while accessing `name`
    pub fn for_property(name: &str, code: ErrorCode) -> Self {
        let name = name.to_string();
        match code {
            ErrorCode::PropertyUnavailable => MpvError::PropertyUnavailable { name, code },
            ErrorCode::PropertyNotFound | ErrorCode::OptionNotFound => {
                MpvError::PropertyNotFound { name, code }
            }
            ErrorCode::PropertyFormat | ErrorCode::OptionFormat => MpvError::PropertyFormat {
                name,
                code,
                reason: code.description().to_string(),
            },
            code => MpvError::PropertyError { name, code },
        }
    }

    pub fn command<S: AsRef<str>>(command: &[S], code: ErrorCode) -> Self {
        MpvError::Command {
            command: command.iter().map(|s| s.as_ref().to_string()).collect(),
            code,
        }
    }

    pub fn format_error<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        MpvError::PropertyFormat {
            name: name.into(),
            code: ErrorCode::PropertyFormat,
            reason: reason.into(),
        }
    }

    pub fn config<R: Into<String>>(reason: R) -> Self {
        MpvError::Config {
            reason: reason.into(),
        }
    }

    pub fn callback(err: anyhow::Error) -> Self {
        MpvError::Callback(Arc::new(err))
    }

    pub fn timeout(duration: std::time::Duration) -> Self {
        MpvError::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, MpvError::Shutdown)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MpvError::Timeout { .. })
    }

    /// Engine status code behind this error, when there is one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MpvError::Init { code, .. }
            | MpvError::PropertyUnavailable { code, .. }
            | MpvError::PropertyNotFound { code, .. }
            | MpvError::PropertyError { code, .. }
            | MpvError::PropertyFormat { code, .. }
            | MpvError::Command { code, .. }
            | MpvError::Engine { code } => Some(*code),
            MpvError::EventOverflow => Some(ErrorCode::EventQueueFull),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MpvError {
    fn from(err: toml::de::Error) -> Self {
        MpvError::config(err.to_string())
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type MpvResult<T> = Result<T, MpvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_code_mapping() {
        assert!(matches!(
            MpvError::for_property("vid", ErrorCode::PropertyUnavailable),
            MpvError::PropertyUnavailable { name, code: ErrorCode::PropertyUnavailable } if name == "vid"
        ));
        assert!(matches!(
            MpvError::for_property("nope", ErrorCode::PropertyNotFound),
            MpvError::PropertyNotFound { code: ErrorCode::PropertyNotFound, .. }
        ));
        assert_eq!(
            MpvError::for_property("no-such-option", ErrorCode::OptionNotFound).code(),
            Some(ErrorCode::OptionNotFound)
        );
        assert_eq!(
            MpvError::for_property("speed", ErrorCode::OptionFormat).code(),
            Some(ErrorCode::OptionFormat)
        );
        assert_eq!(
            MpvError::format_error("pause", "expected a flag").code(),
            Some(ErrorCode::PropertyFormat)
        );
        assert!(matches!(
            MpvError::for_property("volume", ErrorCode::PropertyError),
            MpvError::PropertyError { code: ErrorCode::PropertyError, .. }
        ));
    }

    #[test]
    fn test_codes_and_predicates() {
        assert!(matches!(
            MpvError::from_code(ErrorCode::EventQueueFull),
            MpvError::EventOverflow
        ));
        let err = MpvError::command(&["frobnicate"], ErrorCode::Command);
        assert_eq!(err.code(), Some(ErrorCode::Command));
        assert!(MpvError::Shutdown.is_shutdown());
        assert_eq!(MpvError::Shutdown.code(), None);

        let cloned = MpvError::callback(anyhow::anyhow!("boom")).clone();
        assert!(cloned.to_string().contains("boom"));
    }
}
