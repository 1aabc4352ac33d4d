//! Error types and handling for Solarizer
//!
//! One error enum covers the whole crate. The fetch path distinguishes four
//! upstream failure kinds (breaker open, transport, remote status, decode) so
//! callers can tell a locally refused call from one that reached Solar.web.

use thiserror::Error;

/// Result type alias for Solarizer operations
pub type Result<T> = std::result::Result<T, SolarizerError>;

/// Main error type for Solarizer
#[derive(Debug, Error)]
pub enum SolarizerError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The session file could not be written; in-memory state is still authoritative
    #[error("Session persistence error: {message}")]
    SessionPersistence { message: String },

    /// The circuit breaker refused the call without contacting the remote
    #[error("Upstream unavailable: circuit breaker is {state}")]
    BreakerOpen { state: String },

    /// Network-level failure talking to the remote
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The remote answered outside 2xx
    #[error("Remote returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// The response body did not match the expected shape
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Time-series sink errors
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// HTTP facade errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },
}

impl SolarizerError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SolarizerError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        SolarizerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SolarizerError::Io {
            message: message.into(),
        }
    }

    /// Create a new session persistence error
    pub fn session_persistence<S: Into<String>>(message: S) -> Self {
        SolarizerError::SessionPersistence {
            message: message.into(),
        }
    }

    /// Create a new breaker-open error
    pub fn breaker_open<S: Into<String>>(state: S) -> Self {
        SolarizerError::BreakerOpen {
            state: state.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        SolarizerError::Transport {
            message: message.into(),
        }
    }

    /// Create a new remote status error
    pub fn remote_status<S: Into<String>>(status: u16, body: S) -> Self {
        SolarizerError::RemoteStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        SolarizerError::Decode {
            message: message.into(),
        }
    }

    /// Create a new sink error
    pub fn sink<S: Into<String>>(message: S) -> Self {
        SolarizerError::Sink {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        SolarizerError::Web {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        SolarizerError::Auth {
            message: message.into(),
        }
    }

    /// Whether the error was produced locally by the breaker
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, SolarizerError::BreakerOpen { .. })
    }
}

impl From<std::io::Error> for SolarizerError {
    fn from(err: std::io::Error) -> Self {
        SolarizerError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SolarizerError {
    fn from(err: serde_yaml::Error) -> Self {
        SolarizerError::Serialization {
            message: err.to_string(),
        }
    }
}

// JSON errors on the fetch path are always body-shape problems
impl From<serde_json::Error> for SolarizerError {
    fn from(err: serde_json::Error) -> Self {
        SolarizerError::decode(err.to_string())
    }
}

impl From<reqwest::Error> for SolarizerError {
    fn from(err: reqwest::Error) -> Self {
        SolarizerError::transport(err.to_string())
    }
}
