//! Error types for daily-hud

use thiserror::Error;

/// Main error type for daily-hud operations
#[derive(Error, Debug)]
pub enum HudError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error with context
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file does not exist
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    /// One or more explicitly requested checks are not registered
    #[error("Unknown checks: {}", unknown.join(", "))]
    UnknownChecks {
        unknown: Vec<String>,
        available: Vec<String>,
    },

    /// Selection resolved to nothing to run
    #[error("No checks configured. Edit your config file.")]
    NoChecksConfigured,

    /// Secret lookup failed
    #[error("Secret error: {0}")]
    Secret(String),

    /// External command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Timeout error
    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl HudError {
    /// True for errors that must stop the run before any check is dispatched
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HudError::Config(_)
                | HudError::ConfigNotFound(_)
                | HudError::UnknownChecks { .. }
                | HudError::NoChecksConfigured
                | HudError::Parse { .. }
        )
    }
}

impl From<serde_json::Error> for HudError {
    fn from(err: serde_json::Error) -> Self {
        HudError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HudError {
    fn from(err: serde_yaml::Error) -> Self {
        HudError::Serialization(err.to_string())
    }
}

/// Result type alias for daily-hud operations
pub type Result<T> = std::result::Result<T, HudError>;
