//! Error types for secret resolution

use thiserror::Error;

/// Why a secret could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Invalid 1Password reference: {0}")]
    InvalidReference(String),

    #[error("1Password CLI (op) is not installed or not in PATH")]
    CliUnavailable,

    #[error("Not signed in to 1Password. Run 'op signin' first.")]
    NotSignedIn,

    #[error("Failed to read secret: {0}")]
    ReadFailed(String),

    #[error("Timeout waiting for 1Password CLI")]
    Timeout,
}

impl From<SecretError> for dailyhud_core::HudError {
    fn from(err: SecretError) -> Self {
        dailyhud_core::HudError::Secret(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SecretError>;
