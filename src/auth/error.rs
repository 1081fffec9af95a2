//! Error types for credential acquisition and exchange

use thiserror::Error;

/// Errors raised while obtaining GitHub or Copilot credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// The one-shot device code request failed
    #[error("Failed to request device code: {0}")]
    DeviceCode(String),

    /// The provider answered a poll with a terminal error code
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// The device grant expired before the user completed authorization
    #[error("Authentication timed out")]
    Timeout,

    /// The session-token endpoint answered with a non-success status
    #[error("Copilot token exchange failed with status {status}: {body}")]
    Exchange { status: u16, body: String },

    /// A provider response could not be decoded
    #[error("Failed to decode {what}: {message}")]
    Decode {
        what: &'static str,
        message: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential store error: {0}")]
    Store(String),
}

impl AuthError {
    pub(crate) fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        AuthError::Decode {
            what,
            message: err.to_string(),
        }
    }
}
