//! GitHub and Copilot credential management
//!
//! Two credentials are involved in talking to Copilot:
//! - a long-lived GitHub bearer credential obtained once through the OAuth
//!   device flow ([`device_flow`]) and persisted by [`store`]
//! - a short-lived Copilot session credential exchanged for the bearer on
//!   demand and cached in memory ([`session_token`])

pub mod device_flow;
pub mod error;
pub mod session_token;
pub mod store;

use std::fmt;

pub use device_flow::{DeviceAuthClient, DeviceFlow, DeviceGrant, GithubDeviceClient};
pub use error::AuthError;
pub use session_token::{
    GithubSessionTokenSource, SessionCredential, SessionTokenCache, SessionTokenSource,
    TokenStatus,
};
pub use store::CredentialStore;

/// Long-lived GitHub OAuth token.
///
/// `Debug` and `Display` only ever render a redacted form; use
/// [`BearerCredential::expose`] where the raw value has to go on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short form safe for logs: the first four characters followed by a mask.
    pub fn redacted(&self) -> String {
        redact(&self.0)
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerCredential")
            .field(&self.redacted())
            .finish()
    }
}

impl fmt::Display for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

pub(crate) fn redact(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}
