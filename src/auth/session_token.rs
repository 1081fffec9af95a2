//! Copilot session-token cache
//!
//! The Copilot chat API does not accept the GitHub bearer directly. It wants a
//! short-lived session token minted by an internal GitHub endpoint. This
//! module exchanges the bearer for such a token and keeps it in memory until
//! it is within [`REFRESH_MARGIN_SECS`] of expiring.
//!
//! The cache is the only state shared by concurrent requests. Refreshes are
//! single-flight: callers that race past an expired entry queue on the
//! refresh lock, and all but the first find a fresh entry once they get it.
//! A failed refresh leaves the previous entry in place.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::{redact, AuthError, BearerCredential};
use crate::config::Config;
use crate::routes::metrics;

/// A cached token is only handed out while it has more than this many
/// seconds left.
pub const REFRESH_MARGIN_SECS: i64 = 30;

pub(crate) const EDITOR_VERSION: &str = "vscode/1.90.0";
pub(crate) const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.15.0";
pub(crate) const USER_AGENT: &str = "GitHubCopilotChat/0.15.0";

/// Short-lived Copilot API credential.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SessionCredential {
    pub token: String,
    /// Unix timestamp, seconds
    pub expires_at: i64,
}

impl SessionCredential {
    /// Whether the credential may still be used at unix time `now`.
    pub fn is_fresh_at(&self, now: i64) -> bool {
        now + REFRESH_MARGIN_SECS < self.expires_at
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &redact(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cache state reported by the health endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenStatus {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Exchanges a bearer credential for a session credential.
#[async_trait]
pub trait SessionTokenSource: Send + Sync {
    async fn exchange(&self, bearer: &BearerCredential) -> Result<SessionCredential, AuthError>;
}

/// Session-token exchange against GitHub's internal Copilot endpoint
pub struct GithubSessionTokenSource {
    client: reqwest::Client,
    token_url: String,
}

impl GithubSessionTokenSource {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            token_url: config.copilot_token_url.clone(),
        }
    }
}

#[async_trait]
impl SessionTokenSource for GithubSessionTokenSource {
    #[instrument(skip(self, bearer), fields(url = %self.token_url))]
    async fn exchange(&self, bearer: &BearerCredential) -> Result<SessionCredential, AuthError> {
        let response = self
            .client
            .get(&self.token_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", bearer.expose()),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AuthError::decode("copilot token response", e))
    }
}

/// In-memory, expiry-aware cache of the current session credential.
pub struct SessionTokenCache {
    source: Arc<dyn SessionTokenSource>,
    current: RwLock<Option<SessionCredential>>,
    refresh: Mutex<()>,
}

impl SessionTokenCache {
    pub fn new(source: Arc<dyn SessionTokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return a usable session credential, exchanging `bearer` if needed.
    pub async fn get(&self, bearer: &BearerCredential) -> Result<SessionCredential, AuthError> {
        self.get_at(bearer, chrono::Utc::now().timestamp()).await
    }

    pub(crate) async fn get_at(
        &self,
        bearer: &BearerCredential,
        now: i64,
    ) -> Result<SessionCredential, AuthError> {
        if let Some(credential) = self.fresh_at(now).await {
            metrics::record_token_lookup("hit");
            return Ok(credential);
        }

        let _refreshing = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(credential) = self.fresh_at(now).await {
            metrics::record_token_lookup("hit");
            return Ok(credential);
        }

        debug!("Copilot session token missing or expiring, exchanging");

        match self.source.exchange(bearer).await {
            Ok(credential) => {
                *self.current.write().await = Some(credential.clone());
                metrics::record_token_lookup("refreshed");
                info!(
                    expires_at = credential.expires_at,
                    "Refreshed Copilot session token"
                );
                Ok(credential)
            }
            Err(e) => {
                metrics::record_token_lookup("failed");
                warn!(error = %e, "Copilot session token refresh failed, keeping previous entry");
                Err(e)
            }
        }
    }

    /// Drop the cached credential so the next lookup exchanges again.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    pub async fn status(&self) -> TokenStatus {
        let current = self.current.read().await;
        TokenStatus {
            cached: current.is_some(),
            expires_at: current.as_ref().map(|c| c.expires_at),
        }
    }

    async fn fresh_at(&self, now: i64) -> Option<SessionCredential> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_fresh_at(now))
            .cloned()
    }
}
