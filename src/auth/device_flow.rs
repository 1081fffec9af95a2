//! GitHub OAuth Device Authorization Grant (RFC 8628)
//!
//! The flow runs once, at startup, when no bearer credential is available:
//!
//! 1. Request a device grant from GitHub (one shot, failures are fatal)
//! 2. Show the user code and verification URL to the operator
//! 3. Poll the token endpoint until the user approves, the provider rejects
//!    the grant, or the grant expires
//!
//! Polling never polls faster than every [`MIN_POLL_INTERVAL`], and every
//! `slow_down` answer permanently widens the interval by [`SLOW_DOWN_STEP`].
//! Transport and decode failures while polling are treated as transient and
//! only cost wall-clock time.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{AuthError, BearerCredential};
use crate::config::Config;

/// Lower bound on the poll interval, whatever the provider advertises.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Added to the poll interval on every `slow_down` answer.
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_SCOPE: &str = "read:user";

/// Device grant returned by the device authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceGrant {
    /// Code used when polling; never shown to the user
    pub device_code: String,
    /// Code the user types at the verification URL
    pub user_code: String,
    /// Where the user approves the request
    pub verification_uri: String,
    /// Seconds until the grant expires
    pub expires_in: u64,
    /// Poll interval advertised by the provider, in seconds
    #[serde(default)]
    pub interval: u64,
}

/// One answer from the token endpoint.
///
/// While the user has not approved yet GitHub answers with `error` set and no
/// token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenPollResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenPollRequest<'a> {
    client_id: &'a str,
    device_code: &'a str,
    grant_type: &'a str,
}

/// Transport for the two device flow endpoints.
///
/// Kept behind a trait so the polling state machine can be driven by a
/// scripted client under a paused clock.
#[async_trait]
pub trait DeviceAuthClient: Send + Sync {
    /// Request a fresh device grant
    async fn request_device_code(&self) -> Result<DeviceGrant, AuthError>;

    /// Issue one token poll for `device_code`
    async fn poll_token(&self, device_code: &str) -> Result<TokenPollResponse, AuthError>;
}

/// Device flow client for github.com
pub struct GithubDeviceClient {
    client: reqwest::Client,
    client_id: String,
    device_code_url: String,
    token_url: String,
}

impl GithubDeviceClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            device_code_url: config.device_code_url.clone(),
            token_url: config.access_token_url.clone(),
        }
    }
}

#[async_trait]
impl DeviceAuthClient for GithubDeviceClient {
    #[instrument(skip(self), fields(url = %self.device_code_url))]
    async fn request_device_code(&self) -> Result<DeviceGrant, AuthError> {
        let response = self
            .client
            .post(&self.device_code_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&DeviceCodeRequest {
                client_id: &self.client_id,
                scope: DEFAULT_SCOPE,
            })
            .send()
            .await
            .map_err(|e| AuthError::DeviceCode(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::DeviceCode(format!(
                "device code request failed with status {}: {}",
                status, body
            )));
        }

        let grant: DeviceGrant = response
            .json()
            .await
            .map_err(|e| AuthError::DeviceCode(format!("failed to decode device response: {}", e)))?;

        debug!(
            expires_in = grant.expires_in,
            interval = grant.interval,
            "Device grant obtained"
        );

        Ok(grant)
    }

    async fn poll_token(&self, device_code: &str) -> Result<TokenPollResponse, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TokenPollRequest {
                client_id: &self.client_id,
                device_code,
                grant_type: DEVICE_CODE_GRANT_TYPE,
            })
            .send()
            .await?;

        // GitHub reports pending/denied states in the body, whatever the status.
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AuthError::decode("token poll response", e))
    }
}

/// Poll interval actually used for a grant advertising `advertised_secs`.
pub fn effective_interval(advertised_secs: u64) -> Duration {
    Duration::from_secs(advertised_secs).max(MIN_POLL_INTERVAL)
}

/// Drives the device authorization handshake to a bearer credential.
pub struct DeviceFlow<C> {
    client: C,
}

impl<C: DeviceAuthClient> DeviceFlow<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Run the whole flow.
    ///
    /// `on_grant` is called once with the grant so the operator can be told
    /// where to approve the request; polling starts right after it returns.
    pub async fn acquire<F>(&self, on_grant: F) -> Result<BearerCredential, AuthError>
    where
        F: FnOnce(&DeviceGrant),
    {
        info!("Starting GitHub device authorization");

        let grant = self.client.request_device_code().await?;
        on_grant(&grant);

        let bearer = self.poll(&grant).await?;
        info!(credential = %bearer, "GitHub device authorization completed");
        Ok(bearer)
    }

    /// Poll the token endpoint for `grant` until a terminal outcome.
    pub async fn poll(&self, grant: &DeviceGrant) -> Result<BearerCredential, AuthError> {
        let deadline = Instant::now() + Duration::from_secs(grant.expires_in);
        let mut interval = effective_interval(grant.interval);
        let mut attempt: u32 = 0;

        while Instant::now() < deadline {
            attempt += 1;

            match self.client.poll_token(&grant.device_code).await {
                Err(e) => {
                    debug!(attempt, error = %e, "Token poll failed, retrying");
                }
                Ok(response) => {
                    if let Some(token) = response.access_token.filter(|t| !t.is_empty()) {
                        return Ok(BearerCredential::new(token));
                    }

                    match response.error.as_deref() {
                        Some("authorization_pending") => {
                            debug!(attempt, "Authorization pending");
                        }
                        Some("slow_down") => {
                            interval += SLOW_DOWN_STEP;
                            warn!(
                                attempt,
                                interval_secs = interval.as_secs(),
                                "Provider asked to slow down"
                            );
                        }
                        Some(code) => return Err(AuthError::Authorization(code.to_string())),
                        None => {
                            return Err(AuthError::Authorization(
                                "token response carried neither a token nor an error".to_string(),
                            ))
                        }
                    }
                }
            }

            tokio::time::sleep(interval).await;
        }

        Err(AuthError::Timeout)
    }
}
