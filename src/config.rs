//! Configuration management for the Copilot proxy
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured by the binary before this runs).

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// GitHub OAuth client id used by the Copilot editor integrations.
pub const DEFAULT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

const DEFAULT_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const DEFAULT_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const DEFAULT_COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const DEFAULT_COPILOT_API_URL: &str = "https://api.githubcopilot.com";
const DEFAULT_MODEL: &str = "gpt-5-mini";
const CREDENTIALS_FILE_NAME: &str = ".claude_copilot_proxy.json";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Pre-supplied GitHub bearer credential (skips the device flow)
    pub github_token: Option<String>,
    /// OAuth client id for the device flow
    pub client_id: String,
    /// Device authorization endpoint
    pub device_code_url: String,
    /// Device flow token poll endpoint
    pub access_token_url: String,
    /// Copilot session-token exchange endpoint
    pub copilot_token_url: String,
    /// Copilot chat API base URL
    pub copilot_api_url: String,
    /// Model used when a request leaves `model` empty
    pub default_model: String,

    /// Where the bearer credential is persisted
    pub credentials_path: PathBuf,

    /// Upper bound on waiting for a terminal session event, in seconds (0 disables)
    pub response_timeout_seconds: u64,
    /// Skip TLS certificate verification on outbound requests
    pub insecure_tls: bool,
    /// Log prompt bodies at debug level
    pub debug_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("PROXY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PROXY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PROXY_PORT")?,

            github_token: env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            client_id: env::var("COPILOT_CLIENT_ID")
                .unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string()),
            device_code_url: env::var("GITHUB_DEVICE_CODE_URL")
                .unwrap_or_else(|_| DEFAULT_DEVICE_CODE_URL.to_string()),
            access_token_url: env::var("GITHUB_ACCESS_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_ACCESS_TOKEN_URL.to_string()),
            copilot_token_url: env::var("COPILOT_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_COPILOT_TOKEN_URL.to_string()),
            copilot_api_url: env::var("COPILOT_API_URL")
                .unwrap_or_else(|_| DEFAULT_COPILOT_API_URL.to_string()),
            default_model: env::var("COPILOT_DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),

            credentials_path: match env::var("PROXY_CREDENTIALS_PATH") {
                Ok(path) if !path.is_empty() => PathBuf::from(path),
                _ => credentials_path_in(dirs::home_dir())?,
            },

            response_timeout_seconds: env::var("PROXY_RESPONSE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid PROXY_RESPONSE_TIMEOUT_SECS")?,
            insecure_tls: flag("PROXY_INSECURE_TLS"),
            debug_enabled: flag("PROXY_DEBUG"),
        })
    }

    /// Configuration suitable for tests, pointing every endpoint at `base_url`.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            github_token: Some("gho_test_token".to_string()),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            device_code_url: format!("{}/login/device/code", base_url),
            access_token_url: format!("{}/login/oauth/access_token", base_url),
            copilot_token_url: format!("{}/copilot_internal/v2/token", base_url),
            copilot_api_url: base_url.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            credentials_path: env::temp_dir().join("copilot-proxy-test-credentials.json"),
            response_timeout_seconds: 5,
            insecure_tls: false,
            debug_enabled: false,
        }
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// The credential file lives in the user's home directory; there is no
/// working-directory fallback.
fn credentials_path_in(home: Option<PathBuf>) -> Result<PathBuf> {
    let home = home.context(
        "Could not determine home directory; set PROXY_CREDENTIALS_PATH",
    )?;
    Ok(home.join(CREDENTIALS_FILE_NAME))
}
