//! Copilot Proxy - Anthropic Messages API served by GitHub Copilot
//!
//! This is the main entry point for the proxy server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use copilot_proxy::auth::{BearerCredential, CredentialStore, DeviceFlow, GithubDeviceClient};
use copilot_proxy::{build_http_client, routes, sanitize_proxy_value, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copilot_proxy=info,tower_http=info".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = Config::from_env()?;
    let store = CredentialStore::new(config.credentials_path.clone());

    if std::env::args().skip(1).any(|a| a == "--logoff" || a == "-logoff") {
        return logoff(&store);
    }

    info!("Starting Copilot Proxy");
    log_proxy_environment(&config);

    let http_client = build_http_client(&config)?;
    let bearer = resolve_bearer(&config, &store, http_client.clone()).await?;

    routes::metrics::init_metrics();

    let state = Arc::new(AppState::new(config.clone(), bearer.clone(), http_client));
    info!(backend = state.backend.name(), "Application state initialized");

    match state.session_tokens.get(&bearer).await {
        Ok(_) => info!("GitHub Copilot authentication OK"),
        Err(e) => warn!(
            error = %e,
            "Could not obtain a Copilot session token; the stored credential may have expired. \
             Run with --logoff and restart to sign in again"
        ),
    }

    let app = routes::create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid PROXY_HOST/PROXY_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    info!(
        "Point a Messages API client at the proxy, e.g. \
         ANTHROPIC_AUTH_TOKEN=dummy ANTHROPIC_BASE_URL=http://{} claude --model {}",
        addr, config.default_model
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Copilot Proxy shutdown complete");
    Ok(())
}

fn logoff(store: &CredentialStore) -> Result<()> {
    let removed = store
        .delete()
        .context("Failed to remove stored credentials")?;
    if removed {
        println!("Removed stored credentials: {}", store.path().display());
    } else {
        println!("No stored credentials at {}", store.path().display());
    }
    Ok(())
}

/// Find the GitHub bearer credential: environment, then the credential
/// store, then an interactive device authorization.
async fn resolve_bearer(
    config: &Config,
    store: &CredentialStore,
    http_client: reqwest::Client,
) -> Result<BearerCredential> {
    if let Some(token) = &config.github_token {
        info!("Using GitHub credential from GITHUB_TOKEN");
        return Ok(BearerCredential::new(token.clone()));
    }

    match store.load() {
        Ok(Some(bearer)) => {
            info!(path = %store.path().display(), "Using stored GitHub credential");
            return Ok(bearer);
        }
        Ok(None) => info!("No stored GitHub credential, starting device authorization"),
        Err(e) => warn!(error = %e, "Ignoring unreadable credential store"),
    }

    let flow = DeviceFlow::new(GithubDeviceClient::new(http_client, config));
    let bearer = flow
        .acquire(|grant| {
            println!();
            println!("To authorize GitHub Copilot access, open:");
            println!("    {}", grant.verification_uri);
            println!("and enter the code:");
            println!("    {}", grant.user_code);
            println!();
        })
        .await
        .context("GitHub device authorization failed")?;

    if let Err(e) = store.save(&bearer) {
        warn!(error = %e, "Could not persist GitHub credential; authorization will be asked again next start");
    } else {
        info!(path = %store.path().display(), "GitHub credential saved");
    }

    Ok(bearer)
}

fn log_proxy_environment(config: &Config) {
    let mut has_proxy = false;
    for key in copilot_proxy::PROXY_ENV_VARS {
        if let Ok(value) = std::env::var(key) {
            if !value.is_empty() {
                has_proxy = true;
                info!("Proxy: {}={}", key, sanitize_proxy_value(&value));
            }
        }
    }

    if config.insecure_tls {
        warn!("TLS certificate verification is disabled (PROXY_INSECURE_TLS)");
    } else if has_proxy {
        info!("If TLS errors occur behind an intercepting proxy, try PROXY_INSECURE_TLS=true");
    }
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
