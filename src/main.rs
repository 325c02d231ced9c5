use anyhow::{Context, Result};
use icepeek::config::{load_config, IcepeekConfig};
use icepeek::keystore::KeyStore;
use icepeek::proxy::{create_proxy_router, ProxyAppState};
use icepeek::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "icepeek=info".into()),
        )
        .init();

    info!("Icepeek starting...");

    let config_path =
        std::env::var("ICEPEEK_CONFIG").unwrap_or_else(|_| "icepeek.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        load_config(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config from {}: {}", config_path, e))?
    } else {
        info!(path = %config_path, "No config file found, using defaults");
        IcepeekConfig::default()
    };

    info!(
        bind = %config.server.bind,
        port = config.server.port,
        sessions_db = %config.storage.sessions_db,
        keystore_db = %config.storage.keystore_db,
        "Configuration loaded"
    );

    // Provision the master encryption key before any session exists
    let key_store =
        KeyStore::open(&config.storage.keystore_db).context("Failed to open key store")?;
    let master_key = key_store
        .get_or_create_key()
        .context("Failed to provision master encryption key")?;
    info!("Master encryption key ready");

    let session_store = Arc::new(
        SessionStore::new(&config.storage.sessions_db, master_key)
            .context("Failed to initialize session store")?,
    );
    info!("Session store initialized");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let router = create_proxy_router(ProxyAppState {
        session_store,
        http_client,
    });

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.bind, config.server.port))
            .await
            .context("Failed to bind server port")?;
    info!(port = config.server.port, "Icepeek API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Icepeek stopped");

    Ok(())
}
