//! `file-cipher-svc` — HTTP file encryption service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP).
//! 3. Load the service key from disk, creating it on first run.
//! 4. Build the [`CipherService`] from the key.
//! 5. Create the upload/output directory layout.
//! 6. Build the Axum router and serve until Ctrl-C / SIGTERM.

mod config;
mod crypto;
mod keystore;
mod server;
mod storage;
mod telemetry;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use config::Config;
use crypto::CipherService;
use server::state::AppState;
use storage::FileStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otlp_endpoint(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        ttl_secs = cfg.token_ttl_secs,
        "file-cipher-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key
    // -----------------------------------------------------------------------
    let key_path = Path::new(&cfg.key_file_path);
    let (key, origin) = keystore::load_or_create(key_path)
        .with_context(|| format!("failed to load key from {}", key_path.display()))?;
    info!(
        key_id = %key.key_id(),
        path = %key_path.display(),
        origin = ?origin,
        "service key ready"
    );

    // -----------------------------------------------------------------------
    // 4. Cipher
    // -----------------------------------------------------------------------
    let cipher = CipherService::new(key.as_bytes()).context("service key rejected by cipher")?;
    drop(key);

    // -----------------------------------------------------------------------
    // 5. Storage
    // -----------------------------------------------------------------------
    let storage = FileStorage::init(&cfg.data_dir, cfg.keep_uploads)
        .with_context(|| format!("failed to prepare data directory {}", cfg.data_dir))?;
    info!(data_dir = %cfg.data_dir, keep_uploads = cfg.keep_uploads, "storage ready");

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(cipher, storage, cfg.token_ttl());
    let router = server::router::build(state, cfg.max_upload_bytes);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    telemetry::shutdown();
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
