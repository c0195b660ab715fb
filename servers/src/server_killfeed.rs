//! # Albion Killfeed Relay
//!
//! Polls the Albion Online game-info API for recent kills and relays every
//! newly seen one to connected clients.
//!
//! ## Core Responsibilities:
//! - **Upstream Polling:** Runs the `KillboardPollingPlugin` on a fixed gap,
//!   deduplicating kills by id.
//! - **Snapshot:** Keeps the most recent kills newest first and serves them on
//!   `GET /api/kills`.
//! - **Live Channel:** Pushes each new kill to every WebSocket client on `/ws`.
//! - **System Health & Lifecycle:** `/health` and `/status` endpoints, and a
//!   graceful shutdown on Ctrl-C or SIGTERM.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lib_common::core::{Dispatcher, RollingCache};
use lib_common::ingestors::KillboardPollingPlugin;
use lib_common::killboard::ApiCallKillboard;

mod killfeed_logic;
use killfeed_logic::config::{self, FileSource};
use killfeed_logic::{downstream, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;
    let _log_guard = logger::setup_logging(&settings.log_dir, &settings.log_level, "server_killfeed")?;

    match &settings.file_source {
        FileSource::Loaded(path) => info!("Loaded config file {}", path.display()),
        FileSource::Missing(path) => info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        ),
        FileSource::Rejected { path, reason } => warn!(
            reason = %reason,
            "Failed to parse config file: {}. Falling back to other sources.",
            path.display()
        ),
    }

    // --- Shared state ---
    let shutdown = CancellationToken::new();
    let cache = Arc::new(RollingCache::new(settings.cache_size));
    let dispatcher = Arc::new(Dispatcher::new(settings.subscriber_buffer));

    let source = ApiCallKillboard::new(settings.killboard_options())?;
    let mut poller = KillboardPollingPlugin::new(
        source,
        settings.poller_settings(),
        Arc::clone(&cache),
        Arc::clone(&dispatcher),
    );
    let app_state = state::AppState::new(cache, dispatcher, poller.stats(), shutdown.clone());

    // --- Listener ---
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        upstream = %settings.upstream_base_url,
        cache_size = settings.cache_size,
        "Killfeed relay listening on http://{}",
        addr
    );

    // --- Tasks ---
    let poller_token = shutdown.clone();
    let poller_handle = tokio::spawn(async move { poller.run(poller_token).await });
    let server_handle = tokio::spawn(downstream::serve(listener, app_state));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received. Closing gracefully...");
        signal_token.cancel();
    });

    // The server only returns early on a fatal error; stop the poller with it.
    let server_result = server_handle.await;
    shutdown.cancel();
    if let Err(e) = poller_handle.await {
        error!(error = %e, "Poller task panicked");
    }

    match server_result {
        Ok(Ok(())) => {
            info!("Shutdown complete.");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(e.into()),
    }
}

/// # Graceful Shutdown Signal Handler
///
/// Completes on `CTRL+C`, or on `SIGTERM` on UNIX systems. If a handler cannot
/// be installed that branch never completes and the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
