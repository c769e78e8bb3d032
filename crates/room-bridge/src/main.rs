//! Room Bridge
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Load room service settings (settings file, then `LIVEKIT_*` overrides)
//! 4. Spawn the session actor over the relay transport
//! 5. Serve HTTP until SIGINT/SIGTERM

use anyhow::{Context, Result};
use room_bridge::adapter::RoomTransport;
use room_bridge::config::Config;
use room_bridge::credential::CredentialIssuer;
use room_bridge::observability::{init_metrics_recorder, HealthState};
use room_bridge::relay::RelayTransport;
use room_bridge::routes::{build_routes, AppState};
use room_bridge::session::SessionActor;
use room_bridge::settings::{
    EnvFileSettingsStore, RoomServiceSettings, SettingsService, SettingsStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the session actor to release the room on shutdown.
const SESSION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Bridge");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        settings_path = %config.settings_path.display(),
        token_ttl_seconds = config.token_ttl.as_secs(),
        audio_sample_interval_ms = config.audio_sample_interval.as_millis(),
        relay_connect_timeout_seconds = config.relay_connect_timeout.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;

    let store = Arc::new(EnvFileSettingsStore::new(config.settings_path.clone()));
    let persisted = store
        .load()
        .await
        .with_context(|| format!("loading {}", config.settings_path.display()))?;
    let settings = persisted.overlay(RoomServiceSettings::from_lookup(|key| {
        std::env::var(key).ok()
    }));
    if !settings.is_complete() {
        warn!(target: "bridge.settings", "Room service settings incomplete; joins fail until they are saved");
    }
    let settings = Arc::new(SettingsService::new(store, settings));

    let shutdown_token = CancellationToken::new();
    let relay = Arc::new(RelayTransport::new(config.relay_connect_timeout));
    let transport: Arc<dyn RoomTransport> = relay.clone();
    let (session, session_task) = SessionActor::spawn(
        transport,
        settings.subscribe(),
        CredentialIssuer::new(config.token_ttl),
        config.audio_sample_interval,
        shutdown_token.child_token(),
    );

    let health = Arc::new(HealthState::new());
    let state = Arc::new(AppState {
        session,
        settings,
        relay,
        health: Arc::clone(&health),
        shutdown: shutdown_token.clone(),
    });
    let app = build_routes(state, metrics_handle);

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    health.set_ready();
    info!("Room Bridge listening on {}", addr);

    let server_token = shutdown_token.clone();
    let server_health = Arc::clone(&health);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_health.set_not_ready();
            server_token.cancel();
        })
        .await
        .context("HTTP server")?;

    shutdown_token.cancel();
    if tokio::time::timeout(SESSION_SHUTDOWN_TIMEOUT, session_task)
        .await
        .is_err()
    {
        warn!("Session actor did not stop in time");
    }

    info!("Room Bridge shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
