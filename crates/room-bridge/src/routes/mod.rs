//! HTTP routes and application state.

use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::observability::{health_router, HealthState};
use crate::relay::RelayTransport;
use crate::session::SessionHandle;
use crate::settings::SettingsService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the session actor.
    pub session: SessionHandle,

    /// Live room service settings.
    pub settings: Arc<SettingsService>,

    /// Relay to the room client.
    pub relay: Arc<RelayTransport>,

    pub health: Arc<HealthState>,

    /// Cancelled on shutdown; ends open event streams.
    pub shutdown: CancellationToken,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - probes
/// - `/metrics` - Prometheus metrics
/// - `/api/session*` - session snapshot and commands
/// - `/api/settings` - room service settings
/// - `/api/room-client/*` - relay command stream and reports
///
/// Layers, innermost first: 30 second timeout, request tracing, HTTP
/// metrics.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/api/session", get(handlers::get_session))
        .route("/api/session/events", get(handlers::snapshot_stream))
        .route("/api/session/join", post(handlers::join_session))
        .route("/api/session/leave", post(handlers::leave_session))
        .route("/api/session/mute", post(handlers::toggle_mute))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route("/api/room-client/commands", get(handlers::command_stream))
        .route("/api/room-client/events", post(handlers::post_report))
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    api_routes
        .merge(metrics_routes)
        .merge(health_router(Arc::clone(&state.health)))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
