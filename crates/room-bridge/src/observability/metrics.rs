//! Metric recording functions.
//!
//! All metrics use the `bridge_` prefix, `_total` for counters and
//! `_seconds` for duration histograms.

use crate::session::snapshot::ConnectionPhase;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to serve
/// `/metrics`. Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Room connects include a network handshake plus the room client's
        // own round trip.
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_transport".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000],
        )
        .map_err(|e| format!("Failed to set transport connect buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a join request outcome.
///
/// Metric: `bridge_join_attempts_total`
/// Labels: `outcome`
pub fn record_join_attempt(outcome: &str) {
    counter!("bridge_join_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record an adapter event delivered to the session actor.
///
/// Metric: `bridge_adapter_events_total`
/// Labels: `kind`
pub fn record_adapter_event(kind: &str) {
    counter!("bridge_adapter_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record an event discarded before it could change the session.
///
/// Metric: `bridge_events_dropped_total`
/// Labels: `reason`
pub fn record_event_dropped(reason: &str) {
    counter!("bridge_events_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Set the current connection phase.
///
/// Metric: `bridge_session_phase`
pub fn set_session_phase(phase: ConnectionPhase) {
    gauge!("bridge_session_phase").set(phase.gauge_value());
}

// ============================================================================
// Transport Metrics
// ============================================================================

/// Record a transport connect attempt.
///
/// Metric: `bridge_transport_connect_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_transport_connect(status: &str, duration: Duration) {
    histogram!("bridge_transport_connect_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `bridge_http_requests_total`, `bridge_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("bridge_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("bridge_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Known paths keep their name; anything else is "/other".
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/session" => "/api/session",
        "/api/session/join" => "/api/session/join",
        "/api/session/leave" => "/api/session/leave",
        "/api/session/mute" => "/api/session/mute",
        "/api/session/events" => "/api/session/events",
        "/api/settings" => "/api/settings",
        "/api/room-client/commands" => "/api/room-client/commands",
        "/api/room-client/events" => "/api/room-client/events",
        _ => "/other",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/api/session/join"), "/api/session/join");
        assert_eq!(normalize_endpoint("/api/settings"), "/api/settings");
        assert_eq!(normalize_endpoint("/api/session/abc123"), "/other");
        assert_eq!(normalize_endpoint("/"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_recording_with_debugging_recorder() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_join_attempt("dispatched");
            record_join_attempt("dispatched");
            record_adapter_event("status");
            record_event_dropped("stale_epoch");
            set_session_phase(ConnectionPhase::Connected);
            record_transport_connect("success", Duration::from_millis(120));
            record_http_request("POST", "/api/session/join", 200, Duration::from_millis(3));
        });

        let metrics = snapshotter.snapshot().into_vec();
        assert!(metrics.len() >= 7, "got {}", metrics.len());

        let joins = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "bridge_join_attempts_total")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(joins, Some(DebugValue::Counter(2)).as_ref());

        let phase = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "bridge_session_phase")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(
            phase,
            Some(DebugValue::Gauge(ConnectionPhase::Connected.gauge_value().into())).as_ref()
        );
    }
}
