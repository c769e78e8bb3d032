//! Observability for the room bridge.
//!
//! Metric labels are bounded:
//! - `outcome`: join outcomes (validation_error, configuration_error,
//!   issuance_error, dispatch_error, busy, dispatched)
//! - `kind`: room event kinds (status, roster, levels, fatal, ignored)
//! - `reason`: drop reasons (stale_epoch, malformed, unknown_connection)
//! - `status`: success, error
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `bridge_join_attempts_total` | Counter | `outcome` | Join requests by outcome |
//! | `bridge_adapter_events_total` | Counter | `kind` | Adapter events applied to the session |
//! | `bridge_events_dropped_total` | Counter | `reason` | Events discarded before reaching the session |
//! | `bridge_session_phase` | Gauge | none | Current connection phase (0-3) |
//! | `bridge_transport_connect_duration_seconds` | Histogram | `status` | Transport connect latency |
//! | `bridge_http_requests_total` | Counter | `method`, `endpoint`, `status_code` | HTTP responses |
//! | `bridge_http_request_duration_seconds` | Histogram | `method`, `endpoint`, `status` | HTTP latency |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
