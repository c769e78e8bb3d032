//! HTTP request handlers.

pub mod metrics;
pub mod room_client;
pub mod session;
pub mod settings;

pub use metrics::metrics_handler;
pub use room_client::{command_stream, post_report};
pub use session::{get_session, join_session, leave_session, snapshot_stream, toggle_mute};
pub use settings::{get_settings, put_settings};
