//! Room client handlers.
//!
//! - `GET /api/room-client/commands` - relay commands as Server-Sent Events
//! - `POST /api/room-client/events?connection=<id>` - room client reports
//!
//! Reports always answer 204. Stale and malformed reports are dropped by the
//! relay, so a lagging room client never sees a server error.

use crate::relay::ReportOutcome;
use crate::routes::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use futures::{future, Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub connection: String,
}

pub async fn command_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.relay.subscribe_commands();
    info!(target: "bridge.relay", "Room client attached");

    let stream = BroadcastStream::new(receiver)
        .filter_map(|command| {
            future::ready(match command {
                Ok(command) => Event::default()
                    .event(command.name())
                    .json_data(&command)
                    .ok()
                    .map(Ok),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(target: "bridge.relay", skipped, "Room client fell behind the command stream");
                    None
                }
            })
        })
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn post_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
    body: String,
) -> StatusCode {
    let outcome = state.relay.report(&query.connection, &body);
    if outcome != ReportOutcome::Applied {
        debug!(target: "bridge.relay", ?outcome, "Room client report not applied");
    }
    StatusCode::NO_CONTENT
}
