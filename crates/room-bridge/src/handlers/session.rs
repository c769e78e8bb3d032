//! Session handlers.
//!
//! - `GET /api/session` - current snapshot
//! - `GET /api/session/events` - snapshot changes as Server-Sent Events
//! - `POST /api/session/join` - join a room
//! - `POST /api/session/leave` - leave the room
//! - `POST /api/session/mute` - toggle the local microphone
//!
//! Commands answer with the snapshot as it stands once the command has been
//! dispatched. Connection progress arrives later through the event stream.

use crate::errors::BridgeError;
use crate::routes::AppState;
use crate::session::SessionSnapshot;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use futures::{future, Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::instrument;

/// Body of `POST /api/session/join`. Missing fields count as blank and are
/// rejected by the session, not by the extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
    pub username: String,
    pub room_name: String,
}

pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

#[instrument(skip_all, name = "bridge.http.join")]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<SessionSnapshot>, BridgeError> {
    let snapshot = state
        .session
        .join(&request.username, &request.room_name)
        .await?;
    Ok(Json(snapshot))
}

#[instrument(skip_all, name = "bridge.http.leave")]
pub async fn leave_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, BridgeError> {
    Ok(Json(state.session.leave().await?))
}

#[instrument(skip_all, name = "bridge.http.mute")]
pub async fn toggle_mute(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, BridgeError> {
    Ok(Json(state.session.toggle_mute().await?))
}

/// Streams the current snapshot, then every change, until shutdown.
pub async fn snapshot_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.session.subscribe())
        .filter_map(|snapshot| {
            future::ready(
                Event::default()
                    .event("snapshot")
                    .json_data(&snapshot)
                    .ok()
                    .map(Ok),
            )
        })
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}
