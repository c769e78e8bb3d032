//! Room service settings handlers.
//!
//! - `GET /api/settings` - current settings, secret redacted
//! - `PUT /api/settings` - validate, persist and publish new settings

use crate::errors::BridgeError;
use crate::routes::AppState;
use crate::settings::{SettingsForm, SettingsView};
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::instrument;

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsView> {
    Json(SettingsView::from(&state.settings.current()))
}

#[instrument(skip_all, name = "bridge.http.settings")]
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SettingsForm>,
) -> Result<Json<SettingsView>, BridgeError> {
    let saved = state.settings.save(&form).await?;
    Ok(Json(SettingsView::from(&saved)))
}
