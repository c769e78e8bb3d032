//! Room Bridge error types.
//!
//! `BridgeError` carries the failure taxonomy of the bridge. Every variant is
//! terminal for the current attempt only; none of them stop the process.
//! Messages returned to clients come from [`BridgeError::client_message`],
//! internal details stay in server-side logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message shown when the username or room name is blank.
pub const VALIDATION_MESSAGE: &str = "Username and Room Name are required.";

/// Message shown when the media service credentials are incomplete.
pub const CONFIGURATION_MESSAGE: &str = "LiveKit credentials not configured. Please check settings.";

/// Message shown when settings are saved with a blank field.
pub const SETTINGS_INCOMPLETE_MESSAGE: &str = "All fields are required";

/// Room Bridge error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - Configuration: 412 Precondition Failed
/// - Busy: 409 Conflict
/// - `AdapterFatal`: 502 Bad Gateway
/// - `CredentialIssuance`, Settings, Internal: 500 Internal Server Error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Required user input is empty or missing.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Media service credentials or URL are not configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Signing the join credential failed.
    #[error("Credential issuance failed: {0}")]
    CredentialIssuance(String),

    /// The media transport reported a terminal failure.
    #[error("Adapter error: {0}")]
    AdapterFatal(String),

    /// A join is still connecting.
    #[error("A join is already in progress")]
    Busy,

    /// Persisting settings failed.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Actor channel or other internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl BridgeError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "VALIDATION_ERROR",
            BridgeError::Configuration(_) => "CONFIGURATION_ERROR",
            BridgeError::CredentialIssuance(_) => "CREDENTIAL_ISSUANCE_ERROR",
            BridgeError::AdapterFatal(_) => "ADAPTER_ERROR",
            BridgeError::Busy => "BUSY",
            BridgeError::Settings(_) => "SETTINGS_ERROR",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::Configuration(_) => StatusCode::PRECONDITION_FAILED,
            BridgeError::Busy => StatusCode::CONFLICT,
            BridgeError::AdapterFatal(_) => StatusCode::BAD_GATEWAY,
            BridgeError::CredentialIssuance(_)
            | BridgeError::Settings(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-visible message. This is also what lands in the snapshot's
    /// `last_error`.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BridgeError::Validation(msg)
            | BridgeError::Configuration(msg)
            | BridgeError::AdapterFatal(msg) => msg.clone(),
            BridgeError::CredentialIssuance(reason) => format!("Failed to join room: {reason}"),
            BridgeError::Busy => "A join is already in progress".to_string(),
            BridgeError::Settings(_) => "Failed to save settings".to_string(),
            BridgeError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            BridgeError::CredentialIssuance(_) | BridgeError::Settings(_) | BridgeError::Internal(_) => {
                tracing::error!(target: "bridge.http", error = %self, "Request failed");
            }
            _ => {
                tracing::debug!(target: "bridge.http", error = %self, "Request rejected");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}
