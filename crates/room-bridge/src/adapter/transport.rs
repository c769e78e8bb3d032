//! Boundary to the external real-time media transport.
//!
//! The transport is a black box: the adapter connects through
//! [`RoomTransport`], then talks to the live session through
//! [`RoomConnection`]. Session-level happenings arrive as
//! [`TransportEvent`]s on a broadcast channel.

use crate::credential::Credential;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Events raised by a live transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session is connected.
    Connected,
    /// Connection dropped and the transport is trying to restore it.
    Reconnecting,
    /// Connection restored after `Reconnecting`.
    Reconnected,
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
    ActiveSpeakersChanged,
    /// Local microphone was enabled or disabled.
    MicrophoneChanged { enabled: bool },
    /// The transport failed after connecting.
    Failed { message: String },
    /// Session ended.
    Disconnected,
}

/// Participant state as the transport sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSample {
    pub identity: String,
    pub is_local: bool,
    pub is_speaking: bool,
    /// Raw audio level in `[0, 1]`.
    pub audio_level: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connect failed; the message comes from the transport.
    #[error("{0}")]
    ConnectFailed(String),

    /// No connect outcome within the allotted time.
    #[error("Timed out waiting for room client")]
    Timeout,

    /// Enabling or disabling the microphone failed.
    #[error("{0}")]
    Microphone(String),

    /// The session is gone.
    #[error("Room connection closed")]
    Closed,
}

/// Opens sessions with the media transport.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Connect to `server_url` as `identity`. Resolves once the session is
    /// established or has definitively failed.
    async fn connect(
        &self,
        server_url: &str,
        credential: &Credential,
        identity: &str,
    ) -> Result<Arc<dyn RoomConnection>, TransportError>;
}

/// A live transport session.
#[async_trait]
pub trait RoomConnection: Send + Sync {
    /// Subscribe to session events. Events raised before subscribing are not
    /// replayed, except a terminal event (`Failed`/`Disconnected`) that no
    /// subscriber received.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Whether the session is currently connected.
    fn is_connected(&self) -> bool;

    /// Current participants, local participant first.
    fn participants(&self) -> Vec<ParticipantSample>;

    /// Whether the local microphone is enabled.
    fn is_microphone_enabled(&self) -> bool;

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    /// End the session. Safe to call more than once.
    async fn disconnect(&self);
}
