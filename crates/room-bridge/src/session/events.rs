//! Room events: the typed form of messages raised by the room session
//! adapter.
//!
//! Wire shapes (JSON), one of:
//!
//! ```text
//! {"status": "Connected" | "Connecting..." | "Reconnecting..." | "Disconnected", "roster": [...]?}
//! {"type": "error", "message": "..."}
//! {"participants": [...], "is_muted": bool}
//! {"levels": [{"identity": "...", "level": 0.42}]}
//! ```
//!
//! Anything else, including unparseable text, becomes [`RoomEvent::Ignored`]
//! so malformed input never reaches the state machine as a loose map.

use serde::{Deserialize, Serialize};

/// Connection status carried by a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    #[serde(rename = "Connected")]
    Connected,
    #[serde(rename = "Connecting...", alias = "Connecting")]
    Connecting,
    #[serde(rename = "Reconnecting...", alias = "Reconnecting")]
    Reconnecting,
    #[serde(rename = "Disconnected")]
    Disconnected,
}

/// A participant descriptor as reported by the room client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub identity: String,
    #[serde(default)]
    pub is_speaking: bool,
    #[serde(default)]
    pub is_local: bool,
    /// Raw audio level in `[0, 1]`, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_level: Option<f32>,
}

/// A displayed audio level for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantLevel {
    pub identity: String,
    pub level: f32,
}

/// A validated adapter event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    StatusChanged {
        status: RoomStatus,
        roster: Option<Vec<ParticipantReport>>,
    },
    RosterUpdated {
        participants: Vec<ParticipantReport>,
        is_muted: Option<bool>,
    },
    LevelsSampled {
        levels: Vec<ParticipantLevel>,
    },
    Fatal {
        message: String,
    },
    /// Malformed or unrecognized message.
    Ignored,
}

/// Default message for an error event that carries none.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
    status: Option<RoomStatus>,
    roster: Option<Vec<ParticipantReport>>,
    participants: Option<Vec<ParticipantReport>>,
    is_muted: Option<bool>,
    levels: Option<Vec<ParticipantLevel>>,
}

impl RoomEvent {
    /// Parse a JSON message. Never fails.
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<WireEvent>(raw) {
            Ok(wire) => Self::from_wire(wire),
            Err(e) => {
                tracing::debug!(target: "bridge.session", error = %e, "Unparseable room event");
                RoomEvent::Ignored
            }
        }
    }

    fn from_wire(wire: WireEvent) -> Self {
        if wire.kind.as_deref() == Some("error") {
            return RoomEvent::Fatal {
                message: wire
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            };
        }

        if let Some(status) = wire.status {
            return RoomEvent::StatusChanged {
                status,
                roster: wire.roster.or(wire.participants),
            };
        }

        if let Some(participants) = wire.participants.or(wire.roster) {
            return RoomEvent::RosterUpdated {
                participants,
                is_muted: wire.is_muted,
            };
        }

        if let Some(levels) = wire.levels {
            return RoomEvent::LevelsSampled { levels };
        }

        RoomEvent::Ignored
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomEvent::StatusChanged { .. } => "status",
            RoomEvent::RosterUpdated { .. } => "roster",
            RoomEvent::LevelsSampled { .. } => "levels",
            RoomEvent::Fatal { .. } => "fatal",
            RoomEvent::Ignored => "ignored",
        }
    }

    /// Roster pull event built from participant descriptors.
    #[must_use]
    pub fn roster(participants: Vec<ParticipantReport>, is_muted: bool) -> Self {
        RoomEvent::RosterUpdated {
            participants,
            is_muted: Some(is_muted),
        }
    }

    /// Status event without a roster.
    #[must_use]
    pub const fn status(status: RoomStatus) -> Self {
        RoomEvent::StatusChanged {
            status,
            roster: None,
        }
    }
}
