//! The session snapshot observed by the presentation layer.

use crate::credential::Credential;
use serde::Serialize;

/// Connection phase of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionPhase {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Reconnecting => "reconnecting",
        }
    }

    /// Numeric value exported on the phase gauge.
    #[must_use]
    pub const fn gauge_value(self) -> f64 {
        match self {
            ConnectionPhase::Disconnected => 0.0,
            ConnectionPhase::Connecting => 1.0,
            ConnectionPhase::Connected => 2.0,
            ConnectionPhase::Reconnecting => 3.0,
        }
    }

    /// Whether a session exists in this phase.
    #[must_use]
    pub const fn in_session(self) -> bool {
        !matches!(self, ConnectionPhase::Disconnected)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub identity: String,
    pub is_local: bool,
    pub is_speaking: bool,
    /// Displayed level as a fraction of full width, in `[0, 1]`.
    pub audio_level: f32,
}

/// The single mutable state record for a user session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub room_id: String,
    pub identity: String,
    #[serde(skip)]
    pub credential: Option<Credential>,
    pub connection_phase: ConnectionPhase,
    pub is_muted: bool,
    pub roster: Vec<Participant>,
    pub last_error: String,
    pub busy: bool,
}

impl SessionSnapshot {
    /// Reset to the empty `Disconnected` form. `busy` and `last_error` are
    /// left for the caller to decide.
    pub fn reset_session(&mut self) {
        self.room_id.clear();
        self.identity.clear();
        self.credential = None;
        self.connection_phase = ConnectionPhase::Disconnected;
        self.is_muted = false;
        self.roster.clear();
    }

    /// Check the snapshot invariants, returning the first violation.
    #[must_use]
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.credential.is_some() && self.room_id.is_empty() {
            return Some("credential present without a room");
        }
        if self.credential.is_some() != self.connection_phase.in_session() {
            return Some("credential presence does not match connection phase");
        }
        if self.connection_phase == ConnectionPhase::Disconnected && !self.roster.is_empty() {
            return Some("roster not empty while disconnected");
        }
        let mut seen = std::collections::HashSet::new();
        if !self.roster.iter().all(|p| seen.insert(p.identity.as_str())) {
            return Some("duplicate identity in roster");
        }
        None
    }
}
