//! Synchronization State Machine.
//!
//! Pure, synchronous transition logic over the [`SessionSnapshot`]. The
//! session actor owns exactly one `SessionState` and performs the side
//! effects (adapter commands, publishing, metrics) around these calls.
//!
//! ```text
//! Disconnected ──join──▶ Connecting ──{Connected}──▶ Connected ◀──▶ Reconnecting
//!       ▲                     │                          │               │
//!       └──── leave / {type: error} / {Disconnected} ────┴───────────────┘
//! ```
//!
//! Each successful join opens a new epoch. Adapter events carry the epoch of
//! the connect they belong to and are applied only while that epoch is the
//! open one; leave, fatal errors and remote disconnects close it.

use super::events::{ParticipantReport, RoomEvent, RoomStatus};
use super::roster;
use super::snapshot::{ConnectionPhase, SessionSnapshot};
use crate::credential::IssuedCredential;
use crate::errors::BridgeError;

/// What applying an adapter event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Snapshot updated (possibly to an identical value).
    Applied,
    /// The session ended: remote disconnect (`fatal == false`) or fatal
    /// error (`fatal == true`). The snapshot is reset and the epoch closed.
    SessionEnded { fatal: bool },
    /// Event belongs to an epoch that is no longer open.
    Stale,
    /// Event was malformed.
    Malformed,
}

/// The state machine.
#[derive(Debug, Default)]
pub struct SessionState {
    snapshot: SessionSnapshot,
    /// Epoch whose events are accepted; `None` when no session is open.
    open_epoch: Option<u64>,
    /// Last epoch handed out. Never decreases.
    last_epoch: u64,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn open_epoch(&self) -> Option<u64> {
        self.open_epoch
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.snapshot.connection_phase
    }

    /// Mark a command in flight.
    pub fn begin_command(&mut self) {
        self.snapshot.busy = true;
    }

    /// A join may start unless the previous one is still connecting. The
    /// pending connect is resolved by the adapter (Connected, error or
    /// disconnect) or abandoned with `leave`.
    ///
    /// # Errors
    ///
    /// `BridgeError::Busy` while the open session is `Connecting`.
    pub fn ensure_join_allowed(&self) -> Result<(), BridgeError> {
        if self.open_epoch.is_some() && self.phase() == ConnectionPhase::Connecting {
            return Err(BridgeError::Busy);
        }
        Ok(())
    }

    /// Release the busy guard.
    pub fn end_command(&mut self) {
        self.snapshot.busy = false;
    }

    /// Start of a join attempt: the previous error no longer applies.
    pub fn clear_error(&mut self) {
        self.snapshot.last_error.clear();
    }

    /// A join was rejected before anything was dispatched (validation or
    /// configuration). Only `last_error` changes.
    pub fn reject_join(&mut self, error: &BridgeError) {
        self.snapshot.last_error = error.client_message();
    }

    /// A failure that forces the session down: credential issuance, connect
    /// dispatch or a fatal adapter error. Returns whether a session was open
    /// (and so needs an adapter disconnect).
    pub fn fail_session(&mut self, error: &BridgeError) -> bool {
        let was_open = self.close_session();
        self.snapshot.last_error = error.client_message();
        was_open
    }

    /// Credential issued: open a new epoch and enter `Connecting`.
    /// Returns the new epoch.
    pub fn begin_join(&mut self, issued: IssuedCredential) -> u64 {
        self.last_epoch += 1;
        let epoch = self.last_epoch;
        self.open_epoch = Some(epoch);

        self.snapshot.room_id = issued.room_id;
        self.snapshot.identity = issued.identity;
        self.snapshot.credential = Some(issued.credential);
        self.snapshot.connection_phase = ConnectionPhase::Connecting;
        self.snapshot.is_muted = false;
        self.snapshot.roster.clear();
        self.snapshot.last_error.clear();

        epoch
    }

    /// Optimistic leave: reset to the empty `Disconnected` form and close
    /// the epoch. Returns whether a session was open.
    pub fn leave(&mut self) -> bool {
        let was_open = self.close_session();
        self.snapshot.last_error.clear();
        was_open
    }

    /// Flip `is_muted` locally. Returns the microphone state to request, or
    /// `None` when no session is open.
    pub fn toggle_mute(&mut self) -> Option<bool> {
        if self.open_epoch.is_none() {
            return None;
        }
        self.snapshot.is_muted = !self.snapshot.is_muted;
        Some(!self.snapshot.is_muted)
    }

    /// Apply an adapter event raised for `epoch`.
    pub fn apply_event(&mut self, epoch: u64, event: RoomEvent) -> EventOutcome {
        if matches!(event, RoomEvent::Ignored) {
            return EventOutcome::Malformed;
        }
        if self.open_epoch != Some(epoch) {
            return EventOutcome::Stale;
        }

        match event {
            RoomEvent::StatusChanged { status, roster } => self.apply_status(status, roster),
            RoomEvent::RosterUpdated {
                participants,
                is_muted,
            } => {
                self.apply_roster(&participants);
                if let Some(is_muted) = is_muted {
                    self.snapshot.is_muted = is_muted;
                }
                EventOutcome::Applied
            }
            RoomEvent::LevelsSampled { levels } => {
                roster::apply_levels(&mut self.snapshot.roster, &levels);
                EventOutcome::Applied
            }
            RoomEvent::Fatal { message } => {
                self.fail_session(&BridgeError::AdapterFatal(message));
                EventOutcome::SessionEnded { fatal: true }
            }
            RoomEvent::Ignored => EventOutcome::Malformed,
        }
    }

    fn apply_status(
        &mut self,
        status: RoomStatus,
        roster: Option<Vec<ParticipantReport>>,
    ) -> EventOutcome {
        match status {
            RoomStatus::Connected => {
                self.snapshot.connection_phase = ConnectionPhase::Connected;
                self.snapshot.last_error.clear();
            }
            RoomStatus::Reconnecting => {
                self.snapshot.connection_phase = ConnectionPhase::Reconnecting;
            }
            // Connecting is entered by join only.
            RoomStatus::Connecting => {}
            RoomStatus::Disconnected => {
                self.close_session();
                return EventOutcome::SessionEnded { fatal: false };
            }
        }

        if let Some(participants) = roster {
            self.apply_roster(&participants);
        }
        EventOutcome::Applied
    }

    fn apply_roster(&mut self, participants: &[ParticipantReport]) {
        self.snapshot.roster = roster::reconcile(&self.snapshot.roster, participants);
    }

    /// Reset session fields and close the epoch, keeping `busy` and
    /// `last_error`. Returns whether an epoch was open.
    fn close_session(&mut self) -> bool {
        self.snapshot.reset_session();
        self.open_epoch.take().is_some()
    }
}
