//! Relay transport: the media session lives in a remote room client (a
//! browser running the media SDK) and is driven over HTTP.
//!
//! - Commands for the room client are published on a broadcast channel and
//!   streamed to it as Server-Sent Events.
//! - The room client posts reports back, tagged with the connection id it
//!   was given in `connect`. Reports use the room event wire shapes; a
//!   participant entry may carry a raw `audio_level`, and a `levels` report
//!   carries raw levels only.
//!
//! The relay keeps the latest reported roster, microphone state and raw
//! levels, and derives [`TransportEvent`]s from the differences between
//! successive reports.

use crate::adapter::transport::{
    ParticipantSample, RoomConnection, RoomTransport, TransportError, TransportEvent,
};
use crate::adapter::levels::clamp_level;
use crate::credential::Credential;
use crate::observability::metrics;
use crate::session::events::{ParticipantLevel, ParticipantReport, RoomEvent, RoomStatus};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Command channel size.
const COMMAND_BUFFER: usize = 64;

/// Transport event channel size per connection.
const EVENT_BUFFER: usize = 64;

/// Error reported when no room client is listening for commands.
pub const NO_ROOM_CLIENT_MESSAGE: &str = "No room client is attached";

/// A command for the room client.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RelayCommand {
    Connect {
        connection_id: String,
        url: String,
        token: String,
        identity: String,
    },
    Disconnect {
        connection_id: String,
    },
    SetMicrophone {
        connection_id: String,
        enabled: bool,
    },
}

impl RelayCommand {
    /// SSE event name for this command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            RelayCommand::Connect { .. } => "connect",
            RelayCommand::Disconnect { .. } => "disconnect",
            RelayCommand::SetMicrophone { .. } => "set_microphone",
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        match self {
            RelayCommand::Connect { connection_id, .. }
            | RelayCommand::Disconnect { connection_id }
            | RelayCommand::SetMicrophone { connection_id, .. } => connection_id,
        }
    }
}

/// Custom Debug implementation that redacts the room token.
impl fmt::Debug for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayCommand::Connect {
                connection_id,
                url,
                identity,
                ..
            } => f
                .debug_struct("Connect")
                .field("connection_id", connection_id)
                .field("url", url)
                .field("token", &"[REDACTED]")
                .field("identity", identity)
                .finish(),
            RelayCommand::Disconnect { connection_id } => f
                .debug_struct("Disconnect")
                .field("connection_id", connection_id)
                .finish(),
            RelayCommand::SetMicrophone {
                connection_id,
                enabled,
            } => f
                .debug_struct("SetMicrophone")
                .field("connection_id", connection_id)
                .field("enabled", enabled)
                .finish(),
        }
    }
}

/// What happened to a posted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied,
    /// The report names a connection that is not the current one.
    UnknownConnection,
    Malformed,
}

/// [`RoomTransport`] backed by a remote room client.
pub struct RelayTransport {
    commands: broadcast::Sender<RelayCommand>,
    current: Mutex<Option<Arc<RelayConnection>>>,
    connect_timeout: Duration,
}

impl RelayTransport {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        let (commands, _) = broadcast::channel(COMMAND_BUFFER);
        Self {
            commands,
            current: Mutex::new(None),
            connect_timeout,
        }
    }

    /// Command stream for a room client.
    #[must_use]
    pub fn subscribe_commands(&self) -> broadcast::Receiver<RelayCommand> {
        self.commands.subscribe()
    }

    /// Whether any room client is listening for commands.
    #[must_use]
    pub fn has_room_client(&self) -> bool {
        self.commands.receiver_count() > 0
    }

    /// Id of the connection reports are currently accepted for.
    #[must_use]
    pub fn current_connection_id(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .filter(|connection| !connection.is_closed())
            .map(|connection| connection.connection_id.clone())
    }

    /// Apply a report posted by the room client.
    pub fn report(&self, connection_id: &str, body: &str) -> ReportOutcome {
        let event = RoomEvent::from_json(body);
        if event == RoomEvent::Ignored {
            debug!(target: "bridge.relay", connection_id = %connection_id, "Ignoring malformed report");
            metrics::record_event_dropped("malformed");
            return ReportOutcome::Malformed;
        }

        let kind = event.kind();
        let connection = self
            .current
            .lock()
            .as_ref()
            .filter(|connection| connection.connection_id == connection_id)
            .cloned();

        let outcome = match connection {
            Some(connection) => connection.apply(event),
            None => ReportOutcome::UnknownConnection,
        };

        if outcome == ReportOutcome::UnknownConnection {
            debug!(
                target: "bridge.relay",
                connection_id = %connection_id,
                kind,
                "Dropping report for unknown connection"
            );
            metrics::record_event_dropped("unknown_connection");
        }

        outcome
    }

    fn clear_current(&self, connection_id: &str) {
        let mut current = self.current.lock();
        if current
            .as_ref()
            .is_some_and(|connection| connection.connection_id == connection_id)
        {
            *current = None;
        }
    }
}

#[async_trait]
impl RoomTransport for RelayTransport {
    async fn connect(
        &self,
        server_url: &str,
        credential: &Credential,
        identity: &str,
    ) -> Result<Arc<dyn RoomConnection>, TransportError> {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (ready_tx, ready_rx) = oneshot::channel();
        let connection = Arc::new(RelayConnection::new(
            connection_id.clone(),
            self.commands.clone(),
            ready_tx,
        ));

        let previous = self.current.lock().replace(Arc::clone(&connection));
        if let Some(previous) = previous {
            previous.disconnect().await;
        }

        let command = RelayCommand::Connect {
            connection_id: connection_id.clone(),
            url: server_url.to_string(),
            token: credential.expose().to_string(),
            identity: identity.to_string(),
        };
        if self.commands.send(command).is_err() {
            warn!(target: "bridge.relay", "Connect requested with no room client attached");
            self.clear_current(&connection_id);
            return Err(TransportError::ConnectFailed(NO_ROOM_CLIENT_MESSAGE.to_string()));
        }

        debug!(target: "bridge.relay", connection_id = %connection_id, "Waiting for room client");

        match tokio::time::timeout(self.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                info!(target: "bridge.relay", connection_id = %connection_id, "Room client connected");
                Ok(connection as Arc<dyn RoomConnection>)
            }
            Ok(Ok(Err(message))) => {
                self.clear_current(&connection_id);
                Err(TransportError::ConnectFailed(message))
            }
            Ok(Err(_)) => {
                self.clear_current(&connection_id);
                Err(TransportError::Closed)
            }
            Err(_) => {
                warn!(target: "bridge.relay", connection_id = %connection_id, "Room client connect timed out");
                connection.disconnect().await;
                self.clear_current(&connection_id);
                Err(TransportError::Timeout)
            }
        }
    }
}

#[derive(Default)]
struct RelayState {
    connected: bool,
    reconnecting: bool,
    closed: bool,
    microphone_enabled: bool,
    participants: Vec<ParticipantSample>,
    pending: Option<oneshot::Sender<Result<(), String>>>,
    /// Terminal event raised before anyone subscribed. Replayed to the
    /// first subscriber.
    unheard_terminal: Option<TransportEvent>,
}

/// One room client session.
pub struct RelayConnection {
    connection_id: String,
    commands: broadcast::Sender<RelayCommand>,
    events: broadcast::Sender<TransportEvent>,
    state: Mutex<RelayState>,
}

impl RelayConnection {
    fn new(
        connection_id: String,
        commands: broadcast::Sender<RelayCommand>,
        ready: oneshot::Sender<Result<(), String>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            connection_id,
            commands,
            events,
            state: Mutex::new(RelayState {
                pending: Some(ready),
                ..RelayState::default()
            }),
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn apply(&self, event: RoomEvent) -> ReportOutcome {
        let mut raised = Vec::new();
        let mut state = self.state.lock();
        if state.closed {
            return ReportOutcome::UnknownConnection;
        }

        match event {
            RoomEvent::StatusChanged { status, roster } => {
                if status != RoomStatus::Disconnected {
                    if let Some(roster) = roster {
                        merge_roster(&mut state, &roster, &mut raised);
                    }
                }
                apply_status(&mut state, status, &mut raised);
            }
            RoomEvent::RosterUpdated {
                participants,
                is_muted,
            } => {
                merge_roster(&mut state, &participants, &mut raised);
                if let Some(is_muted) = is_muted {
                    let enabled = !is_muted;
                    if state.microphone_enabled != enabled {
                        state.microphone_enabled = enabled;
                        raised.push(TransportEvent::MicrophoneChanged { enabled });
                    }
                }
            }
            RoomEvent::LevelsSampled { levels } => apply_raw_levels(&mut state, &levels),
            RoomEvent::Fatal { message } => {
                state.closed = true;
                state.connected = false;
                match state.pending.take() {
                    Some(ready) => {
                        let _ = ready.send(Err(message));
                    }
                    None => raised.push(TransportEvent::Failed { message }),
                }
            }
            RoomEvent::Ignored => return ReportOutcome::Malformed,
        }

        // Sent under the lock so `subscribe` cannot slip in between a
        // failed send and buffering it.
        for event in raised {
            if let Err(broadcast::error::SendError(event)) = self.events.send(event) {
                if is_terminal(&event) {
                    state.unheard_terminal = Some(event);
                }
            }
        }
        ReportOutcome::Applied
    }
}

fn is_terminal(event: &TransportEvent) -> bool {
    matches!(
        event,
        TransportEvent::Failed { .. } | TransportEvent::Disconnected
    )
}

fn apply_status(state: &mut RelayState, status: RoomStatus, raised: &mut Vec<TransportEvent>) {
    match status {
        RoomStatus::Connected => {
            let was_connected = state.connected;
            state.connected = true;
            if let Some(ready) = state.pending.take() {
                let _ = ready.send(Ok(()));
            }
            if state.reconnecting {
                state.reconnecting = false;
                raised.push(TransportEvent::Reconnected);
            } else if !was_connected {
                raised.push(TransportEvent::Connected);
            }
        }
        RoomStatus::Reconnecting => {
            state.reconnecting = true;
            raised.push(TransportEvent::Reconnecting);
        }
        RoomStatus::Connecting => {}
        RoomStatus::Disconnected => {
            state.connected = false;
            state.reconnecting = false;
            state.closed = true;
            state.participants.clear();
            if let Some(ready) = state.pending.take() {
                let _ = ready.send(Err("Room client disconnected".to_string()));
            }
            raised.push(TransportEvent::Disconnected);
        }
    }
}

/// Replace the stored roster, raising membership or speaker events for what
/// changed. A missing raw level keeps the previous one.
fn merge_roster(
    state: &mut RelayState,
    reports: &[ParticipantReport],
    raised: &mut Vec<TransportEvent>,
) {
    let mut seen = HashSet::new();
    let mut next = Vec::with_capacity(reports.len());
    for report in reports {
        let identity = report.identity.trim();
        if identity.is_empty() || !seen.insert(identity.to_string()) {
            continue;
        }
        let previous = state.participants.iter().find(|p| p.identity == identity);
        let audio_level = report
            .audio_level
            .map(clamp_level)
            .or_else(|| previous.map(|p| p.audio_level))
            .unwrap_or(0.0);
        next.push(ParticipantSample {
            identity: identity.to_string(),
            is_local: report.is_local,
            is_speaking: report.is_speaking,
            audio_level,
        });
    }

    let mut membership_changed = false;
    for participant in &next {
        if !state.participants.iter().any(|p| p.identity == participant.identity) {
            membership_changed = true;
            raised.push(TransportEvent::ParticipantConnected {
                identity: participant.identity.clone(),
            });
        }
    }
    for participant in &state.participants {
        if !next.iter().any(|p| p.identity == participant.identity) {
            membership_changed = true;
            raised.push(TransportEvent::ParticipantDisconnected {
                identity: participant.identity.clone(),
            });
        }
    }

    let speakers_changed = next.iter().any(|p| {
        state
            .participants
            .iter()
            .find(|q| q.identity == p.identity)
            .is_some_and(|q| q.is_speaking != p.is_speaking || q.is_local != p.is_local)
    });
    if !membership_changed && speakers_changed {
        raised.push(TransportEvent::ActiveSpeakersChanged);
    }

    state.participants = next;
}

fn apply_raw_levels(state: &mut RelayState, levels: &[ParticipantLevel]) {
    for sample in levels {
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.identity == sample.identity)
        {
            participant.audio_level = clamp_level(sample.level);
        }
    }
}

#[async_trait]
impl RoomConnection for RelayConnection {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        let mut state = self.state.lock();
        let receiver = self.events.subscribe();
        if let Some(event) = state.unheard_terminal.take() {
            let _ = self.events.send(event);
        }
        receiver
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.connected && !state.closed
    }

    fn participants(&self) -> Vec<ParticipantSample> {
        self.state.lock().participants.clone()
    }

    fn is_microphone_enabled(&self) -> bool {
        self.state.lock().microphone_enabled
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let command = RelayCommand::SetMicrophone {
            connection_id: self.connection_id.clone(),
            enabled,
        };
        if self.commands.send(command).is_err() {
            return Err(TransportError::Microphone(NO_ROOM_CLIENT_MESSAGE.to_string()));
        }

        // The room client applies the change; its next report confirms it.
        self.state.lock().microphone_enabled = enabled;
        Ok(())
    }

    async fn disconnect(&self) {
        let already_closed = {
            let mut state = self.state.lock();
            let already_closed = state.closed;
            state.closed = true;
            state.connected = false;
            state.reconnecting = false;
            state.pending = None;
            already_closed
        };

        if !already_closed {
            let _ = self.commands.send(RelayCommand::Disconnect {
                connection_id: self.connection_id.clone(),
            });
            debug!(target: "bridge.relay", connection_id = %self.connection_id, "Room client disconnect sent");
        }
    }
}
