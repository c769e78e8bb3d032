//! Scriptable in-memory media transport.
//!
//! [`MockTransport`] records every connect and hands out [`MockConnection`]s
//! that tests drive directly: emit transport events, change the roster and
//! audio levels, or make the microphone fail.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::MockTransport;
//!
//! let transport = MockTransport::new();
//! transport.fail_next_connect("invalid api key");
//!
//! // ... drive a session ...
//!
//! let connection = transport.last_connection().unwrap();
//! connection.emit(TransportEvent::Reconnecting);
//! ```

use async_trait::async_trait;
use room_bridge::adapter::{
    ParticipantSample, RoomConnection, RoomTransport, TransportError, TransportEvent,
};
use room_bridge::credential::Credential;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

/// A recorded `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectCall {
    pub server_url: String,
    pub identity: String,
    /// The raw credential, for verifying its claims.
    pub credential: String,
}

/// Mock media transport.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    gate: watch::Sender<bool>,
}

struct MockTransportInner {
    calls: Vec<ConnectCall>,
    failures: VecDeque<String>,
    connections: Vec<MockConnection>,
    participants: Vec<ParticipantSample>,
    connected_on_connect: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Connects succeed immediately with an already connected session and
    /// an empty roster.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                calls: Vec::new(),
                failures: VecDeque::new(),
                connections: Vec::new(),
                participants: Vec::new(),
                connected_on_connect: true,
            })),
            gate,
        }
    }

    /// Roster every new connection starts with.
    #[must_use]
    pub fn with_participants(self, participants: Vec<ParticipantSample>) -> Self {
        self.inner.lock().unwrap().participants = participants;
        self
    }

    /// New connections start not yet connected; tests raise
    /// `TransportEvent::Connected` themselves.
    #[must_use]
    pub fn connect_pending(self) -> Self {
        self.inner.lock().unwrap().connected_on_connect = false;
        self
    }

    /// The next connect fails with `message`.
    pub fn fail_next_connect(&self, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push_back(message.to_string());
    }

    /// Block connects until [`release_connects`](Self::release_connects).
    pub fn hold_connects(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_connects(&self) {
        self.gate.send_replace(true);
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    #[must_use]
    pub fn connect_calls(&self) -> Vec<ConnectCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Connections handed out so far, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<MockConnection> {
        self.inner.lock().unwrap().connections.clone()
    }

    #[must_use]
    pub fn last_connection(&self) -> Option<MockConnection> {
        self.inner.lock().unwrap().connections.last().cloned()
    }
}

#[async_trait]
impl RoomTransport for MockTransport {
    async fn connect(
        &self,
        server_url: &str,
        credential: &Credential,
        identity: &str,
    ) -> Result<Arc<dyn RoomConnection>, TransportError> {
        self.inner.lock().unwrap().calls.push(ConnectCall {
            server_url: server_url.to_string(),
            identity: identity.to_string(),
            credential: credential.expose().to_string(),
        });

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| TransportError::Closed)?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.failures.pop_front() {
            return Err(TransportError::ConnectFailed(message));
        }

        let connection = MockConnection::new(
            inner.participants.clone(),
            inner.connected_on_connect,
        );
        inner.connections.push(connection.clone());
        Ok(Arc::new(connection))
    }
}

/// A mock live session.
#[derive(Clone)]
pub struct MockConnection {
    events: broadcast::Sender<TransportEvent>,
    state: Arc<Mutex<MockConnectionState>>,
}

struct MockConnectionState {
    connected: bool,
    microphone_enabled: bool,
    participants: Vec<ParticipantSample>,
    microphone_calls: Vec<bool>,
    microphone_failure: Option<String>,
    disconnects: usize,
}

impl MockConnection {
    fn new(participants: Vec<ParticipantSample>, connected: bool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            state: Arc::new(Mutex::new(MockConnectionState {
                connected,
                microphone_enabled: false,
                participants,
                microphone_calls: Vec::new(),
                microphone_failure: None,
                disconnects: 0,
            })),
        }
    }

    /// Raise a transport event. `Connected`, `Reconnected` and
    /// `Disconnected` also update the connected flag.
    pub fn emit(&self, event: TransportEvent) {
        {
            let mut state = self.state.lock().unwrap();
            match &event {
                TransportEvent::Connected | TransportEvent::Reconnected => state.connected = true,
                TransportEvent::Disconnected | TransportEvent::Failed { .. } => {
                    state.connected = false;
                }
                _ => {}
            }
        }
        let _ = self.events.send(event);
    }

    /// Replace the roster without raising an event.
    pub fn set_participants(&self, participants: Vec<ParticipantSample>) {
        self.state.lock().unwrap().participants = participants;
    }

    /// Set one participant's raw audio level.
    pub fn set_audio_level(&self, identity: &str, level: f32) {
        let mut state = self.state.lock().unwrap();
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.identity == identity)
        {
            participant.audio_level = level;
        }
    }

    /// Make every later microphone change fail with `message`.
    pub fn fail_microphone(&self, message: &str) {
        self.state.lock().unwrap().microphone_failure = Some(message.to_string());
    }

    /// Every `set_microphone_enabled` argument, in call order.
    #[must_use]
    pub fn microphone_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().microphone_calls.clone()
    }

    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl RoomConnection for MockConnection {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn participants(&self) -> Vec<ParticipantSample> {
        self.state.lock().unwrap().participants.clone()
    }

    fn is_microphone_enabled(&self) -> bool {
        self.state.lock().unwrap().microphone_enabled
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.microphone_calls.push(enabled);
        if let Some(message) = &state.microphone_failure {
            return Err(TransportError::Microphone(message.clone()));
        }
        state.microphone_enabled = enabled;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.disconnects += 1;
    }
}
