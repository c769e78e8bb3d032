//! `RoomAdapter` - owns the live media transport session.
//!
//! # Connect sequence
//!
//! 1. Tear down any existing session (listener, sampler, connection)
//! 2. Connect through the transport; a failure becomes one `Fatal` event
//! 3. Subscribe to transport events
//! 4. Enable the local microphone
//! 5. Push an initial roster
//! 6. Start the audio sampler
//! 7. Re-emit `Connected` if the transport already is, since a status
//!    raised before subscribing is not replayed
//!
//! The listener task and the sampler share a per-session child token; both
//! stop when the session is torn down, when the transport reports the
//! session ended, or when the adapter itself is cancelled.

use super::levels::run_audio_sampler;
use super::transport::{RoomConnection, RoomTransport, TransportEvent};
use super::{AdapterCommand, AdapterEvent};
use crate::credential::Credential;
use crate::errors::BridgeError;
use crate::observability::metrics;
use crate::session::events::{ParticipantReport, RoomEvent, RoomStatus};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Adapter mailbox size.
const ADAPTER_CHANNEL_BUFFER: usize = 64;

/// Handle to the `RoomAdapter`.
#[derive(Clone, Debug)]
pub struct RoomAdapterHandle {
    sender: mpsc::Sender<AdapterCommand>,
    cancel_token: CancellationToken,
}

impl RoomAdapterHandle {
    /// Dispatch a connect for `epoch`. Returns once the command is queued.
    pub async fn connect(
        &self,
        epoch: u64,
        server_url: String,
        credential: Credential,
        identity: String,
    ) -> Result<(), BridgeError> {
        self.send(AdapterCommand::Connect {
            epoch,
            server_url,
            credential,
            identity,
        })
        .await
    }

    /// Dispatch a disconnect.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        self.send(AdapterCommand::Disconnect).await
    }

    /// Dispatch a microphone change.
    pub async fn set_microphone(&self, enabled: bool) -> Result<(), BridgeError> {
        self.send(AdapterCommand::SetMicrophone { enabled }).await
    }

    async fn send(&self, command: AdapterCommand) -> Result<(), BridgeError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| BridgeError::Internal(format!("adapter channel send failed: {e}")))
    }

    /// Cancel the adapter.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the adapter is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The session currently owned by the adapter.
struct ActiveRoom {
    epoch: u64,
    connection: Arc<dyn RoomConnection>,
    session_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// The `RoomAdapter` implementation.
pub struct RoomAdapter {
    transport: Arc<dyn RoomTransport>,
    receiver: mpsc::Receiver<AdapterCommand>,
    events: mpsc::Sender<AdapterEvent>,
    cancel_token: CancellationToken,
    sample_interval: Duration,
    active: Option<ActiveRoom>,
}

impl RoomAdapter {
    /// Spawn the adapter. Events are posted to `events`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        transport: Arc<dyn RoomTransport>,
        events: mpsc::Sender<AdapterEvent>,
        sample_interval: Duration,
        cancel_token: CancellationToken,
    ) -> (RoomAdapterHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ADAPTER_CHANNEL_BUFFER);

        let actor = Self {
            transport,
            receiver,
            events,
            cancel_token: cancel_token.clone(),
            sample_interval,
            active: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomAdapterHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "bridge.adapter")]
    async fn run(mut self) {
        debug!(target: "bridge.adapter", "RoomAdapter started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "bridge.adapter", "RoomAdapter received cancellation signal");
                    break;
                }

                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "bridge.adapter", "RoomAdapter channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        self.teardown().await;
        info!(target: "bridge.adapter", "RoomAdapter stopped");
    }

    async fn handle_command(&mut self, command: AdapterCommand) {
        match command {
            AdapterCommand::Connect {
                epoch,
                server_url,
                credential,
                identity,
            } => {
                self.connect(epoch, &server_url, &credential, &identity)
                    .await;
            }
            AdapterCommand::Disconnect => self.teardown().await,
            AdapterCommand::SetMicrophone { enabled } => self.set_microphone(enabled).await,
        }
    }

    async fn connect(&mut self, epoch: u64, server_url: &str, credential: &Credential, identity: &str) {
        self.teardown().await;

        info!(
            target: "bridge.adapter",
            epoch,
            server_url = %server_url,
            identity = %identity,
            "Connecting to room"
        );

        let started = Instant::now();
        let connection = match self.transport.connect(server_url, credential, identity).await {
            Ok(connection) => {
                metrics::record_transport_connect("success", started.elapsed());
                connection
            }
            Err(e) => {
                metrics::record_transport_connect("error", started.elapsed());
                warn!(target: "bridge.adapter", epoch, error = %e, "Room connect failed");
                self.emit(epoch, RoomEvent::Fatal { message: e.to_string() })
                    .await;
                return;
            }
        };

        let mut transport_events = connection.subscribe();

        if let Err(e) = connection.set_microphone_enabled(true).await {
            let event = ended_before_listening(&mut transport_events)
                .unwrap_or_else(|| RoomEvent::Fatal { message: e.to_string() });
            warn!(target: "bridge.adapter", epoch, error = %e, "Enabling microphone failed");
            connection.disconnect().await;
            self.emit(epoch, event).await;
            return;
        }

        let session_token = self.cancel_token.child_token();

        let listener = tokio::spawn(relay_transport_events(
            epoch,
            Arc::clone(&connection),
            transport_events,
            self.events.clone(),
            session_token.clone(),
        ));

        self.emit(epoch, roster_event(connection.as_ref())).await;

        let sampler = tokio::spawn(run_audio_sampler(
            epoch,
            Arc::clone(&connection),
            self.events.clone(),
            self.sample_interval,
            session_token.clone(),
        ));

        if connection.is_connected() {
            self.emit(epoch, RoomEvent::status(RoomStatus::Connected))
                .await;
        }

        self.active = Some(ActiveRoom {
            epoch,
            connection,
            session_token,
            tasks: vec![listener, sampler],
        });

        info!(target: "bridge.adapter", epoch, "Room session established");
    }

    /// Stop listener and sampler, then disconnect. No-op without a session.
    async fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.session_token.cancel();
        active.connection.disconnect().await;
        for task in active.tasks {
            if let Err(e) = task.await {
                warn!(target: "bridge.adapter", epoch = active.epoch, error = %e, "Session task failed");
            }
        }

        info!(target: "bridge.adapter", epoch = active.epoch, "Room session torn down");
    }

    async fn set_microphone(&mut self, enabled: bool) {
        let Some(active) = &self.active else {
            debug!(target: "bridge.adapter", enabled, "No session, ignoring microphone change");
            return;
        };

        let epoch = active.epoch;
        let connection = Arc::clone(&active.connection);

        if let Err(e) = connection.set_microphone_enabled(enabled).await {
            warn!(target: "bridge.adapter", epoch, enabled, error = %e, "Microphone change failed");
        }

        // Report the actual microphone state whether or not the change took.
        self.emit(epoch, roster_event(connection.as_ref())).await;
    }

    async fn emit(&self, epoch: u64, event: RoomEvent) {
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => {}
            sent = self.events.send(AdapterEvent { epoch, event }) => {
                if sent.is_err() {
                    debug!(target: "bridge.adapter", epoch, "Event receiver dropped");
                }
            }
        }
    }
}

/// Current roster and microphone state as a roster event.
fn roster_event(connection: &dyn RoomConnection) -> RoomEvent {
    let participants = connection
        .participants()
        .into_iter()
        .map(|p| ParticipantReport {
            identity: p.identity,
            is_speaking: p.is_speaking,
            is_local: p.is_local,
            audio_level: Some(p.audio_level),
        })
        .collect();
    RoomEvent::roster(participants, !connection.is_microphone_enabled())
}

/// The terminal event already queued for a session that ended before its
/// listener started, if any.
fn ended_before_listening(
    transport_events: &mut broadcast::Receiver<TransportEvent>,
) -> Option<RoomEvent> {
    loop {
        match transport_events.try_recv() {
            Ok(TransportEvent::Failed { message }) => return Some(RoomEvent::Fatal { message }),
            Ok(TransportEvent::Disconnected) => {
                return Some(RoomEvent::StatusChanged {
                    status: RoomStatus::Disconnected,
                    roster: Some(Vec::new()),
                })
            }
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return None,
        }
    }
}

/// Translate transport events for one session into adapter events.
async fn relay_transport_events(
    epoch: u64,
    connection: Arc<dyn RoomConnection>,
    mut transport_events: broadcast::Receiver<TransportEvent>,
    events: mpsc::Sender<AdapterEvent>,
    session_token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            () = session_token.cancelled() => break,
            received = transport_events.recv() => received,
        };

        let (event, session_over) = match received {
            Ok(TransportEvent::Connected | TransportEvent::Reconnected) => {
                (RoomEvent::status(RoomStatus::Connected), false)
            }
            Ok(TransportEvent::Reconnecting) => {
                (RoomEvent::status(RoomStatus::Reconnecting), false)
            }
            Ok(
                TransportEvent::ParticipantConnected { .. }
                | TransportEvent::ParticipantDisconnected { .. }
                | TransportEvent::ActiveSpeakersChanged
                | TransportEvent::MicrophoneChanged { .. },
            ) => (roster_event(connection.as_ref()), false),
            Ok(TransportEvent::Failed { message }) => (RoomEvent::Fatal { message }, true),
            Ok(TransportEvent::Disconnected) | Err(broadcast::error::RecvError::Closed) => (
                RoomEvent::StatusChanged {
                    status: RoomStatus::Disconnected,
                    roster: Some(Vec::new()),
                },
                true,
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "bridge.adapter", epoch, skipped, "Transport events lagged, pulling roster");
                (roster_event(connection.as_ref()), false)
            }
        };

        let sent = tokio::select! {
            biased;
            () = session_token.cancelled() => break,
            sent = events.send(AdapterEvent { epoch, event }) => sent,
        };

        if session_over {
            debug!(target: "bridge.adapter", epoch, "Transport session ended");
            session_token.cancel();
            break;
        }
        if sent.is_err() {
            break;
        }
    }
}
