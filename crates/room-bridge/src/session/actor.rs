//! `SessionActor` - single owner of the session snapshot.
//!
//! Commands (join, leave, toggle mute) arrive on the actor mailbox; adapter
//! events arrive on a second channel. Both are handled by one loop, so an
//! event is never applied in the middle of a command. Every snapshot change
//! is published on a `watch` channel.
//!
//! # Lifecycle
//!
//! 1. `SessionActor::spawn` starts the actor and its `RoomAdapter`
//! 2. Runs until cancelled or every handle is dropped
//! 3. The adapter is cancelled through a child token and awaited on exit

use super::events::RoomEvent;
use super::snapshot::SessionSnapshot;
use super::state::{EventOutcome, SessionState};
use crate::adapter::{AdapterEvent, RoomAdapter, RoomAdapterHandle, RoomTransport};
use crate::credential::{CredentialError, CredentialIssuer};
use crate::errors::BridgeError;
use crate::observability::metrics;
use crate::settings::RoomServiceSettings;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Session mailbox size.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Adapter event channel size. Sized for bursts of roster and level events.
const ADAPTER_EVENT_BUFFER: usize = 256;

/// Messages accepted by the `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    Join {
        identity: String,
        room_id: String,
        respond_to: oneshot::Sender<Result<SessionSnapshot, BridgeError>>,
    },
    Leave {
        respond_to: oneshot::Sender<Result<SessionSnapshot, BridgeError>>,
    },
    ToggleMute {
        respond_to: oneshot::Sender<Result<SessionSnapshot, BridgeError>>,
    },
}

/// Handle to the `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    /// Join `room_id` as `identity`.
    ///
    /// Returns once the connect is dispatched, not once it is established.
    /// Validation and configuration failures are returned here and also
    /// recorded in the snapshot's `last_error`. A join issued while the
    /// previous one is still connecting is refused with `BridgeError::Busy`.
    pub async fn join(&self, identity: &str, room_id: &str) -> Result<SessionSnapshot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Join {
            identity: identity.to_string(),
            room_id: room_id.to_string(),
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Leave the room. Also abandons a join that is still connecting.
    pub async fn leave(&self) -> Result<SessionSnapshot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Leave { respond_to: tx }).await?;
        Self::receive(rx).await?
    }

    /// Flip the local mute flag and dispatch the microphone change.
    pub async fn toggle_mute(&self) -> Result<SessionSnapshot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::ToggleMute { respond_to: tx })
            .await?;
        Self::receive(rx).await?
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver observing every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Cancel the session actor (and its adapter).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: SessionMessage) -> Result<(), BridgeError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| BridgeError::Internal(format!("session channel send failed: {e}")))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, BridgeError> {
        rx.await
            .map_err(|e| BridgeError::Internal(format!("session response receive failed: {e}")))
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionMessage>,
    adapter_events: mpsc::Receiver<AdapterEvent>,
    adapter: RoomAdapterHandle,
    adapter_task: Option<JoinHandle<()>>,
    issuer: CredentialIssuer,
    settings: watch::Receiver<RoomServiceSettings>,
    state: SessionState,
    publisher: watch::Sender<SessionSnapshot>,
    cancel_token: CancellationToken,
}

impl SessionActor {
    /// Spawn the session actor and its adapter.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        transport: Arc<dyn RoomTransport>,
        settings: watch::Receiver<RoomServiceSettings>,
        issuer: CredentialIssuer,
        sample_interval: Duration,
        cancel_token: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events_tx, adapter_events) = mpsc::channel(ADAPTER_EVENT_BUFFER);
        let (publisher, snapshot) = watch::channel(SessionSnapshot::default());

        let (adapter, adapter_task) = RoomAdapter::spawn(
            transport,
            events_tx,
            sample_interval,
            cancel_token.child_token(),
        );

        let actor = Self {
            receiver,
            adapter_events,
            adapter,
            adapter_task: Some(adapter_task),
            issuer,
            settings,
            state: SessionState::new(),
            publisher,
            cancel_token: cancel_token.clone(),
        };

        metrics::set_session_phase(actor.state.phase());
        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            snapshot,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "bridge.session")]
    async fn run(mut self) {
        debug!(target: "bridge.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "bridge.session", "SessionActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!(target: "bridge.session", "SessionActor channel closed, exiting");
                            break;
                        }
                    }
                }

                Some(event) = self.adapter_events.recv() => {
                    self.handle_adapter_event(event).await;
                }
            }
        }

        self.adapter.cancel();
        if let Some(task) = self.adapter_task.take() {
            if let Err(e) = task.await {
                warn!(target: "bridge.session", error = %e, "RoomAdapter task failed");
            }
        }

        info!(target: "bridge.session", "SessionActor stopped");
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                identity,
                room_id,
                respond_to,
            } => {
                let result = match self.state.ensure_join_allowed() {
                    Ok(()) => {
                        self.begin_command();
                        let outcome = self.join(identity, room_id).await;
                        self.finish_command(outcome)
                    }
                    Err(e) => {
                        debug!(
                            target: "bridge.session",
                            open_epoch = ?self.state.open_epoch(),
                            "Rejecting join while a connect is pending"
                        );
                        metrics::record_join_attempt("busy");
                        Err(e)
                    }
                };
                let _ = respond_to.send(result);
            }
            SessionMessage::Leave { respond_to } => {
                self.begin_command();
                self.leave().await;
                let _ = respond_to.send(self.finish_command(Ok(())));
            }
            SessionMessage::ToggleMute { respond_to } => {
                self.begin_command();
                let outcome = self.toggle_mute().await;
                let _ = respond_to.send(self.finish_command(outcome));
            }
        }
    }

    /// Publish the command as in flight.
    fn begin_command(&mut self) {
        self.state.begin_command();
        self.publish();
    }

    /// Clear the in-flight flag on every exit path and publish the result.
    fn finish_command(
        &mut self,
        outcome: Result<(), BridgeError>,
    ) -> Result<SessionSnapshot, BridgeError> {
        self.state.end_command();
        self.publish();
        outcome.map(|()| self.state.snapshot().clone())
    }

    async fn join(&mut self, identity: String, room_id: String) -> Result<(), BridgeError> {
        self.state.clear_error();

        let settings = self.settings.borrow().clone();
        let issued = match self.issuer.issue(&identity, &room_id, &settings) {
            Ok(issued) => issued,
            Err(err @ (CredentialError::Validation | CredentialError::Configuration(_))) => {
                let outcome = if matches!(err, CredentialError::Validation) {
                    "validation_error"
                } else {
                    "configuration_error"
                };
                debug!(target: "bridge.session", error = %err, "Join rejected");
                metrics::record_join_attempt(outcome);
                let err = BridgeError::from(err);
                self.state.reject_join(&err);
                return Err(err);
            }
            Err(err @ CredentialError::Signing(_)) => {
                error!(target: "bridge.session", error = %err, "Credential issuance failed");
                metrics::record_join_attempt("issuance_error");
                let err = BridgeError::from(err);
                if self.state.fail_session(&err) {
                    self.dispatch_disconnect().await;
                }
                return Err(err);
            }
        };

        let server_url = issued.server_url.clone();
        let identity = issued.identity.clone();
        let room_id = issued.room_id.clone();
        let credential = issued.credential.clone();
        let epoch = self.state.begin_join(issued);

        if let Err(err) = self
            .adapter
            .connect(epoch, server_url, credential, identity.clone())
            .await
        {
            error!(target: "bridge.session", epoch, error = %err, "Connect dispatch failed");
            metrics::record_join_attempt("dispatch_error");
            self.state.fail_session(&err);
            return Err(err);
        }

        metrics::record_join_attempt("dispatched");
        info!(
            target: "bridge.session",
            epoch,
            room = %room_id,
            identity = %identity,
            "Join dispatched"
        );
        Ok(())
    }

    async fn leave(&mut self) {
        let epoch = self.state.open_epoch();
        self.dispatch_disconnect().await;
        self.state.leave();

        info!(target: "bridge.session", epoch = ?epoch, "Left room");
    }

    async fn toggle_mute(&mut self) -> Result<(), BridgeError> {
        let Some(enabled) = self.state.toggle_mute() else {
            debug!(target: "bridge.session", "No session, ignoring mute toggle");
            return Ok(());
        };

        debug!(target: "bridge.session", microphone_enabled = enabled, "Toggling microphone");
        self.adapter.set_microphone(enabled).await
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) {
        let kind = event.event.kind();
        metrics::record_adapter_event(kind);

        let fatal_message = match &event.event {
            RoomEvent::Fatal { message } => Some(message.clone()),
            _ => None,
        };

        match self.state.apply_event(event.epoch, event.event) {
            EventOutcome::Applied => {
                debug!(
                    target: "bridge.session",
                    epoch = event.epoch,
                    kind,
                    phase = self.state.phase().as_str(),
                    "Applied adapter event"
                );
            }
            EventOutcome::SessionEnded { fatal } => {
                if fatal {
                    warn!(
                        target: "bridge.session",
                        epoch = event.epoch,
                        error = fatal_message.as_deref().unwrap_or_default(),
                        "Room session failed"
                    );
                } else {
                    info!(target: "bridge.session", epoch = event.epoch, "Room session ended remotely");
                }
                // Make sure the adapter drops the session and its sampler.
                self.dispatch_disconnect().await;
            }
            EventOutcome::Stale => {
                debug!(
                    target: "bridge.session",
                    epoch = event.epoch,
                    open_epoch = ?self.state.open_epoch(),
                    kind,
                    "Dropping stale adapter event"
                );
                metrics::record_event_dropped("stale_epoch");
            }
            EventOutcome::Malformed => {
                debug!(target: "bridge.session", epoch = event.epoch, "Dropping malformed adapter event");
                metrics::record_event_dropped("malformed");
            }
        }

        self.publish();
    }

    async fn dispatch_disconnect(&self) {
        if let Err(e) = self.adapter.disconnect().await {
            warn!(target: "bridge.session", error = %e, "Disconnect dispatch failed");
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        metrics::set_session_phase(snapshot.connection_phase);
        self.publisher.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                current.clone_from(snapshot);
                true
            }
        });
    }
}
