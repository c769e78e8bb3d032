//! Room Session Adapter.
//!
//! Owns the single live connection to the media transport. Commands arrive
//! on the adapter's mailbox and are fire-and-forget from the caller's side;
//! every outcome, including connect failures, surfaces as an
//! [`AdapterEvent`] tagged with the epoch of the connect it belongs to.
//!
//! ```text
//! SessionActor ──AdapterCommand──▶ RoomAdapter ──▶ RoomTransport
//!      ▲                               │
//!      └─────────AdapterEvent──────────┘ (listener task, audio sampler)
//! ```

pub mod actor;
pub mod levels;
pub mod transport;

pub use actor::{RoomAdapter, RoomAdapterHandle};
pub use transport::{
    ParticipantSample, RoomConnection, RoomTransport, TransportError, TransportEvent,
};

use crate::credential::Credential;
use crate::session::events::RoomEvent;

/// An event raised by the adapter for the session started by connect
/// attempt `epoch`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterEvent {
    pub epoch: u64,
    pub event: RoomEvent,
}

/// Commands accepted by the adapter.
#[derive(Debug)]
pub enum AdapterCommand {
    /// Tear down any current session, then connect.
    Connect {
        epoch: u64,
        server_url: String,
        credential: Credential,
        identity: String,
    },
    /// Tear down the current session. No-op without one.
    Disconnect,
    /// Enable or disable the local microphone. No-op without a session.
    SetMicrophone { enabled: bool },
}
