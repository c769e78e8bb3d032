//! Session state synchronization.
//!
//! - [`events`] - typed adapter events and their JSON wire form
//! - [`snapshot`] - the snapshot the presentation layer observes
//! - [`roster`] - roster reconciliation
//! - [`state`] - the transition rules
//! - [`actor`] - the actor that owns the state and drives the adapter

pub mod actor;
pub mod events;
pub mod roster;
pub mod snapshot;
pub mod state;

pub use actor::{SessionActor, SessionHandle, SessionMessage};
pub use events::{ParticipantLevel, ParticipantReport, RoomEvent, RoomStatus};
pub use snapshot::{ConnectionPhase, Participant, SessionSnapshot};
pub use state::{EventOutcome, SessionState};
