//! Room Bridge
//!
//! Keeps a backend view of one user's audio room session in sync with a
//! real-time media transport, and serves it over HTTP.
//!
//! # Architecture
//!
//! ```text
//! HTTP handlers ──commands──▶ SessionActor ──AdapterCommand──▶ RoomAdapter
//!       ▲                          │    ▲                          │
//!       └──── watch<Snapshot> ─────┘    └──── AdapterEvent ────────┘
//!                                                                  │
//!                                             RoomTransport (RelayTransport)
//!                                                                  │
//!                                          room client (SSE + POST reports)
//! ```
//!
//! - The session actor owns the only mutable session snapshot and applies
//!   the transition rules in [`session::state`].
//! - The adapter actor owns the transport session, translates transport
//!   events into room events and samples audio levels while connected.
//! - Every event carries the epoch of the connect that produced it; events
//!   from superseded connects are dropped.
//!
//! # Modules
//!
//! - [`adapter`] - room session adapter and the transport boundary
//! - [`config`] - service configuration from environment
//! - [`credential`] - room credential issuance
//! - [`errors`] - error taxonomy and HTTP error envelope
//! - [`handlers`] / [`routes`] - HTTP surface
//! - [`observability`] - metrics and health probes
//! - [`relay`] - transport backed by a remote room client
//! - [`session`] - session state and the session actor
//! - [`settings`] - room service settings and their persistence

pub mod adapter;
pub mod config;
pub mod credential;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod relay;
pub mod routes;
pub mod session;
pub mod settings;
