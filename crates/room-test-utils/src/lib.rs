//! # Room Test Utilities
//!
//! Mocks and fixtures for exercising the Room Bridge session and adapter
//! actors without a media server.
//!
//! - [`mock_transport`] - scriptable in-memory [`RoomTransport`]
//! - [`fixtures`] - settings, participants and a spawned session harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = MockTransport::new()
//!         .with_participants(vec![participant("alice", true, false, 0.0)]);
//!     let harness = SessionHarness::spawn(transport.clone(), complete_settings());
//!
//!     harness.handle.join("alice", "lobby").await.unwrap();
//!     harness.wait_for(|s| s.connection_phase == ConnectionPhase::Connected).await;
//!
//!     assert_eq!(transport.connect_count(), 1);
//! }
//! ```
//!
//! [`RoomTransport`]: room_bridge::adapter::RoomTransport

pub mod fixtures;
pub mod mock_transport;

pub use fixtures::*;
pub use mock_transport::{ConnectCall, MockConnection, MockTransport};
