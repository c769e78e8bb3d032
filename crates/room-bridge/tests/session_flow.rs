//! Session actor and adapter driven end to end over a mock transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::jwt::verify_room_token;
use room_bridge::adapter::TransportEvent;
use room_bridge::errors::{BridgeError, CONFIGURATION_MESSAGE, VALIDATION_MESSAGE};
use room_bridge::session::{ConnectionPhase, SessionSnapshot};
use room_test_utils::*;
use std::time::Duration;

/// Poll `condition` until it holds, failing the test after [`WAIT_TIMEOUT`].
async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn connected(snapshot: &SessionSnapshot) -> bool {
    snapshot.connection_phase == ConnectionPhase::Connected
}

fn local_alice() -> Vec<room_bridge::adapter::ParticipantSample> {
    vec![participant("alice", true, false, 0.0)]
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_dispatches_one_connect_and_reaches_connected() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    let snapshot = harness.handle.join("alice", "lobby").await.unwrap();
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connecting);
    assert_eq!(snapshot.room_id, "lobby");
    assert_eq!(snapshot.identity, "alice");
    assert!(snapshot.credential.is_some());
    assert!(snapshot.last_error.is_empty());
    assert!(!snapshot.busy);

    let snapshot = harness.wait_for(connected).await;
    assert_eq!(snapshot.roster.len(), 1);
    assert!(snapshot.roster[0].is_local);
    assert!(!snapshot.is_muted);

    let calls = transport.connect_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].server_url, TEST_SERVER_URL);
    assert_eq!(calls[0].identity, "alice");

    let claims = verify_room_token(&calls[0].credential, TEST_API_SECRET.as_bytes()).unwrap();
    assert!(claims.grants_join("lobby", "alice"));
    assert_eq!(claims.iss, TEST_API_KEY);

    // The adapter enables the microphone as part of connecting.
    assert_eq!(transport.last_connection().unwrap().microphone_calls(), vec![true]);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_join_with_blank_inputs_never_connects() {
    let transport = MockTransport::new();
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    let err = harness.handle.join("   ", "lobby").await.unwrap_err();
    assert!(matches!(err, BridgeError::Validation(_)));
    assert_eq!(err.client_message(), VALIDATION_MESSAGE);

    let err = harness.handle.join("alice", "").await.unwrap_err();
    assert_eq!(err.client_message(), VALIDATION_MESSAGE);

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
    assert_eq!(snapshot.last_error, VALIDATION_MESSAGE);
    assert!(!snapshot.busy);
    assert_eq!(transport.connect_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_join_without_server_url_reports_configuration_error() {
    let transport = MockTransport::new();
    let harness = SessionHarness::spawn(transport.clone(), settings_without_server_url());

    let err = harness.handle.join("alice", "lobby").await.unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.last_error, CONFIGURATION_MESSAGE);
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
    assert_eq!(transport.connect_count(), 0);

    // Settings are read at each join.
    harness.settings.send_replace(complete_settings());
    let snapshot = harness.handle.join("alice", "lobby").await.unwrap();
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connecting);
    assert!(snapshot.last_error.is_empty());
    harness.wait_for(connected).await;
    assert_eq!(transport.connect_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_failure_surfaces_transport_message() {
    let transport = MockTransport::new();
    transport.fail_next_connect("invalid api key");
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    let snapshot = harness
        .wait_for(|s| s.last_error == "invalid api key")
        .await;

    assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
    assert!(snapshot.room_id.is_empty());
    assert!(snapshot.credential.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_rejoin_supersedes_previous_session() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let first = transport.last_connection().unwrap();

    harness.handle.join("alice", "stage").await.unwrap();
    let snapshot = harness
        .wait_for(|s| s.room_id == "stage" && connected(s))
        .await;
    assert_eq!(snapshot.roster.len(), 1);
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(first.disconnect_count(), 1);

    // The first session's listener is gone; its events go nowhere.
    first.emit(TransportEvent::Disconnected);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.room_id, "stage");
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connected);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_join_is_refused_while_connecting() {
    let transport = MockTransport::new().with_participants(local_alice());
    transport.hold_connects();
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    let (first, second) = tokio::join!(
        harness.handle.join("alice", "lobby"),
        harness.handle.join("alice", "stage")
    );
    assert_eq!(first.unwrap().room_id, "lobby");
    assert_eq!(second.unwrap_err(), BridgeError::Busy);

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.room_id, "lobby");
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connecting);
    assert!(snapshot.last_error.is_empty());
    assert!(!snapshot.busy);

    // Once the pending connect resolves, joining is possible again.
    transport.release_connects();
    harness.wait_for(connected).await;
    harness.handle.join("alice", "stage").await.unwrap();
    harness
        .wait_for(|s| s.room_id == "stage" && connected(s))
        .await;
    assert_eq!(transport.connect_count(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_leave_releases_pending_join() {
    let transport = MockTransport::new().with_participants(local_alice());
    transport.hold_connects();
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    assert_eq!(
        harness.handle.join("alice", "lobby").await.unwrap_err(),
        BridgeError::Busy
    );

    harness.handle.leave().await.unwrap();
    let snapshot = harness.handle.join("alice", "stage").await.unwrap();
    assert_eq!(snapshot.room_id, "stage");
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connecting);

    transport.release_connects();
    harness
        .wait_for(|s| s.room_id == "stage" && connected(s))
        .await;

    harness.shutdown().await;
}

// ============================================================================
// Session events
// ============================================================================

#[tokio::test]
async fn test_roster_follows_transport_membership() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();

    connection.set_participants(vec![
        participant("alice", true, false, 0.0),
        participant("bob", false, true, 0.0),
    ]);
    connection.emit(TransportEvent::ParticipantConnected {
        identity: "bob".to_string(),
    });

    let snapshot = harness.wait_for(|s| s.roster.len() == 2).await;
    assert_eq!(snapshot.roster[0].identity, "alice");
    assert_eq!(snapshot.roster[1].identity, "bob");
    assert!(snapshot.roster[1].is_speaking);
    assert!(!snapshot.roster[1].is_local);

    connection.set_participants(local_alice());
    connection.emit(TransportEvent::ParticipantDisconnected {
        identity: "bob".to_string(),
    });
    harness.wait_for(|s| s.roster.len() == 1).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_cycle() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();

    connection.emit(TransportEvent::Reconnecting);
    let snapshot = harness
        .wait_for(|s| s.connection_phase == ConnectionPhase::Reconnecting)
        .await;
    assert_eq!(snapshot.room_id, "lobby");

    connection.emit(TransportEvent::Reconnected);
    harness.wait_for(connected).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_remote_disconnect_resets_session() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;

    transport
        .last_connection()
        .unwrap()
        .emit(TransportEvent::Disconnected);

    let snapshot = harness
        .wait_for(|s| s.connection_phase == ConnectionPhase::Disconnected)
        .await;
    assert!(snapshot.roster.is_empty());
    assert!(snapshot.room_id.is_empty());
    assert!(snapshot.credential.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_transport_failure_resets_session_and_keeps_message() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();

    connection.emit(TransportEvent::Failed {
        message: "signal connection lost".to_string(),
    });

    let snapshot = harness
        .wait_for(|s| s.connection_phase == ConnectionPhase::Disconnected)
        .await;
    assert_eq!(snapshot.last_error, "signal connection lost");
    assert!(snapshot.roster.is_empty());
    eventually(|| connection.disconnect_count() >= 1).await;

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_audio_levels_reach_roster() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;

    transport
        .last_connection()
        .unwrap()
        .set_audio_level("alice", 0.1);

    let snapshot = harness
        .wait_for(|s| s.roster.first().is_some_and(|p| p.audio_level > 0.0))
        .await;
    assert!((snapshot.roster[0].audio_level - 0.5).abs() < 1e-6);

    harness.shutdown().await;
}

// ============================================================================
// Mute and leave
// ============================================================================

#[tokio::test]
async fn test_toggle_mute_drives_microphone() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();

    let snapshot = harness.handle.toggle_mute().await.unwrap();
    assert!(snapshot.is_muted);
    eventually(|| connection.microphone_calls() == vec![true, false]).await;

    let snapshot = harness.handle.toggle_mute().await.unwrap();
    assert!(!snapshot.is_muted);
    eventually(|| connection.microphone_calls() == vec![true, false, true]).await;
    let snapshot = harness.wait_for(|s| !s.is_muted).await;
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Connected);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_microphone_failure_reports_actual_state() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();
    connection.fail_microphone("device busy");

    let snapshot = harness.handle.toggle_mute().await.unwrap();
    assert!(snapshot.is_muted);

    // The roster pull after the failed change reports the microphone as
    // still enabled.
    harness.wait_for(|s| !s.is_muted).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_toggle_mute_without_session_is_noop() {
    let transport = MockTransport::new();
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    let snapshot = harness.handle.toggle_mute().await.unwrap();
    assert_eq!(snapshot, SessionSnapshot::default());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_leave_resets_and_is_idempotent() {
    let transport = MockTransport::new().with_participants(local_alice());
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    harness.wait_for(connected).await;
    let connection = transport.last_connection().unwrap();

    let snapshot = harness.handle.leave().await.unwrap();
    assert_eq!(snapshot, SessionSnapshot::default());
    eventually(|| connection.disconnect_count() == 1).await;

    let snapshot = harness.handle.leave().await.unwrap();
    assert_eq!(snapshot, SessionSnapshot::default());
    assert_eq!(transport.connect_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_leave_while_connecting_discards_late_events() {
    let transport = MockTransport::new().with_participants(local_alice());
    transport.hold_connects();
    let harness = SessionHarness::spawn(transport.clone(), complete_settings());

    harness.handle.join("alice", "lobby").await.unwrap();
    let snapshot = harness.handle.leave().await.unwrap();
    assert_eq!(snapshot, SessionSnapshot::default());

    transport.release_connects();
    eventually(|| {
        transport
            .last_connection()
            .is_some_and(|connection| connection.disconnect_count() == 1)
    })
    .await;

    // Events from the abandoned connect arrived with a closed epoch.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.handle.snapshot(), SessionSnapshot::default());

    harness.shutdown().await;
}
