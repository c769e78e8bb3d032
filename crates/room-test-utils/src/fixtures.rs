//! Pre-configured test data and a spawned session harness.

use room_bridge::adapter::{ParticipantSample, RoomTransport};
use room_bridge::credential::CredentialIssuer;
use room_bridge::session::{SessionActor, SessionHandle, SessionSnapshot};
use room_bridge::settings::RoomServiceSettings;
use common::secret::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const TEST_API_KEY: &str = "APItestkey";
pub const TEST_API_SECRET: &str = "test-secret-with-enough-entropy-for-hs256";
pub const TEST_SERVER_URL: &str = "wss://rooms.example.com";

/// Sample interval used by the harness.
pub const TEST_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// How long [`SessionHarness::wait_for`] waits before failing the test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings with all three values present.
#[must_use]
pub fn complete_settings() -> RoomServiceSettings {
    RoomServiceSettings {
        api_key: Some(TEST_API_KEY.to_string()),
        api_secret: Some(SecretString::from(TEST_API_SECRET.to_string())),
        server_url: Some(TEST_SERVER_URL.to_string()),
    }
}

/// Complete settings minus the server URL.
#[must_use]
pub fn settings_without_server_url() -> RoomServiceSettings {
    RoomServiceSettings {
        server_url: None,
        ..complete_settings()
    }
}

#[must_use]
pub fn participant(identity: &str, is_local: bool, is_speaking: bool, audio_level: f32) -> ParticipantSample {
    ParticipantSample {
        identity: identity.to_string(),
        is_local,
        is_speaking,
        audio_level,
    }
}

/// A session actor over a mock transport, with its settings channel.
pub struct SessionHarness {
    pub handle: SessionHandle,
    pub settings: watch::Sender<RoomServiceSettings>,
    pub cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHarness {
    pub fn spawn(transport: impl RoomTransport + 'static, settings: RoomServiceSettings) -> Self {
        let (settings_tx, settings_rx) = watch::channel(settings);
        let cancel_token = CancellationToken::new();
        let transport: Arc<dyn RoomTransport> = Arc::new(transport);
        let (handle, task) = SessionActor::spawn(
            transport,
            settings_rx,
            CredentialIssuer::default(),
            TEST_SAMPLE_INTERVAL,
            cancel_token.child_token(),
        );

        Self {
            handle,
            settings: settings_tx,
            cancel_token,
            task,
        }
    }

    /// Wait until the published snapshot satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// If it does not within [`WAIT_TIMEOUT`].
    pub async fn wait_for<F>(&self, predicate: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        let mut snapshots = self.handle.subscribe();
        let waited = tokio::time::timeout(WAIT_TIMEOUT, async {
            snapshots
                .wait_for(|snapshot| predicate(snapshot))
                .await
                .map(|snapshot| snapshot.clone())
        })
        .await;

        match waited {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(_)) => panic!("session actor stopped while waiting"),
            Err(_) => panic!(
                "snapshot condition not met within {WAIT_TIMEOUT:?}; last: {:?}",
                self.handle.snapshot()
            ),
        }
    }

    /// Cancel the actor and wait for it to stop.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        tokio::time::timeout(WAIT_TIMEOUT, self.task)
            .await
            .expect("session actor did not stop")
            .expect("session actor task failed");
    }
}
