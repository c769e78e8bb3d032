//! Audio level display mapping and the periodic sampling loop.
//!
//! The displayed level is a fraction of full bar width:
//! - raw `0` shows nothing
//! - any other raw level is scaled by 5 and clamped to `[0.05, 1.0]`, so a
//!   faint but present signal stays visible instead of flickering.

use super::transport::RoomConnection;
use super::AdapterEvent;
use crate::session::events::{ParticipantLevel, RoomEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Raw level multiplier (500%).
pub const LEVEL_GAIN: f32 = 5.0;

/// Smallest displayed level for a non-zero signal (5%).
pub const LEVEL_FLOOR: f32 = 0.05;

/// Largest displayed level (100%).
pub const LEVEL_CEILING: f32 = 1.0;

/// Map a raw audio level to its displayed level.
#[must_use]
pub fn displayed_level(raw: f32) -> f32 {
    if raw.is_nan() || raw <= 0.0 {
        return 0.0;
    }
    (raw * LEVEL_GAIN).clamp(LEVEL_FLOOR, LEVEL_CEILING)
}

/// Clamp an already-displayed level into `[0, 1]`.
#[must_use]
pub fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, LEVEL_CEILING)
}

/// Sample participant levels every `interval` until `session_token` is
/// cancelled, posting a `LevelsSampled` event with the participants whose
/// displayed level changed since the previous post.
pub(crate) async fn run_audio_sampler(
    epoch: u64,
    connection: Arc<dyn RoomConnection>,
    events: mpsc::Sender<AdapterEvent>,
    interval: Duration,
    session_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_posted: HashMap<String, f32> = HashMap::new();

    debug!(
        target: "bridge.adapter",
        epoch,
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "Audio sampler started"
    );

    loop {
        tokio::select! {
            biased;
            () = session_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let participants = connection.participants();
        last_posted.retain(|identity, _| participants.iter().any(|p| &p.identity == identity));

        let mut changed = Vec::new();
        for participant in &participants {
            let level = displayed_level(participant.audio_level);
            let previous = last_posted.insert(participant.identity.clone(), level);
            if previous.map_or(true, |prev| (prev - level).abs() > f32::EPSILON) {
                changed.push(ParticipantLevel {
                    identity: participant.identity.clone(),
                    level,
                });
            }
        }

        if changed.is_empty() {
            continue;
        }

        let event = AdapterEvent {
            epoch,
            event: RoomEvent::LevelsSampled { levels: changed },
        };
        tokio::select! {
            biased;
            () = session_token.cancelled() => break,
            sent = events.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!(target: "bridge.adapter", epoch, "Audio sampler stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_zero_shows_nothing() {
        assert!(close(displayed_level(0.0), 0.0));
    }

    #[test]
    fn test_faint_signal_is_floored() {
        assert!(close(displayed_level(0.01), 0.05));
        assert!(close(displayed_level(0.000_1), 0.05));
    }

    #[test]
    fn test_loud_signal_is_capped() {
        assert!(close(displayed_level(0.3), 1.0));
        assert!(close(displayed_level(1.0), 1.0));
    }

    #[test]
    fn test_mid_signal_scales_linearly() {
        assert!(close(displayed_level(0.1), 0.5));
        assert!(close(displayed_level(0.05), 0.25));
    }

    #[test]
    fn test_invalid_raw_levels_show_nothing() {
        assert!(close(displayed_level(-0.5), 0.0));
        assert!(close(displayed_level(f32::NAN), 0.0));
    }

    mod sampler {
        use super::super::*;
        use super::close;
        use crate::adapter::transport::{ParticipantSample, TransportError, TransportEvent};
        use async_trait::async_trait;
        use parking_lot::Mutex;
        use tokio::sync::broadcast;

        struct LevelSource {
            events: broadcast::Sender<TransportEvent>,
            participants: Mutex<Vec<ParticipantSample>>,
        }

        impl LevelSource {
            fn new(level: f32) -> Arc<Self> {
                let (events, _) = broadcast::channel(4);
                Arc::new(Self {
                    events,
                    participants: Mutex::new(vec![ParticipantSample {
                        identity: "alice".to_string(),
                        is_local: true,
                        is_speaking: false,
                        audio_level: level,
                    }]),
                })
            }

            fn set_level(&self, level: f32) {
                if let Some(p) = self.participants.lock().first_mut() {
                    p.audio_level = level;
                }
            }
        }

        #[async_trait]
        impl RoomConnection for LevelSource {
            fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
                self.events.subscribe()
            }
            fn is_connected(&self) -> bool {
                true
            }
            fn participants(&self) -> Vec<ParticipantSample> {
                self.participants.lock().clone()
            }
            fn is_microphone_enabled(&self) -> bool {
                true
            }
            async fn set_microphone_enabled(&self, _enabled: bool) -> Result<(), TransportError> {
                Ok(())
            }
            async fn disconnect(&self) {}
        }

        fn levels_of(event: AdapterEvent) -> Vec<ParticipantLevel> {
            match event.event {
                RoomEvent::LevelsSampled { levels } => levels,
                other => unreachable!("unexpected event {other:?}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_posts_changed_levels_only() {
            let source = LevelSource::new(0.1);
            let (tx, mut rx) = mpsc::channel(8);
            let token = CancellationToken::new();
            let task = tokio::spawn(run_audio_sampler(
                7,
                source.clone(),
                tx,
                Duration::from_millis(50),
                token.clone(),
            ));

            // First tick reports everyone.
            let first = rx.recv().await.unwrap();
            assert_eq!(first.epoch, 7);
            let levels = levels_of(first);
            assert_eq!(levels.len(), 1);
            assert!(close(levels[0].level, 0.5));

            // Unchanged level: nothing for a few ticks.
            tokio::time::advance(Duration::from_millis(160)).await;
            assert!(rx.try_recv().is_err());

            source.set_level(0.3);
            let levels = levels_of(rx.recv().await.unwrap());
            assert!(close(levels[0].level, 1.0));

            token.cancel();
            task.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_stops_when_cancelled() {
            let source = LevelSource::new(0.0);
            let (tx, mut rx) = mpsc::channel(8);
            let token = CancellationToken::new();
            let task = tokio::spawn(run_audio_sampler(
                1,
                source,
                tx,
                Duration::from_millis(50),
                token.clone(),
            ));

            rx.recv().await.unwrap();
            token.cancel();
            task.await.unwrap();

            // The sampler dropped its sender.
            assert!(rx.recv().await.is_none());
        }
    }

    #[test]
    fn test_clamp_level() {
        assert!(close(clamp_level(1.7), 1.0));
        assert!(close(clamp_level(-1.0), 0.0));
        assert!(close(clamp_level(f32::NAN), 0.0));
        assert!(close(clamp_level(0.3), 0.3));
    }
}
