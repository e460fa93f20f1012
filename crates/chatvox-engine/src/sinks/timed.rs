//! Headless sink that simulates playback by waiting.

use async_trait::async_trait;
use chatvox_core::{PlaybackClip, PlaybackError, PlaybackSink};
use tokio::sync::Notify;
use tracing::debug;

/// Waits for the clip's estimated duration, or until stopped.
#[derive(Debug, Default)]
pub struct TimedSink {
    stop: Notify,
}

impl TimedSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaybackSink for TimedSink {
    async fn play(&self, clip: &PlaybackClip) -> Result<(), PlaybackError> {
        debug!(
            target: "chatvox.playback",
            request_id = %clip.request_id,
            duration_ms = clip.estimated_duration.as_millis(),
            "Timed playback"
        );
        tokio::select! {
            () = tokio::time::sleep(clip.estimated_duration) => {}
            () = self.stop.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chatvox_core::{RequestId, SynthesizedAudio};
    use tokio::time::Instant;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    use super::*;

    fn clip(secs: u64) -> PlaybackClip {
        PlaybackClip {
            request_id: RequestId::new(),
            audio: SynthesizedAudio::new(vec![1, 2, 3], "audio/mpeg"),
            estimated_duration: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_estimated_duration() {
        let sink = TimedSink::new();
        let start = Instant::now();
        sink.play(&clip(4)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_playback_early() {
        let sink = TimedSink::new();
        let clip = clip(60);
        let mut playing = task::spawn(sink.play(&clip));
        assert_pending!(playing.poll());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pending!(playing.poll());
        sink.stop();
        assert!(playing.is_woken());
        assert_ready_ok!(playing.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_estimate_waits_for_stop() {
        let sink = TimedSink::new();
        let clip = PlaybackClip {
            estimated_duration: Duration::MAX,
            ..clip(0)
        };
        let mut playing = task::spawn(sink.play(&clip));
        assert_pending!(playing.poll());

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_pending!(playing.poll());
        sink.stop();
        assert_ready_ok!(playing.poll());
    }
}
