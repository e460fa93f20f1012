//! Browser overlay sink.
//!
//! Audio leaves as a base64 `playAudio` event. The overlay reports completion
//! through [`PlaybackSink::playback_finished`]; if it never does, playback is
//! considered done once the clip's estimated duration (grace included) has
//! elapsed.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chatvox_core::{PlaybackClip, PlaybackError, PlaybackSink, RequestId, TtsEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

struct Pending {
    request_id: RequestId,
    done: oneshot::Sender<()>,
}

pub struct OverlaySink {
    events: mpsc::UnboundedSender<TtsEvent>,
    pending: Mutex<Option<Pending>>,
}

impl OverlaySink {
    pub const fn new(events: mpsc::UnboundedSender<TtsEvent>) -> Self {
        Self {
            events,
            pending: Mutex::new(None),
        }
    }

    fn take_pending(&self) -> Option<Pending> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl PlaybackSink for OverlaySink {
    async fn play(&self, clip: &PlaybackClip) -> Result<(), PlaybackError> {
        let (done, finished) = oneshot::channel();
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(Pending {
            request_id: clip.request_id,
            done,
        });

        let event = TtsEvent::PlayAudio {
            request_id: clip.request_id,
            mime: clip.audio.mime.clone(),
            audio_base64: STANDARD.encode(&clip.audio.bytes),
        };
        if self.events.send(event).is_err() {
            self.take_pending();
            return Err(PlaybackError::Unavailable("overlay channel closed".into()));
        }

        // A dropped sender means stop() was called; that also ends playback.
        if tokio::time::timeout(clip.estimated_duration, finished).await.is_err() {
            debug!(
                target: "chatvox.playback",
                request_id = %clip.request_id,
                "Overlay never confirmed playback, assuming finished"
            );
            self.take_pending();
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(pending) = self.take_pending() {
            let _ = self.events.send(TtsEvent::StopAudio {
                request_id: pending.request_id,
            });
        }
    }

    fn playback_finished(&self, id: RequestId) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|p| p.request_id == id) {
            if let Some(p) = pending.take() {
                let _ = p.done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chatvox_core::SynthesizedAudio;
    use tokio::time::Instant;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    use super::*;

    fn clip(secs: u64) -> PlaybackClip {
        PlaybackClip {
            request_id: RequestId::new(),
            audio: SynthesizedAudio::new(vec![0xff, 0xfb], "audio/mpeg"),
            estimated_duration: Duration::from_secs(secs),
        }
    }

    fn sink() -> (Arc<OverlaySink>, mpsc::UnboundedReceiver<TtsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(OverlaySink::new(tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn emits_audio_and_resolves_on_confirmation() {
        let (sink, mut rx) = sink();
        let clip = clip(30);
        let id = clip.request_id;
        let start = Instant::now();
        let playing = tokio::spawn({
            let sink = Arc::clone(&sink);
            async move { sink.play(&clip).await }
        });

        match rx.recv().await.unwrap() {
            TtsEvent::PlayAudio {
                request_id,
                mime,
                audio_base64,
            } => {
                assert_eq!(request_id, id);
                assert_eq!(mime, "audio/mpeg");
                assert_eq!(audio_base64, "//s=");
            }
            other => panic!("unexpected event {other:?}"),
        }

        sink.playback_finished(RequestId::new());
        sink.playback_finished(id);
        playing.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_for_another_request_is_ignored() {
        let (sink, mut rx) = sink();
        let clip = clip(30);
        let mut playing = task::spawn(sink.play(&clip));
        assert_pending!(playing.poll());
        assert!(matches!(rx.try_recv(), Ok(TtsEvent::PlayAudio { .. })));

        sink.playback_finished(RequestId::new());
        assert!(!playing.is_woken());
        assert_pending!(playing.poll());

        sink.playback_finished(clip.request_id);
        assert!(playing.is_woken());
        assert_ready_ok!(playing.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_estimated_duration() {
        let (sink, _rx) = sink();
        let start = Instant::now();
        sink.play(&clip(2)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_emits_stop_audio() {
        let (sink, mut rx) = sink();
        let clip = clip(30);
        let id = clip.request_id;
        let playing = tokio::spawn({
            let sink = Arc::clone(&sink);
            async move { sink.play(&clip).await }
        });
        assert!(matches!(rx.recv().await, Some(TtsEvent::PlayAudio { .. })));

        sink.stop();
        playing.await.unwrap().unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TtsEvent::StopAudio { request_id: id })
        );
    }

    #[tokio::test]
    async fn closed_channel_is_unavailable() {
        let (sink, rx) = sink();
        drop(rx);
        let err = sink.play(&clip(1)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Unavailable(_)));
    }
}
