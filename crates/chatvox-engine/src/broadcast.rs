//! Event fan-out to subscribers.
//!
//! The broadcaster consumes the processor's outbound channel and republishes
//! every event on a `tokio::sync::broadcast` channel. It also remembers the
//! latest queue, now-playing and stats events so a new subscriber starts from
//! the current state instead of replayed history. Delivery is at-most-once:
//! a lagging subscriber loses events.

use std::sync::{Arc, PoisonError, RwLock};

use chatvox_core::TtsEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Broadcast channel capacity for TTS events.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default, Clone)]
struct Latest {
    queue: Option<TtsEvent>,
    now_playing: Option<TtsEvent>,
    stats: Option<TtsEvent>,
}

impl Latest {
    fn record(&mut self, event: &TtsEvent) {
        let slot = match event {
            TtsEvent::QueueUpdate { .. } => &mut self.queue,
            TtsEvent::NowPlaying { .. } => &mut self.now_playing,
            TtsEvent::StatsUpdate { .. } => &mut self.stats,
            TtsEvent::PlayAudio { .. }
            | TtsEvent::StopAudio { .. }
            | TtsEvent::RequestFinished { .. } => return,
        };
        *slot = Some(event.clone());
    }

    fn snapshot(&self) -> Vec<TtsEvent> {
        [&self.queue, &self.now_playing, &self.stats]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// A new subscription: the current state, then live events.
pub struct Subscription {
    pub snapshot: Vec<TtsEvent>,
    pub events: broadcast::Receiver<TtsEvent>,
}

pub struct Broadcaster {
    sender: broadcast::Sender<TtsEvent>,
    latest: Arc<RwLock<Latest>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Broadcaster {
    /// Spawn the fan-out task over `source`.
    pub fn spawn(mut source: mpsc::UnboundedReceiver<TtsEvent>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let latest = Arc::new(RwLock::new(Latest::default()));
        let cancel = CancellationToken::new();

        let task = {
            let sender = sender.clone();
            let latest = Arc::clone(&latest);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            while let Ok(event) = source.try_recv() {
                                publish(&sender, &latest, event);
                            }
                            break;
                        }
                        event = source.recv() => match event {
                            Some(event) => publish(&sender, &latest, event),
                            None => break,
                        },
                    }
                }
                debug!(target: "chatvox.broadcast", "Broadcaster stopped");
            })
        };

        Self {
            sender,
            latest,
            cancel,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        Subscription {
            snapshot: latest.snapshot(),
            events: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stop the fan-out task after publishing events already queued.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn publish(sender: &broadcast::Sender<TtsEvent>, latest: &RwLock<Latest>, event: TtsEvent) {
    // Held across the send so subscribe() sees either the old snapshot plus
    // this event, or the new snapshot alone.
    let mut latest = latest.write().unwrap_or_else(PoisonError::into_inner);
    latest.record(&event);
    let _ = sender.send(event);
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use chatvox_core::{ProcessorStats, QueueSnapshot, RequestId, RequestStatus};

    use super::*;

    #[tokio::test]
    async fn new_subscriber_receives_latest_snapshot_only() {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcaster = Broadcaster::spawn(rx);

        tx.send(TtsEvent::queue_update(QueueSnapshot::default()))
            .unwrap();
        let stats = ProcessorStats {
            received: 1,
            ..Default::default()
        };
        tx.send(TtsEvent::stats(ProcessorStats::default())).unwrap();
        tx.send(TtsEvent::stats(stats)).unwrap();

        // Let the fan-out task drain the channel.
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if broadcaster.subscribe().snapshot.len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let sub = broadcaster.subscribe();
        assert_eq!(sub.snapshot.len(), 2);
        assert!(sub.snapshot.contains(&TtsEvent::stats(stats)));
        broadcaster.shutdown().await;
    }

    #[tokio::test]
    async fn live_events_reach_subscribers() {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcaster = Broadcaster::spawn(rx);
        let mut sub = broadcaster.subscribe();
        assert!(sub.snapshot.is_empty());

        tx.send(TtsEvent::now_playing(None)).unwrap();
        assert_eq!(sub.events.recv().await.unwrap(), TtsEvent::now_playing(None));
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcaster = Broadcaster::spawn(rx);
        let mut sub = broadcaster.subscribe();

        let id = RequestId::new();
        tx.send(TtsEvent::finished(id, RequestStatus::Dropped, None))
            .unwrap();
        broadcaster.shutdown().await;

        assert_eq!(
            sub.events.recv().await.unwrap(),
            TtsEvent::finished(id, RequestStatus::Dropped, None)
        );
        assert!(sub.events.recv().await.is_err());
    }
}
