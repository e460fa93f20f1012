//! The processor actor loop.
//!
//! # Concurrency Model
//!
//! - The actor task owns the [`RequestQueue`] and the current item; nothing
//!   else mutates them
//! - Synthesis and playback run in spawned tasks that report back over an
//!   internal channel, so commands (skip, clear) are served while they run
//! - Every started item gets a fresh lease; results carrying any other lease
//!   are stale and discarded, which is how a skipped item's late audio is
//!   kept off the output

use std::ops::ControlFlow;
use std::sync::Arc;

use chatvox_core::{
    NowPlayingDto, PlaybackClip, PlaybackError, PlaybackSink, QueueSnapshot, RequestStatus,
    TtsError, TtsEvent, TtsRequest,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pipeline::{Synthesis, SynthesisPipeline};
use super::stats::{Counter, StatsCounters};
use super::{Command, ProcessorConfig, ProcessorStatus};
use crate::queue::{Enqueued, RequestQueue};

/// Lease ID for the item currently owning the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LeaseId(u64);

enum Phase {
    Synthesizing,
    Playing { task: JoinHandle<()> },
}

struct Current {
    lease: LeaseId,
    request: TtsRequest,
    phase: Phase,
    now_playing: Option<NowPlayingDto>,
}

enum Internal {
    Synthesized {
        lease: LeaseId,
        result: Result<Synthesis, TtsError>,
    },
    PlaybackDone {
        lease: LeaseId,
        result: Result<(), PlaybackError>,
    },
}

pub(super) struct Actor {
    queue: RequestQueue,
    config: ProcessorConfig,
    paused: bool,
    current: Option<Current>,
    next_lease: u64,
    pipeline: SynthesisPipeline,
    sink: Arc<dyn PlaybackSink>,
    events: mpsc::UnboundedSender<TtsEvent>,
    stats: Arc<StatsCounters>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Actor {
    pub(super) fn spawn(
        config: ProcessorConfig,
        pipeline: SynthesisPipeline,
        sink: Arc<dyn PlaybackSink>,
        events: mpsc::UnboundedSender<TtsEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> JoinHandle<()> {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = Self {
            queue: RequestQueue::new(config.max_queue_size),
            config,
            paused: false,
            current: None,
            next_lease: 0,
            stats: Arc::clone(&pipeline.stats),
            pipeline,
            sink,
            events,
            internal_tx,
        };
        tokio::spawn(actor.run(commands, internal_rx))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        debug!(target: "chatvox.processor", "Processor started");
        loop {
            self.advance();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if self.handle(command).is_break() {
                        break;
                    }
                }
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        debug!(target: "chatvox.processor", "Processor stopped");
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Enqueue { request, reply } => {
                let _ = reply.send(self.enqueue(*request));
            }
            Command::Skip { reply } => {
                let _ = reply.send(self.skip());
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.clear());
            }
            Command::SetPaused(paused) => {
                if self.paused != paused {
                    self.paused = paused;
                    info!(target: "chatvox.processor", paused, "Processor pause state changed");
                    self.publish_queue();
                }
            }
            Command::Configure(config) => self.configure(config),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.shutdown());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Synthesized { lease, result } => {
                if !self.holds_lease(lease) {
                    debug!(target: "chatvox.processor", lease = lease.0, "Discarding stale synthesis result");
                    return;
                }
                match result {
                    Ok(synthesis) => self.start_playback(synthesis),
                    Err(error) => self.finish_current(RequestStatus::Failed, Some(error.to_string())),
                }
            }
            Internal::PlaybackDone { lease, result } => {
                if !self.holds_lease(lease) {
                    return;
                }
                match result {
                    Ok(()) => self.finish_current(RequestStatus::Completed, None),
                    Err(error) => {
                        warn!(target: "chatvox.processor", %error, "Playback failed");
                        self.finish_current(RequestStatus::Failed, Some(error.to_string()));
                    }
                }
            }
        }
    }

    fn holds_lease(&self, lease: LeaseId) -> bool {
        self.current.as_ref().is_some_and(|c| c.lease == lease)
    }

    fn enqueue(&mut self, request: TtsRequest) -> Result<u32, TtsError> {
        let result = match self.queue.enqueue(request) {
            Enqueued::Accepted { position, evicted } => {
                self.stats.incr(Counter::Admitted);
                if let Some(evicted) = evicted {
                    self.report_dropped(&evicted, "evicted by a higher-priority request");
                }
                Ok(position)
            }
            Enqueued::Dropped(request) => {
                self.report_dropped(&request, "queue full");
                Err(TtsError::queue_full(self.queue.max_size()))
            }
        };
        self.publish_queue();
        self.publish_stats();
        result
    }

    /// Start the next pending request if the output is free.
    fn advance(&mut self) {
        if self.paused || self.current.is_some() {
            return;
        }
        let Some(mut request) = self.queue.dequeue() else {
            return;
        };
        request.transition(RequestStatus::Synthesizing);

        self.next_lease += 1;
        let lease = LeaseId(self.next_lease);
        let pipeline = self.pipeline.clone();
        let tx = self.internal_tx.clone();
        let job = request.clone();
        tokio::spawn(async move {
            // A panicking pipeline still reports back, or the output stays held.
            let result = tokio::spawn(async move { pipeline.run(&job).await })
                .await
                .unwrap_or_else(|error| {
                    Err(TtsError::SynthesisCrashed {
                        message: error.to_string(),
                    })
                });
            let _ = tx.send(Internal::Synthesized { lease, result });
        });

        debug!(target: "chatvox.processor", request_id = %request.id, lease = lease.0, "Synthesizing");
        self.current = Some(Current {
            lease,
            request,
            phase: Phase::Synthesizing,
            now_playing: None,
        });
        self.publish_queue();
    }

    fn start_playback(&mut self, synthesis: Synthesis) {
        let diagnostics = self.config.diagnostics;
        let estimated_duration = self.config.playback.estimate(
            self.current
                .as_ref()
                .map_or(0, |current| current.request.char_count()),
        );
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.request.transition(RequestStatus::Playing);

        let item = NowPlayingDto {
            id: current.request.id,
            username: current.request.username.clone(),
            text: current.request.text.clone(),
            source: current.request.source,
            engine: diagnostics.then(|| synthesis.engine.clone()),
            from_cache: synthesis.from_cache,
            started_at: Utc::now(),
        };
        current.now_playing = Some(item.clone());

        let clip = PlaybackClip {
            request_id: current.request.id,
            audio: synthesis.audio,
            estimated_duration,
        };
        let lease = current.lease;
        let sink = Arc::clone(&self.sink);
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let result = sink.play(&clip).await;
            let _ = tx.send(Internal::PlaybackDone { lease, result });
        });
        current.phase = Phase::Playing { task };

        info!(
            target: "chatvox.processor",
            request_id = %item.id,
            engine = %synthesis.engine,
            from_cache = synthesis.from_cache,
            "Now playing"
        );
        self.emit(TtsEvent::now_playing(Some(item)));
    }

    /// Move the current item to a terminal status and free the output.
    fn finish_current(&mut self, status: RequestStatus, detail: Option<String>) {
        let Some(mut current) = self.current.take() else {
            return;
        };
        if let Phase::Playing { task } = current.phase {
            if status == RequestStatus::Skipped {
                self.sink.stop();
                task.abort();
            }
        }
        current.request.transition(status);

        let counter = match status {
            RequestStatus::Completed => Counter::Completed,
            RequestStatus::Skipped => Counter::Skipped,
            _ => Counter::Failed,
        };
        self.stats.incr(counter);

        if status == RequestStatus::Failed {
            warn!(
                target: "chatvox.processor",
                request_id = %current.request.id,
                detail = detail.as_deref().unwrap_or_default(),
                "Request failed"
            );
        }
        self.emit(TtsEvent::finished(current.request.id, status, detail));
        if current.now_playing.is_some() {
            self.emit(TtsEvent::now_playing(None));
        }
        self.publish_queue();
        self.publish_stats();
    }

    fn skip(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.finish_current(RequestStatus::Skipped, None);
        true
    }

    fn clear(&mut self) -> usize {
        let removed = self.queue.clear();
        for request in &removed {
            self.report_dropped(request, "queue cleared");
        }
        info!(target: "chatvox.processor", removed = removed.len(), "Queue cleared");
        self.publish_queue();
        self.publish_stats();
        removed.len()
    }

    fn configure(&mut self, config: ProcessorConfig) {
        let evicted = self.queue.set_max_size(config.max_queue_size);
        for request in &evicted {
            self.report_dropped(request, "queue shrunk");
        }
        self.config = config;
        self.publish_queue();
        if !evicted.is_empty() {
            self.publish_stats();
        }
    }

    fn shutdown(&mut self) -> usize {
        if self.current.is_some() {
            self.finish_current(RequestStatus::Skipped, Some("shutdown".to_string()));
        }
        let pending = self.queue.clear();
        for request in &pending {
            self.report_dropped(request, "shutdown");
        }
        info!(target: "chatvox.processor", discarded = pending.len(), "Processor shutting down");
        self.publish_queue();
        self.publish_stats();
        pending.len()
    }

    fn report_dropped(&self, request: &TtsRequest, reason: &str) {
        self.stats.incr(Counter::Dropped);
        debug!(target: "chatvox.processor", request_id = %request.id, reason, "Request dropped");
        self.emit(TtsEvent::finished(
            request.id,
            RequestStatus::Dropped,
            Some(reason.to_string()),
        ));
    }

    fn queue_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            depth: self.queue.len(),
            max_size: self.queue.max_size(),
            paused: self.paused,
            next: self.queue.preview(self.config.preview_len),
        }
    }

    fn status(&self) -> ProcessorStatus {
        ProcessorStatus {
            queue: self.queue_snapshot(),
            now_playing: self.current.as_ref().and_then(|c| c.now_playing.clone()),
            current: self.current.as_ref().map(|c| (c.request.id, c.request.status)),
            stats: self.stats.snapshot(),
        }
    }

    fn publish_queue(&self) {
        self.emit(TtsEvent::queue_update(self.queue_snapshot()));
    }

    fn publish_stats(&self) {
        self.emit(TtsEvent::stats(self.stats.snapshot()));
    }

    fn emit(&self, event: TtsEvent) {
        // Fire-and-forget; the broadcaster may already be gone at shutdown.
        let _ = self.events.send(event);
    }
}
