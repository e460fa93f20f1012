//! Queue processor: the single sequential consumer of the request queue.
//!
//! The processor is an actor. [`ProcessorHandle`] sends [`Command`]s over a
//! bounded channel; the actor publishes [`TtsEvent`]s on an outbound channel
//! that the broadcaster consumes. Exactly one request is synthesizing or
//! playing at any time.

mod actor;
mod pipeline;
mod stats;

use std::sync::Arc;

use chatvox_core::{
    NowPlayingDto, PlaybackSettings, PlaybackSink, ProcessorStats, QueueSnapshot, RequestId,
    RequestStatus, TtsError, TtsEvent, TtsRequest, TtsSettings,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use pipeline::{Synthesis, SynthesisPipeline};
pub use stats::{Counter, StatsCounters};

/// Command channel capacity.
const COMMAND_CAPACITY: usize = 64;

/// Processor tunables taken from [`TtsSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub max_queue_size: u32,
    pub preview_len: usize,
    pub diagnostics: bool,
    pub playback: PlaybackSettings,
}

impl ProcessorConfig {
    pub fn from_settings(settings: &TtsSettings) -> Self {
        Self {
            max_queue_size: settings.max_queue_size,
            preview_len: settings.preview_len,
            diagnostics: settings.diagnostics,
            playback: settings.playback.clone(),
        }
    }
}

/// Point-in-time processor state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    pub queue: QueueSnapshot,
    pub now_playing: Option<NowPlayingDto>,
    /// Request owning the output and its phase (synthesizing or playing).
    pub current: Option<(RequestId, RequestStatus)>,
    pub stats: ProcessorStats,
}

pub(crate) enum Command {
    Enqueue {
        request: Box<TtsRequest>,
        reply: oneshot::Sender<Result<u32, TtsError>>,
    },
    Skip {
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    SetPaused(bool),
    Configure(ProcessorConfig),
    Status {
        reply: oneshot::Sender<ProcessorStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the processor actor.
///
/// Every method fails with [`TtsError::ServiceStopped`] once the actor has
/// exited.
#[derive(Clone)]
pub struct ProcessorHandle {
    tx: mpsc::Sender<Command>,
}

/// Spawn the processor actor.
pub fn spawn_processor(
    config: ProcessorConfig,
    pipeline: SynthesisPipeline,
    sink: Arc<dyn PlaybackSink>,
    events: mpsc::UnboundedSender<TtsEvent>,
) -> (ProcessorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let task = actor::Actor::spawn(config, pipeline, sink, events, rx);
    (ProcessorHandle { tx }, task)
}

impl ProcessorHandle {
    /// Queue an admitted request. Returns its 1-based queue position.
    pub async fn enqueue(&self, request: TtsRequest) -> Result<u32, TtsError> {
        self.call(|reply| Command::Enqueue {
            request: Box::new(request),
            reply,
        })
        .await?
    }

    /// Cancel the current item. Returns `false` if nothing was current.
    pub async fn skip(&self) -> Result<bool, TtsError> {
        self.call(|reply| Command::Skip { reply }).await
    }

    /// Drop every pending item. The current item is unaffected.
    pub async fn clear(&self) -> Result<usize, TtsError> {
        self.call(|reply| Command::Clear { reply }).await
    }

    pub async fn pause(&self) -> Result<(), TtsError> {
        self.send(Command::SetPaused(true)).await
    }

    pub async fn resume(&self) -> Result<(), TtsError> {
        self.send(Command::SetPaused(false)).await
    }

    pub async fn configure(&self, config: ProcessorConfig) -> Result<(), TtsError> {
        self.send(Command::Configure(config)).await
    }

    pub async fn status(&self) -> Result<ProcessorStatus, TtsError> {
        self.call(|reply| Command::Status { reply }).await
    }

    /// Stop the actor. Returns the number of pending items discarded.
    pub async fn shutdown(&self) -> Result<usize, TtsError> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    async fn send(&self, command: Command) -> Result<(), TtsError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TtsError::ServiceStopped)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TtsError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| TtsError::ServiceStopped)
    }
}
