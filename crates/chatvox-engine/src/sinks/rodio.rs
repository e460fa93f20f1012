//! Local speaker output through `rodio`.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so it lives on a
//! dedicated OS thread. [`RodioSink`] is the `Send + Sync` proxy that talks
//! to that thread over a channel.

use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use async_trait::async_trait;
use chatvox_core::{PlaybackClip, PlaybackError, PlaybackSink, SynthesizedAudio};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

enum AudioCommand {
    Play {
        audio: SynthesizedAudio,
        done: oneshot::Sender<Result<(), PlaybackError>>,
    },
    Stop,
    Shutdown,
}

pub struct RodioSink {
    cmd_tx: Mutex<mpsc::Sender<AudioCommand>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RodioSink {
    /// Open the default output device on a dedicated audio thread.
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("chatvox-audio".into())
            .spawn(move || run(&cmd_rx, &init_tx))
            .map_err(|e| PlaybackError::Unavailable(format!("failed to spawn audio thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| PlaybackError::Unavailable("audio thread died".into()))??;

        Ok(Self {
            cmd_tx: Mutex::new(cmd_tx),
            thread: Some(thread),
        })
    }

    fn send(&self, command: AudioCommand) -> Result<(), PlaybackError> {
        self.cmd_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(command)
            .map_err(|_| PlaybackError::Unavailable("audio thread stopped".into()))
    }
}

#[async_trait]
impl PlaybackSink for RodioSink {
    async fn play(&self, clip: &PlaybackClip) -> Result<(), PlaybackError> {
        let (done, finished) = oneshot::channel();
        self.send(AudioCommand::Play {
            audio: clip.audio.clone(),
            done,
        })?;
        finished
            .await
            .map_err(|_| PlaybackError::Unavailable("audio thread stopped".into()))?
    }

    fn stop(&self) {
        let _ = self.send(AudioCommand::Stop);
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(cmd_rx: &mpsc::Receiver<AudioCommand>, init_tx: &mpsc::Sender<Result<(), PlaybackError>>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(PlaybackError::Unavailable(e.to_string())));
            return;
        }
    };
    let _ = init_tx.send(Ok(()));
    info!(target: "chatvox.playback", "Audio output initialized on default device");

    let mut current: Option<Arc<Sink>> = None;
    while let Ok(command) = cmd_rx.recv() {
        match command {
            AudioCommand::Play { audio, done } => {
                if let Some(sink) = current.take() {
                    sink.stop();
                }
                match start(&handle, audio) {
                    Ok(sink) => {
                        watch(Arc::clone(&sink), done);
                        current = Some(sink);
                    }
                    Err(e) => {
                        warn!(target: "chatvox.playback", error = %e, "Cannot play clip");
                        let _ = done.send(Err(e));
                    }
                }
            }
            AudioCommand::Stop => {
                if let Some(sink) = current.take() {
                    sink.stop();
                    debug!(target: "chatvox.playback", "Playback stopped");
                }
            }
            AudioCommand::Shutdown => break,
        }
    }
    if let Some(sink) = current.take() {
        sink.stop();
    }
}

fn start(handle: &OutputStreamHandle, audio: SynthesizedAudio) -> Result<Arc<Sink>, PlaybackError> {
    let source =
        Decoder::new(Cursor::new(audio.bytes)).map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let sink = Sink::try_new(handle).map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
    sink.append(source);
    Ok(Arc::new(sink))
}

/// Resolve `done` once the sink drains or is stopped.
fn watch(sink: Arc<Sink>, done: oneshot::Sender<Result<(), PlaybackError>>) {
    thread::spawn(move || {
        sink.sleep_until_end();
        let _ = done.send(Ok(()));
    });
}
