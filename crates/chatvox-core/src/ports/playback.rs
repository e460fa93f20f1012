//! Audio playback sink port.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::PlaybackClip;
use crate::request::RequestId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The audio could not be decoded.
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// The output device or overlay is unavailable.
    #[error("Playback output unavailable: {0}")]
    Unavailable(String),
}

/// The single audio output.
///
/// `play` resolves when the clip has finished (or was stopped). The processor
/// only ever has one clip in flight.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, clip: &PlaybackClip) -> Result<(), PlaybackError>;

    /// Stop the current clip immediately. A pending `play` resolves.
    fn stop(&self);

    /// External notification that `id` finished playing.
    ///
    /// Sinks that detect completion themselves ignore this.
    fn playback_finished(&self, id: RequestId) {
        let _ = id;
    }
}
