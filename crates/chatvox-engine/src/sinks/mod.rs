//! Playback sinks.
//!
//! - [`OverlaySink`] hands audio to a browser overlay as a `playAudio` event
//!   and waits for the overlay to report completion
//! - [`TimedSink`] plays nothing and waits out the estimated duration
//! - `RodioSink` (feature `rodio`) plays on the local output device

mod overlay;
#[cfg(feature = "rodio")]
mod rodio;
mod timed;

pub use overlay::OverlaySink;
#[cfg(feature = "rodio")]
pub use rodio::RodioSink;
pub use timed::TimedSink;
