//! Synthesis provider port.
//!
//! Every provider exposes the same capability set regardless of vendor:
//! synthesize text, report its per-character price, and list its voices.
//! The registry selects providers by chain position, never by type.

use async_trait::async_trait;

use crate::audio::{EngineId, SynthesizedAudio, VoiceInfo};
use crate::error::ProviderError;

/// Input to a single synthesis attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Voice hint; providers fall back to their own default when `None` or
    /// unknown.
    pub voice: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            text: text.into(),
            voice,
        }
    }
}

#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Stable identifier used in settings, cache keys and the cost ledger.
    fn id(&self) -> EngineId;

    /// Price of one character of input text.
    fn cost_per_char(&self) -> f64;

    /// Voice catalog.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Synthesize `request.text`.
    ///
    /// Implementations need not enforce a timeout; the registry bounds every
    /// attempt.
    async fn synthesize(&self, request: &SynthesisRequest)
    -> Result<SynthesizedAudio, ProviderError>;
}
