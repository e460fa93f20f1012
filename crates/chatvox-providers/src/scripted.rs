//! Deterministic provider driven by a script of outcomes.
//!
//! Each `synthesize` call consumes the next [`ScriptStep`]; once the script is
//! exhausted the `then` step repeats forever. Audio bytes are derived from
//! the engine, voice and text so cache behaviour is observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chatvox_core::{
    EngineId, ProviderError, SynthesisProvider, SynthesisRequest, SynthesizedAudio, VoiceInfo,
};
use serde::{Deserialize, Serialize};

/// Mime type of scripted audio.
pub const SCRIPTED_MIME: &str = "audio/x-chatvox-scripted";

/// Outcome of one scripted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScriptStep {
    Succeed {
        #[serde(default)]
        latency_ms: u64,
    },
    Fail {
        error: ProviderError,
    },
    /// Never completes; only the registry's attempt timeout ends the call.
    Hang,
}

impl Default for ScriptStep {
    fn default() -> Self {
        Self::Succeed { latency_ms: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedProviderConfig {
    pub id: EngineId,
    #[serde(default)]
    pub cost_per_char: f64,
    #[serde(default)]
    pub voices: Vec<VoiceInfo>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    #[serde(default)]
    pub then: ScriptStep,
}

pub struct ScriptedProvider {
    id: EngineId,
    cost_per_char: f64,
    voices: Vec<VoiceInfo>,
    script: Mutex<VecDeque<ScriptStep>>,
    then: ScriptStep,
    calls: AtomicUsize,
    received: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedProvider {
    /// A provider that always succeeds immediately.
    pub fn new(id: impl Into<EngineId>, cost_per_char: f64) -> Self {
        Self {
            id: id.into(),
            cost_per_char,
            voices: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            then: ScriptStep::default(),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: ScriptedProviderConfig) -> Self {
        Self {
            id: config.id,
            cost_per_char: config.cost_per_char,
            voices: config.voices,
            script: Mutex::new(config.script.into()),
            then: config.then,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_script(self, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(steps);
        self
    }

    #[must_use]
    pub fn then(mut self, step: ScriptStep) -> Self {
        self.then = step;
        self
    }

    #[must_use]
    pub fn with_voices(mut self, voices: Vec<VoiceInfo>) -> Self {
        self.voices = voices;
        self
    }

    /// Number of `synthesize` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request passed to `synthesize`, in call order.
    pub fn received(&self) -> Vec<SynthesisRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self) -> ScriptStep {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.then.clone())
    }
}

#[async_trait]
impl SynthesisProvider for ScriptedProvider {
    fn id(&self) -> EngineId {
        self.id.clone()
    }

    fn cost_per_char(&self) -> f64 {
        self.cost_per_char
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        match self.next_step() {
            ScriptStep::Succeed { latency_ms } => {
                if latency_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                }
                let payload = format!(
                    "{}|{}|{}",
                    self.id,
                    request.voice.as_deref().unwrap_or_default(),
                    request.text
                );
                Ok(SynthesizedAudio::new(payload.into_bytes(), SCRIPTED_MIME))
            }
            ScriptStep::Fail { error } => Err(error),
            ScriptStep::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok, assert_pending, task};

    use super::*;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest::new(text, Some("v1".into()))
    }

    #[tokio::test]
    async fn script_then_fallback_step() {
        let provider = ScriptedProvider::new("a", 0.0)
            .with_script([ScriptStep::Fail {
                error: ProviderError::server(Some(503), "busy"),
            }])
            .then(ScriptStep::default());

        assert_err!(provider.synthesize(&request("hi")).await);
        let audio = assert_ok!(provider.synthesize(&request("hi")).await);
        assert_eq!(audio.bytes.as_ref(), b"a|v1|hi");
        assert_eq!(audio.mime, SCRIPTED_MIME);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.received(), [request("hi"), request("hi")]);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_resolves() {
        let provider = ScriptedProvider::new("slow", 0.0).then(ScriptStep::Hang);
        let request = request("hi");
        let mut call = task::spawn(provider.synthesize(&request));
        assert_pending!(call.poll());

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_pending!(call.poll());
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn script_steps_deserialize() {
        let steps: Vec<ScriptStep> = serde_json::from_str(
            r#"[{"outcome":"succeed","latencyMs":20},
                {"outcome":"fail","error":{"kind":"timeout","timeout_ms":10}},
                {"outcome":"hang"}]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            [
                ScriptStep::Succeed { latency_ms: 20 },
                ScriptStep::Fail {
                    error: ProviderError::Timeout { timeout_ms: 10 }
                },
                ScriptStep::Hang,
            ]
        );
    }
}
