//! Synthesis pipeline for one request.
//!
//! Cache lookup, then the fallback chain, then cost recording and cache
//! store. The pipeline runs in its own task and never touches processor
//! state; a result that arrives after its request was skipped is still
//! billed and cached (the provider already did the work) but never played.

use std::sync::Arc;

use chatvox_core::{EngineId, SynthesisRequest, SynthesizedAudio, TtsError, TtsRequest};
use tracing::{debug, warn};

use super::stats::{Counter, StatsCounters};
use crate::cache::SynthesisCache;
use crate::cost::CostTracker;
use crate::engine::EngineRegistry;

/// Audio ready to play.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub audio: SynthesizedAudio,
    pub engine: EngineId,
    pub from_cache: bool,
}

/// Dependencies for the synthesis phase, cloned into each task.
#[derive(Clone)]
pub struct SynthesisPipeline {
    pub cache: Arc<SynthesisCache>,
    pub registry: Arc<EngineRegistry>,
    pub cost: Arc<CostTracker>,
    pub stats: Arc<StatsCounters>,
}

impl SynthesisPipeline {
    pub async fn run(&self, request: &TtsRequest) -> Result<Synthesis, TtsError> {
        let voice = request.requested_voice.as_deref();
        let walk = self
            .registry
            .walk_order(request.requested_engine.as_ref());

        if let Some(hit) = self.cache.lookup_any(&request.text, voice, &walk).await {
            self.stats.incr(Counter::CacheHit);
            return Ok(Synthesis {
                audio: hit.audio,
                engine: hit.engine,
                from_cache: true,
            });
        }
        self.stats.incr(Counter::CacheMiss);

        let blocks = self.cost.blocks().await;
        let synthesis_request = SynthesisRequest::new(request.text.clone(), voice.map(str::to_string));
        let result = self
            .registry
            .synthesize(
                &synthesis_request,
                request.requested_engine.as_ref(),
                &blocks,
            )
            .await?;

        self.cost
            .record(&result.engine, request.char_count(), result.cost)
            .await;

        if let Err(e) = self
            .cache
            .store(&request.text, voice, &result.engine, &result.audio)
            .await
        {
            warn!(target: "chatvox.processor", request_id = %request.id, error = %e, "Continuing without caching");
        }

        debug!(
            target: "chatvox.processor",
            request_id = %request.id,
            engine = %result.engine,
            fallbacks = result.attempts.len(),
            "Synthesized"
        );
        Ok(Synthesis {
            audio: result.audio,
            engine: result.engine,
            from_cache: false,
        })
    }
}
