//! Speech orchestration for chatvox.
//!
//! Turns speak triggers into played audio: admission control, a bounded
//! priority queue, a single sequential processor, a content-addressed cache,
//! a fallback chain of providers guarded by circuit breakers, and spend
//! tracking with budget blocks. [`build_tts_service`] wires it all together.

#![deny(unused_crate_dependencies)]

// Used by the integration tests only
#[cfg(test)]
use {chatvox_providers as _, chatvox_store as _, mockall as _};

pub mod admission;
pub mod broadcast;
pub mod cache;
pub mod cost;
pub mod engine;
pub mod processor;
pub mod queue;
pub mod service;
pub mod sinks;

pub use admission::{
    Admission, GateDecision, GatePolicy, PermissionGate, RateLimitConfig, RateLimiter,
};
pub use broadcast::{Broadcaster, Subscription};
pub use cache::{CacheConfig, CachedAudio, SweepReport, SweeperHandle, SynthesisCache};
pub use cost::{BudgetBlocks, CostTracker, budget_blocks, budget_level};
pub use engine::{AudioResult, CircuitBreaker, CircuitState, EngineRegistry, EngineStatus, Permit};
pub use processor::{
    ProcessorConfig, ProcessorHandle, ProcessorStatus, Synthesis, SynthesisPipeline,
    spawn_processor,
};
pub use queue::{Enqueued, RequestQueue};
pub use service::{SinkKind, SpeakReceipt, TtsService, TtsServiceDeps, build_tts_service};
pub use sinks::{OverlaySink, TimedSink};
#[cfg(feature = "rodio")]
pub use sinks::RodioSink;
