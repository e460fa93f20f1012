//! Core domain types and port definitions for the chatvox speech orchestrator.
//!
//! This crate holds everything the orchestrator shares across crates without
//! performing I/O: request lifecycle, error taxonomy, events, settings, and
//! the traits implemented by providers, sinks and stores.

#![deny(unused_crate_dependencies)]

pub mod audio;
pub mod cache;
pub mod cost;
pub mod error;
pub mod events;
pub mod paths;
pub mod permission;
pub mod ports;
pub mod request;
pub mod settings;

pub use audio::{EngineId, PlaybackClip, SynthesizedAudio, VoiceInfo};
pub use cache::{CacheEntry, CacheKey, CacheStats, normalize_text};
pub use cost::{BudgetLevel, CostLedger, CostStats, EngineSpend};
pub use error::{DenyReason, EngineAttempt, ProviderError, TtsError, TtsResult};
pub use events::{NowPlayingDto, ProcessorStats, QueueSnapshot, QueuedRequestDto, TtsEvent};
pub use paths::{DATA_DIR_ENV, PathError, data_root};
pub use permission::{PermissionChange, PermissionStats, UserPermission};
pub use ports::{
    CacheStore, CostLedgerRepository, PermissionStore, PlaybackError, PlaybackSink, StoreError,
    SynthesisProvider, SynthesisRequest,
};
pub use request::{
    Priority, RequestId, RequestSource, RequestStatus, SpeakTrigger, TtsRequest, prepare_text,
};
pub use settings::{
    BudgetSettings, CircuitSettings, DEFAULT_MAX_QUEUE_SIZE, PlaybackSettings, SettingsError,
    SettingsUpdate, TtsSettings, validate_settings,
};
