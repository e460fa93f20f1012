//! Settings domain types and validation.
//!
//! [`TtsSettings`] holds every runtime tunable of the orchestrator. Updates
//! arrive as a partial [`SettingsUpdate`], are merged onto a copy of the
//! current settings, validated as a whole, and only then applied.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::EngineId;

/// Default maximum number of pending requests.
pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 100;

/// Slowest accepted speaking rate.
pub const MIN_CHARS_PER_SECOND: f64 = 0.1;

/// Circuit breaker tuning, applied to every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitSettings {
    /// Number of most recent attempts considered for the error rate.
    pub window_size: usize,
    /// Minimum attempts in the window before the breaker may trip.
    pub min_samples: usize,
    /// Error rate (0.0–1.0) that must be exceeded to open the circuit.
    pub error_threshold: f64,
    /// How long an open circuit skips its engine before probing.
    pub cooldown_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_samples: 3,
            error_threshold: 0.5,
            cooldown_secs: 60,
        }
    }
}

impl CircuitSettings {
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Spend thresholds for the cost tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetSettings {
    /// Spend within the current UTC hour that raises a warning.
    pub hourly_warning: Option<f64>,
    /// Spend within the current UTC day that raises a warning.
    pub daily_warning: Option<f64>,
    /// Spend within the current UTC day that is critical.
    pub daily_critical: Option<f64>,
    /// Per-engine daily spend caps.
    pub engine_daily_limits: BTreeMap<EngineId, f64>,
    /// Disable engines when a critical threshold or their cap is reached.
    pub block_on_critical: bool,
}

/// Duration fallback used when playback completion is not signalled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackSettings {
    /// Assumed speaking rate.
    pub chars_per_second: f64,
    /// Extra time added to every estimate.
    pub grace_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            chars_per_second: 15.0,
            grace_ms: 1_000,
        }
    }
}

impl PlaybackSettings {
    /// Estimated playback duration for `chars` characters of speech.
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn estimate(&self, chars: usize) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let secs = chars as f64 / self.chars_per_second;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .saturating_add(Duration::from_millis(self.grace_ms))
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TtsSettings {
    /// Maximum number of pending requests (1–1000).
    pub max_queue_size: u32,
    /// Admissions allowed per user per window.
    pub rate_limit: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Whether ordinary chat users may speak without being whitelisted.
    pub enabled_for_chat: bool,
    /// Minimum team level for chat users who are not explicitly allowed.
    pub team_min_level: u8,
    /// Text is truncated to this many characters.
    pub max_text_length: usize,
    /// Voice used when neither request nor user specifies one.
    pub default_voice: Option<String>,
    /// Idle time after which cache entries are evicted.
    pub cache_ttl_secs: u64,
    /// Upper bound on total cached audio bytes.
    pub cache_max_bytes: u64,
    /// Interval of the cache eviction sweep.
    pub cache_sweep_interval_secs: u64,
    /// Fallback chain order. Registered engines missing here are appended.
    pub engine_order: Vec<EngineId>,
    /// Time budget for a single provider attempt.
    pub attempt_timeout_ms: u64,
    pub circuit: CircuitSettings,
    pub budget: BudgetSettings,
    pub playback: PlaybackSettings,
    /// Number of pending items included in queue previews.
    pub preview_len: usize,
    /// Surface the serving engine in now-playing events.
    pub diagnostics: bool,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            rate_limit: 3,
            rate_limit_window_secs: 60,
            enabled_for_chat: true,
            team_min_level: 0,
            max_text_length: 300,
            default_voice: None,
            cache_ttl_secs: 24 * 60 * 60,
            cache_max_bytes: 100 * 1024 * 1024,
            cache_sweep_interval_secs: 300,
            engine_order: Vec::new(),
            attempt_timeout_ms: 10_000,
            circuit: CircuitSettings::default(),
            budget: BudgetSettings::default(),
            playback: PlaybackSettings::default(),
            preview_len: 5,
            diagnostics: false,
        }
    }
}

impl TtsSettings {
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub const fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Merge a partial update into these settings, only touching fields that
    /// are `Some`.
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(size) = update.max_queue_size {
            self.max_queue_size = size;
        }
        if let Some(limit) = update.rate_limit {
            self.rate_limit = limit;
        }
        if let Some(window) = update.rate_limit_window_secs {
            self.rate_limit_window_secs = window;
        }
        if let Some(enabled) = update.enabled_for_chat {
            self.enabled_for_chat = enabled;
        }
        if let Some(level) = update.team_min_level {
            self.team_min_level = level;
        }
        if let Some(len) = update.max_text_length {
            self.max_text_length = len;
        }
        if let Some(ref voice) = update.default_voice {
            self.default_voice.clone_from(voice);
        }
        if let Some(ttl) = update.cache_ttl_secs {
            self.cache_ttl_secs = ttl;
        }
        if let Some(bytes) = update.cache_max_bytes {
            self.cache_max_bytes = bytes;
        }
        if let Some(ref order) = update.engine_order {
            self.engine_order.clone_from(order);
        }
        if let Some(timeout) = update.attempt_timeout_ms {
            self.attempt_timeout_ms = timeout;
        }
        if let Some(ref circuit) = update.circuit {
            self.circuit = circuit.clone();
        }
        if let Some(ref budget) = update.budget {
            self.budget = budget.clone();
        }
        if let Some(ref playback) = update.playback {
            self.playback = playback.clone();
        }
        if let Some(len) = update.preview_len {
            self.preview_len = len;
        }
        if let Some(diagnostics) = update.diagnostics {
            self.diagnostics = diagnostics;
        }
    }
}

/// Partial settings update.
///
/// `None` leaves a field unchanged. `default_voice` is `Option<Option<_>>`
/// so it can be cleared with `Some(None)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub max_queue_size: Option<u32>,
    pub rate_limit: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub enabled_for_chat: Option<bool>,
    pub team_min_level: Option<u8>,
    pub max_text_length: Option<usize>,
    pub default_voice: Option<Option<String>>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_max_bytes: Option<u64>,
    pub engine_order: Option<Vec<EngineId>>,
    pub attempt_timeout_ms: Option<u64>,
    pub circuit: Option<CircuitSettings>,
    pub budget: Option<BudgetSettings>,
    pub playback: Option<PlaybackSettings>,
    pub preview_len: Option<usize>,
    pub diagnostics: Option<bool>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Max queue size must be between 1 and 1000, got {0}")]
    InvalidQueueSize(u32),

    #[error("Rate limit must be at least 1 per window of at least 1 second")]
    InvalidRateLimit,

    #[error("Max text length must be between 1 and 5000, got {0}")]
    InvalidTextLength(usize),

    #[error("Cache bounds must be positive")]
    InvalidCacheBounds,

    #[error("Attempt timeout must be between 100 and 120000 ms, got {0}")]
    InvalidAttemptTimeout(u64),

    #[error("Circuit settings are inconsistent: {0}")]
    InvalidCircuit(&'static str),

    #[error("Budget thresholds are inconsistent: {0}")]
    InvalidBudget(&'static str),

    #[error("Speaking rate must be at least 0.1 characters per second")]
    InvalidPlaybackRate,

    #[error("Engine '{0}' appears more than once in the engine order")]
    DuplicateEngine(EngineId),

    #[error("Preview length must be at most 50, got {0}")]
    InvalidPreviewLen(usize),
}

impl From<SettingsError> for crate::error::TtsError {
    fn from(err: SettingsError) -> Self {
        Self::InvalidSettings {
            message: err.to_string(),
        }
    }
}

/// Validate settings values.
pub fn validate_settings(settings: &TtsSettings) -> Result<(), SettingsError> {
    if !(1..=1000).contains(&settings.max_queue_size) {
        return Err(SettingsError::InvalidQueueSize(settings.max_queue_size));
    }

    if settings.rate_limit == 0 || settings.rate_limit_window_secs == 0 {
        return Err(SettingsError::InvalidRateLimit);
    }

    if !(1..=5000).contains(&settings.max_text_length) {
        return Err(SettingsError::InvalidTextLength(settings.max_text_length));
    }

    if settings.cache_max_bytes == 0
        || settings.cache_ttl_secs == 0
        || settings.cache_sweep_interval_secs == 0
    {
        return Err(SettingsError::InvalidCacheBounds);
    }

    if !(100..=120_000).contains(&settings.attempt_timeout_ms) {
        return Err(SettingsError::InvalidAttemptTimeout(
            settings.attempt_timeout_ms,
        ));
    }

    validate_circuit(&settings.circuit)?;
    validate_budget(&settings.budget)?;

    if settings.playback.chars_per_second.is_nan()
        || settings.playback.chars_per_second < MIN_CHARS_PER_SECOND
    {
        return Err(SettingsError::InvalidPlaybackRate);
    }

    let mut seen = HashSet::new();
    for engine in &settings.engine_order {
        if !seen.insert(engine) {
            return Err(SettingsError::DuplicateEngine(engine.clone()));
        }
    }

    if settings.preview_len > 50 {
        return Err(SettingsError::InvalidPreviewLen(settings.preview_len));
    }

    Ok(())
}

fn validate_circuit(circuit: &CircuitSettings) -> Result<(), SettingsError> {
    if circuit.window_size == 0 {
        return Err(SettingsError::InvalidCircuit("window size must be positive"));
    }
    if circuit.min_samples == 0 || circuit.min_samples > circuit.window_size {
        return Err(SettingsError::InvalidCircuit(
            "min samples must be between 1 and the window size",
        ));
    }
    if !(circuit.error_threshold > 0.0 && circuit.error_threshold <= 1.0) {
        return Err(SettingsError::InvalidCircuit(
            "error threshold must be in (0, 1]",
        ));
    }
    if circuit.cooldown_secs == 0 {
        return Err(SettingsError::InvalidCircuit("cooldown must be positive"));
    }
    Ok(())
}

fn validate_budget(budget: &BudgetSettings) -> Result<(), SettingsError> {
    let thresholds = [
        budget.hourly_warning,
        budget.daily_warning,
        budget.daily_critical,
    ];
    if thresholds.iter().flatten().any(|v| v.is_nan() || *v < 0.0)
        || budget
            .engine_daily_limits
            .values()
            .any(|v| v.is_nan() || *v < 0.0)
    {
        return Err(SettingsError::InvalidBudget("thresholds must be non-negative"));
    }
    if let (Some(warning), Some(critical)) = (budget.daily_warning, budget.daily_critical) {
        if warning > critical {
            return Err(SettingsError::InvalidBudget(
                "daily warning exceeds daily critical",
            ));
        }
    }
    Ok(())
}
