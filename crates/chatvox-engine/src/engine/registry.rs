//! Engine registry and fallback chain.
//!
//! Providers are registered once; the walk order is configurable at runtime.
//! A synthesis walks the order sequentially and returns the first success.
//! Engines are skipped when disabled by an operator, blocked by the budget,
//! or refused by their circuit breaker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chatvox_core::{
    CircuitSettings, EngineAttempt, EngineId, ProviderError, SynthesisProvider, SynthesisRequest,
    SynthesizedAudio, TtsError, VoiceInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::circuit::{CircuitBreaker, CircuitState};
use crate::cost::BudgetBlocks;

/// Successful synthesis through the chain.
#[derive(Debug, Clone)]
pub struct AudioResult {
    pub audio: SynthesizedAudio,
    /// Engine that produced the audio.
    pub engine: EngineId,
    /// Billed cost for this request on `engine` only.
    pub cost: f64,
    /// Failed attempts that preceded the success.
    pub attempts: Vec<EngineAttempt>,
}

/// Point-in-time view of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub id: EngineId,
    /// 0-based position in the configured walk order.
    pub position: usize,
    pub enabled: bool,
    pub circuit: CircuitState,
    pub error_rate: f64,
    pub window_len: usize,
    pub cost_per_char: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub voices: Vec<VoiceInfo>,
}

struct EngineSlot {
    provider: Arc<dyn SynthesisProvider>,
    enabled: AtomicBool,
    breaker: Mutex<CircuitBreaker>,
}

impl EngineSlot {
    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An attempt holding a breaker permit.
///
/// Dropped unsettled (provider panic, cancelled task) it counts as a failure,
/// so a half-open probe is always released.
struct Attempt<'a> {
    slot: &'a EngineSlot,
    settled: bool,
}

impl<'a> Attempt<'a> {
    const fn start(slot: &'a EngineSlot) -> Self {
        Self {
            slot,
            settled: false,
        }
    }

    fn succeeded(mut self) {
        self.settled = true;
        self.slot.breaker().record_success();
    }

    fn failed(mut self) {
        self.settled = true;
        self.slot.breaker().record_failure(Instant::now());
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.breaker().record_failure(Instant::now());
        }
    }
}

pub struct EngineRegistry {
    slots: Vec<(EngineId, EngineSlot)>,
    order: RwLock<Vec<EngineId>>,
    attempt_timeout_ms: AtomicU64,
}

impl EngineRegistry {
    /// Register providers. Later providers with a duplicate id are ignored.
    pub fn new(
        providers: Vec<Arc<dyn SynthesisProvider>>,
        order: &[EngineId],
        circuit: &CircuitSettings,
        attempt_timeout: Duration,
    ) -> Self {
        let mut slots: Vec<(EngineId, EngineSlot)> = Vec::with_capacity(providers.len());
        for provider in providers {
            let id = provider.id();
            if slots.iter().any(|(existing, _)| existing == &id) {
                warn!(target: "chatvox.engine", engine = %id, "Duplicate provider id, ignoring");
                continue;
            }
            let breaker = CircuitBreaker::new(id.clone(), circuit.clone());
            slots.push((
                id,
                EngineSlot {
                    provider,
                    enabled: AtomicBool::new(true),
                    breaker: Mutex::new(breaker),
                },
            ));
        }

        let registry = Self {
            slots,
            order: RwLock::new(Vec::new()),
            attempt_timeout_ms: AtomicU64::new(duration_ms(attempt_timeout)),
        };
        registry.set_order(order);
        registry
    }

    fn slot(&self, id: &EngineId) -> Option<&EngineSlot> {
        self.slots
            .iter()
            .find_map(|(slot_id, slot)| (slot_id == id).then_some(slot))
    }

    pub fn contains(&self, id: &EngineId) -> bool {
        self.slot(id).is_some()
    }

    /// Set the walk order. Unknown ids are ignored; registered engines not
    /// named are appended in registration order.
    pub fn set_order(&self, order: &[EngineId]) {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.slots.len());
        for id in order {
            if !self.contains(id) {
                debug!(target: "chatvox.engine", engine = %id, "Ignoring unknown engine in order");
                continue;
            }
            if seen.insert(id.clone()) {
                resolved.push(id.clone());
            }
        }
        for (id, _) in &self.slots {
            if seen.insert(id.clone()) {
                resolved.push(id.clone());
            }
        }
        *self.order.write().unwrap_or_else(PoisonError::into_inner) = resolved;
    }

    pub fn order(&self) -> Vec<EngineId> {
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Walk order for one request: the requested engine first (if known),
    /// then the configured order.
    pub fn walk_order(&self, requested: Option<&EngineId>) -> Vec<EngineId> {
        let mut order = self.order();
        if let Some(requested) = requested {
            if let Some(index) = order.iter().position(|id| id == requested) {
                let engine = order.remove(index);
                order.insert(0, engine);
            }
        }
        order
    }

    pub fn set_attempt_timeout(&self, timeout: Duration) {
        self.attempt_timeout_ms
            .store(duration_ms(timeout), Ordering::Relaxed);
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_circuit_settings(&self, settings: &CircuitSettings) {
        for (_, slot) in &self.slots {
            slot.breaker().reconfigure(settings.clone());
        }
    }

    /// Enable or disable an engine. Returns `false` for unknown ids.
    pub fn set_enabled(&self, id: &EngineId, enabled: bool) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        slot.enabled.store(enabled, Ordering::Relaxed);
        debug!(target: "chatvox.engine", engine = %id, enabled, "Engine toggled");
        true
    }

    pub fn circuit_state(&self, id: &EngineId) -> Option<CircuitState> {
        self.slot(id).map(|slot| slot.breaker().state())
    }

    pub fn status(&self) -> Vec<EngineStatus> {
        self.order()
            .into_iter()
            .enumerate()
            .filter_map(|(position, id)| {
                let slot = self.slot(&id)?;
                let breaker = slot.breaker();
                Some(EngineStatus {
                    position,
                    enabled: slot.enabled.load(Ordering::Relaxed),
                    circuit: breaker.state(),
                    error_rate: breaker.error_rate(),
                    window_len: breaker.window_len(),
                    cost_per_char: slot.provider.cost_per_char(),
                    last_failure_at: breaker.last_failure_at(),
                    voices: slot.provider.voices(),
                    id,
                })
            })
            .collect()
    }

    /// Synthesize through the fallback chain.
    ///
    /// Attempts are strictly sequential; the first success wins and its cost
    /// is the only one reported.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        requested_engine: Option<&EngineId>,
        blocks: &BudgetBlocks,
    ) -> Result<AudioResult, TtsError> {
        let timeout = self.attempt_timeout();
        let mut attempts = Vec::new();

        for id in self.walk_order(requested_engine) {
            let Some(slot) = self.slot(&id) else {
                continue;
            };
            if !slot.enabled.load(Ordering::Relaxed) {
                debug!(target: "chatvox.engine", engine = %id, "Skipping disabled engine");
                continue;
            }
            let cost_per_char = slot.provider.cost_per_char();
            if blocks.blocks(&id, cost_per_char) {
                debug!(target: "chatvox.engine", engine = %id, "Skipping budget-blocked engine");
                continue;
            }
            if slot.breaker().try_acquire(Instant::now()).is_none() {
                debug!(target: "chatvox.engine", engine = %id, "Skipping engine with open circuit");
                continue;
            }

            let attempt = Attempt::start(slot);
            let outcome = match tokio::time::timeout(timeout, slot.provider.synthesize(request)).await
            {
                Ok(Ok(audio)) if audio.is_empty() => {
                    Err(ProviderError::invalid_response("empty audio"))
                }
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: duration_ms(timeout),
                }),
            };

            match outcome {
                Ok(audio) => {
                    attempt.succeeded();
                    #[allow(clippy::cast_precision_loss)]
                    let cost = request.text.chars().count() as f64 * cost_per_char;
                    debug!(
                        target: "chatvox.engine",
                        engine = %id,
                        failed_attempts = attempts.len(),
                        cost,
                        "Synthesis succeeded"
                    );
                    return Ok(AudioResult {
                        audio,
                        engine: id,
                        cost,
                        attempts,
                    });
                }
                Err(error) => {
                    attempt.failed();
                    warn!(target: "chatvox.engine", engine = %id, %error, "Synthesis attempt failed");
                    attempts.push(EngineAttempt { engine: id, error });
                }
            }
        }

        warn!(
            target: "chatvox.engine",
            attempts = attempts.len(),
            "All engines exhausted"
        );
        Err(TtsError::AllEnginesExhausted { attempts })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
