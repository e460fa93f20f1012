//! `TtsService`: the composition root and public facade.
//!
//! Admission (text preparation, permission gate, rate limiter, voice
//! resolution) runs on the caller's task; everything after admission is owned
//! by the processor actor. Settings updates are validated whole and then
//! pushed into every component.
//!
//! # Locking discipline
//!
//! `settings` is a std lock and is never held across an await. Settings
//! updates are serialized by `update_lock`, held for the whole update.
//! Background task handles sit behind a tokio mutex that is only taken by
//! settings updates (sweeper restart) and shutdown.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chatvox_core::{
    CacheStats, CacheStore, CostLedgerRepository, CostStats, EngineId, PermissionChange,
    PermissionStats, PermissionStore, PlaybackSink, RequestId, RequestStatus, SettingsUpdate,
    SpeakTrigger, SynthesisProvider, TtsError, TtsEvent, TtsRequest, TtsSettings, UserPermission,
    prepare_text, validate_settings,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::{
    Admission, GateDecision, GatePolicy, PermissionGate, RateLimitConfig, RateLimiter,
};
use crate::broadcast::{Broadcaster, Subscription};
use crate::cache::{CacheConfig, SweeperHandle, SynthesisCache};
use crate::cost::CostTracker;
use crate::engine::{EngineRegistry, EngineStatus};
use crate::processor::{
    Counter, ProcessorConfig, ProcessorHandle, ProcessorStatus, StatsCounters, SynthesisPipeline,
    spawn_processor,
};
use crate::sinks::{OverlaySink, TimedSink};

/// Which audio output the service drives.
pub enum SinkKind {
    /// Publish `playAudio` events for a browser overlay.
    Overlay,
    /// Headless: wait out the estimated duration.
    Timed,
    Custom(Arc<dyn PlaybackSink>),
}

/// Collaborators needed to build a [`TtsService`].
pub struct TtsServiceDeps {
    pub settings: TtsSettings,
    pub providers: Vec<Arc<dyn SynthesisProvider>>,
    pub permissions: Arc<dyn PermissionStore>,
    pub ledger: Arc<dyn CostLedgerRepository>,
    pub cache: Arc<dyn CacheStore>,
    pub sink: SinkKind,
}

/// Result of a successful `speak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakReceipt {
    pub id: RequestId,
    /// 1-based queue position at admission.
    pub position: u32,
}

struct Background {
    processor: JoinHandle<()>,
    sweeper: SweeperHandle,
}

pub struct TtsService {
    settings: RwLock<TtsSettings>,
    gate: PermissionGate,
    limiter: RateLimiter,
    cache: Arc<SynthesisCache>,
    registry: Arc<EngineRegistry>,
    cost: Arc<CostTracker>,
    stats: Arc<StatsCounters>,
    processor: ProcessorHandle,
    sink: Arc<dyn PlaybackSink>,
    events: mpsc::UnboundedSender<TtsEvent>,
    broadcaster: Mutex<Option<Broadcaster>>,
    background: tokio::sync::Mutex<Option<Background>>,
    update_lock: tokio::sync::Mutex<()>,
}

/// Validate settings, open the stores and start the background tasks.
pub async fn build_tts_service(deps: TtsServiceDeps) -> Result<TtsService, TtsError> {
    let TtsServiceDeps {
        settings,
        providers,
        permissions,
        ledger,
        cache,
        sink,
    } = deps;
    validate_settings(&settings)?;

    let cache = Arc::new(SynthesisCache::open(cache, cache_config(&settings)).await?);
    let cost = Arc::new(CostTracker::open(ledger, settings.budget.clone()).await?);
    let registry = Arc::new(EngineRegistry::new(
        providers,
        &settings.engine_order,
        &settings.circuit,
        settings.attempt_timeout(),
    ));
    let stats = Arc::new(StatsCounters::default());

    let (events, events_rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn PlaybackSink> = match sink {
        SinkKind::Overlay => Arc::new(OverlaySink::new(events.clone())),
        SinkKind::Timed => Arc::new(TimedSink::new()),
        SinkKind::Custom(sink) => sink,
    };
    let broadcaster = Broadcaster::spawn(events_rx);

    let pipeline = SynthesisPipeline {
        cache: Arc::clone(&cache),
        registry: Arc::clone(&registry),
        cost: Arc::clone(&cost),
        stats: Arc::clone(&stats),
    };
    let (processor, processor_task) = spawn_processor(
        ProcessorConfig::from_settings(&settings),
        pipeline,
        Arc::clone(&sink),
        events.clone(),
    );
    let sweeper = cache.start_sweeper(settings.cache_sweep_interval());

    info!(
        target: "chatvox.service",
        engines = ?registry.order(),
        max_queue_size = settings.max_queue_size,
        "TTS service started"
    );

    Ok(TtsService {
        gate: PermissionGate::new(permissions, GatePolicy::from_settings(&settings)),
        limiter: RateLimiter::new(rate_limit_config(&settings)),
        settings: RwLock::new(settings),
        cache,
        registry,
        cost,
        stats,
        processor,
        sink,
        events,
        broadcaster: Mutex::new(Some(broadcaster)),
        background: tokio::sync::Mutex::new(Some(Background {
            processor: processor_task,
            sweeper,
        })),
        update_lock: tokio::sync::Mutex::new(()),
    })
}

const fn cache_config(settings: &TtsSettings) -> CacheConfig {
    CacheConfig {
        ttl: settings.cache_ttl(),
        max_bytes: settings.cache_max_bytes,
    }
}

const fn rate_limit_config(settings: &TtsSettings) -> RateLimitConfig {
    RateLimitConfig {
        limit: settings.rate_limit,
        window: settings.rate_limit_window(),
    }
}

impl TtsService {
    /// Admit a speak trigger and queue it.
    ///
    /// Operator sources (admin, test) skip the permission gate and the rate
    /// limiter. Rejections are published as `requestFinished` events.
    pub async fn speak(&self, trigger: SpeakTrigger) -> Result<SpeakReceipt, TtsError> {
        self.stats.incr(Counter::Received);
        let (max_len, default_voice) = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            (settings.max_text_length, settings.default_voice.clone())
        };
        let Some(text) = prepare_text(&trigger.text, max_len) else {
            return Err(TtsError::EmptyText);
        };

        let requested_voice = trigger.requested_voice.clone();
        let operator = trigger.source.is_operator();
        let mut request = TtsRequest::from_trigger(trigger, text, None);

        let mut assigned_voice = None;
        if !operator {
            match self.gate.check(&request.user_id, &request.username).await? {
                GateDecision::Allowed(record) => assigned_voice = record.assigned_voice,
                GateDecision::Denied(reason) => {
                    return Err(self.reject(
                        request,
                        RequestStatus::Denied,
                        TtsError::permission_denied(reason),
                    ));
                }
            }
            if let Admission::Rejected { retry_after } = self.limiter.try_admit(&request.user_id) {
                let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                return Err(self.reject(
                    request,
                    RequestStatus::RateLimited,
                    TtsError::RateLimited { retry_after_ms },
                ));
            }
        }

        request.requested_voice = requested_voice.or(assigned_voice).or(default_voice);
        let id = request.id;
        let position = self.processor.enqueue(request).await?;
        debug!(target: "chatvox.service", request_id = %id, position, "Request queued");
        Ok(SpeakReceipt { id, position })
    }

    fn reject(&self, mut request: TtsRequest, status: RequestStatus, error: TtsError) -> TtsError {
        request.transition(status);
        self.stats.incr(if status == RequestStatus::Denied {
            Counter::Denied
        } else {
            Counter::RateLimited
        });
        let _ = self
            .events
            .send(TtsEvent::finished(request.id, status, Some(error.to_string())));
        let _ = self.events.send(TtsEvent::stats(self.stats.snapshot()));
        error
    }

    /// Cancel the current item. Returns `false` when idle.
    pub async fn skip(&self) -> Result<bool, TtsError> {
        self.processor.skip().await
    }

    /// Drop all pending items. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, TtsError> {
        self.processor.clear().await
    }

    pub async fn pause(&self) -> Result<(), TtsError> {
        self.processor.pause().await
    }

    pub async fn resume(&self) -> Result<(), TtsError> {
        self.processor.resume().await
    }

    /// Completion signal from an overlay.
    pub fn playback_finished(&self, id: RequestId) {
        self.sink.playback_finished(id);
    }

    pub fn subscribe(&self) -> Result<Subscription, TtsError> {
        self.broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Broadcaster::subscribe)
            .ok_or(TtsError::ServiceStopped)
    }

    pub async fn status(&self) -> Result<ProcessorStatus, TtsError> {
        self.processor.status().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn cost_stats(&self) -> CostStats {
        self.cost.stats().await
    }

    pub async fn permission_stats(&self) -> Result<PermissionStats, TtsError> {
        Ok(self.gate.stats().await?)
    }

    pub fn engine_status(&self) -> Vec<EngineStatus> {
        self.registry.status()
    }

    /// Apply an operator change to a user's permission record.
    pub async fn set_user(
        &self,
        user_id: &str,
        username: &str,
        change: &PermissionChange,
    ) -> Result<UserPermission, TtsError> {
        Ok(self.gate.apply(user_id, username, change).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserPermission>, TtsError> {
        Ok(self.gate.list().await?)
    }

    /// Enable or disable an engine. Returns `false` for unknown engines.
    pub fn set_engine_enabled(&self, engine: &EngineId, enabled: bool) -> bool {
        let known = self.registry.set_enabled(engine, enabled);
        if known {
            info!(target: "chatvox.service", engine = %engine, enabled, "Engine toggled");
        }
        known
    }

    pub fn settings(&self) -> TtsSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge, validate and apply a partial settings update.
    ///
    /// An invalid update is rejected whole and nothing changes. Concurrent
    /// updates are applied one at a time, each on top of the last.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<TtsSettings, TtsError> {
        let _serialized = self.update_lock.lock().await;
        let previous = self.settings();
        let mut next = previous.clone();
        next.merge(&update);
        validate_settings(&next)?;

        // The only step that can fail; nothing else has changed yet.
        self.processor
            .configure(ProcessorConfig::from_settings(&next))
            .await?;
        self.gate.set_policy(GatePolicy::from_settings(&next));
        self.limiter.set_config(rate_limit_config(&next));
        self.cache.set_config(cache_config(&next));
        self.registry.set_order(&next.engine_order);
        self.registry.set_attempt_timeout(next.attempt_timeout());
        self.registry.set_circuit_settings(&next.circuit);
        self.cost.set_budget(next.budget.clone());

        if next.cache_max_bytes < previous.cache_max_bytes
            || next.cache_ttl_secs < previous.cache_ttl_secs
        {
            self.cache.sweep().await;
        }
        if next.cache_sweep_interval_secs != previous.cache_sweep_interval_secs {
            self.restart_sweeper(&next).await;
        }

        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        info!(target: "chatvox.service", "Settings updated");
        Ok(next)
    }

    async fn restart_sweeper(&self, settings: &TtsSettings) {
        let mut background = self.background.lock().await;
        if let Some(background) = background.as_mut() {
            let sweeper = self.cache.start_sweeper(settings.cache_sweep_interval());
            std::mem::replace(&mut background.sweeper, sweeper)
                .shutdown()
                .await;
        }
    }

    /// Stop playback and background tasks, discarding pending requests.
    ///
    /// Returns the number of pending requests discarded. Idempotent: a second
    /// call returns 0.
    pub async fn shutdown(&self) -> usize {
        let Some(background) = self.background.lock().await.take() else {
            return 0;
        };
        let discarded = match self.processor.shutdown().await {
            Ok(discarded) => discarded,
            Err(e) => {
                warn!(target: "chatvox.service", error = %e, "Processor already stopped");
                0
            }
        };
        let _ = background.processor.await;
        background.sweeper.shutdown().await;

        if let Err(e) = self.cache.flush().await {
            warn!(target: "chatvox.service", error = %e, "Failed to flush cache index");
        }

        let broadcaster = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(broadcaster) = broadcaster {
            broadcaster.shutdown().await;
        }
        info!(target: "chatvox.service", discarded, "TTS service stopped");
        discarded
    }
}
