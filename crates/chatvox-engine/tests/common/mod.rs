//! Shared fixtures for service-level tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chatvox_core::{
    PlaybackClip, PlaybackError, PlaybackSink, RequestId, RequestStatus, SynthesisProvider,
    TtsEvent, TtsSettings,
};
use chatvox_engine::{SinkKind, Subscription, TtsService, TtsServiceDeps, build_tts_service};
use chatvox_store::StoreFactory;
use tokio::sync::Notify;

/// Settings suited to paused-clock tests.
pub fn settings(engine_order: &[&str]) -> TtsSettings {
    TtsSettings {
        engine_order: engine_order.iter().map(|id| (*id).into()).collect(),
        attempt_timeout_ms: 1_000,
        ..TtsSettings::default()
    }
}

pub async fn service(
    settings: TtsSettings,
    providers: Vec<Arc<dyn SynthesisProvider>>,
    sink: SinkKind,
) -> TtsService {
    let stores = StoreFactory::in_memory();
    build_tts_service(TtsServiceDeps {
        settings,
        providers,
        permissions: stores.permissions,
        ledger: stores.ledger,
        cache: stores.cache,
        sink,
    })
    .await
    .unwrap()
}

/// Collect `requestFinished` events until `n` have arrived.
pub async fn finished(sub: &mut Subscription, n: usize) -> Vec<(RequestId, RequestStatus)> {
    let mut out = Vec::new();
    while out.len() < n {
        if let TtsEvent::RequestFinished {
            request_id, status, ..
        } = sub.events.recv().await.unwrap()
        {
            out.push((request_id, status));
        }
    }
    out
}

/// Sink that records clips and blocks until released or stopped.
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<RequestId>>,
    release: Notify,
}

impl RecordingSink {
    pub fn played(&self) -> Vec<RequestId> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Let the current clip finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn play(&self, clip: &PlaybackClip) -> Result<(), PlaybackError> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(clip.request_id);
        self.release.notified().await;
        Ok(())
    }

    fn stop(&self) {
        self.release.notify_waiters();
    }
}
