//! Events published by the queue processor.
//!
//! The processor owns an outbound channel of [`TtsEvent`]s; the broadcaster
//! subscribes to it and fans events out to overlays and dashboards.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "nowPlaying", "item": { "id": "…", "username": "alice", … } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::EngineId;
use crate::request::{Priority, RequestId, RequestSource, RequestStatus, TtsRequest};

/// A pending request as shown in queue previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequestDto {
    pub id: RequestId,
    pub username: String,
    pub text: String,
    pub source: RequestSource,
    pub priority: Priority,
    /// 1-based position among pending requests.
    pub position: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedRequestDto {
    pub fn from_request(request: &TtsRequest, position: u32) -> Self {
        Self {
            id: request.id,
            username: request.username.clone(),
            text: request.text.clone(),
            source: request.source,
            priority: request.priority,
            position,
            enqueued_at: request.enqueued_at,
        }
    }
}

/// The request currently holding the audio output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingDto {
    pub id: RequestId,
    pub username: String,
    pub text: String,
    pub source: RequestSource,
    /// Only populated when engine diagnostics are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineId>,
    pub from_cache: bool,
    pub started_at: DateTime<Utc>,
}

/// Counters describing processor activity since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStats {
    pub received: u64,
    pub admitted: u64,
    pub denied: u64,
    pub rate_limited: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Snapshot of the queue for `queueUpdate` events and status reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Number of pending (not playing) requests.
    pub depth: usize,
    pub max_size: u32,
    pub paused: bool,
    /// The next few pending requests in dequeue order.
    pub next: Vec<QueuedRequestDto>,
}

/// Events emitted by the queue processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TtsEvent {
    /// Queue contents changed.
    QueueUpdate { snapshot: QueueSnapshot },

    /// The now-playing slot changed (`None` = idle).
    NowPlaying { item: Option<NowPlayingDto> },

    /// Counters changed.
    StatsUpdate { stats: ProcessorStats },

    /// Audio for an overlay to play.
    PlayAudio {
        request_id: RequestId,
        mime: String,
        audio_base64: String,
    },

    /// Overlay should stop the given request's audio immediately.
    StopAudio { request_id: RequestId },

    /// A request reached a terminal status.
    RequestFinished {
        request_id: RequestId,
        status: RequestStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl TtsEvent {
    pub const fn queue_update(snapshot: QueueSnapshot) -> Self {
        Self::QueueUpdate { snapshot }
    }

    pub const fn now_playing(item: Option<NowPlayingDto>) -> Self {
        Self::NowPlaying { item }
    }

    pub const fn stats(stats: ProcessorStats) -> Self {
        Self::StatsUpdate { stats }
    }

    pub fn finished(request_id: RequestId, status: RequestStatus, detail: Option<String>) -> Self {
        Self::RequestFinished {
            request_id,
            status,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = TtsEvent::now_playing(None);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"nowPlaying","item":null}"#);
    }

    #[test]
    fn test_finished_event_uses_camel_case_fields() {
        let id = RequestId::new();
        let event = TtsEvent::finished(id, RequestStatus::RateLimited, None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"requestFinished""#));
        assert!(json.contains(r#""requestId""#));
        assert!(json.contains(r#""status":"rateLimited""#));
        assert!(!json.contains("detail"));
    }
}
