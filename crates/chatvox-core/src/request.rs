//! Speak request domain types.
//!
//! A [`SpeakTrigger`] is what a collaborator (chat ingestion, gift handler,
//! admin panel) hands to the service. Once the text has been prepared it
//! becomes a [`TtsRequest`], which carries its own [`RequestStatus`] through
//! the lifecycle:
//!
//! ```text
//! Received ─┬─ Denied | RateLimited | Dropped            (terminal)
//!           └─ Enqueued → Synthesizing ─┬─ Failed        (terminal)
//!                                       └─ Playing ─┬─ Completed (terminal)
//!                                                   └─ Skipped | Failed (terminal)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::EngineId;

/// Unique identifier of a single speak request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    /// Generate a fresh random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Where a speak request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    /// A viewer chat message.
    Chat,
    /// A message attached to a gift.
    Gift,
    /// An operator action from the admin surface.
    Admin,
    /// A test action (voice preview, diagnostics).
    Test,
}

impl RequestSource {
    /// Priority assigned when the trigger does not carry an explicit one.
    #[must_use]
    pub const fn default_priority(self) -> Priority {
        match self {
            Self::Chat => Priority::Normal,
            Self::Gift => Priority::Elevated,
            Self::Admin | Self::Test => Priority::High,
        }
    }

    /// Operator sources skip permission and rate-limit checks.
    #[must_use]
    pub const fn is_operator(self) -> bool {
        matches!(self, Self::Admin | Self::Test)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Gift => "gift",
            Self::Admin => "admin",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue priority tier. Higher tiers are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    Elevated,
    High,
}

/// Lifecycle status of a [`TtsRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    Received,
    Enqueued,
    Synthesizing,
    Playing,
    Completed,
    Dropped,
    Failed,
    Denied,
    RateLimited,
    Skipped,
}

impl RequestStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Dropped
                | Self::Failed
                | Self::Denied
                | Self::RateLimited
                | Self::Skipped
        )
    }

    /// Whether `self → next` is a legal lifecycle step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Received,
                Self::Denied | Self::RateLimited | Self::Enqueued | Self::Dropped
            ) | (Self::Enqueued, Self::Synthesizing | Self::Dropped)
                | (Self::Synthesizing, Self::Playing | Self::Failed | Self::Skipped)
                | (Self::Playing, Self::Completed | Self::Skipped | Self::Failed)
        )
    }
}

/// An inbound request to speak some text, before admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakTrigger {
    pub user_id: String,
    pub username: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_engine: Option<EngineId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_id: Option<String>,
    pub source: RequestSource,
    /// Overrides the source's default priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl SpeakTrigger {
    /// Create a trigger from an arbitrary source.
    pub fn new(
        source: RequestSource,
        user_id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            text: text.into(),
            requested_voice: None,
            requested_engine: None,
            gift_id: None,
            source,
            priority: None,
        }
    }

    /// A chat message trigger.
    pub fn chat(
        user_id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(RequestSource::Chat, user_id, username, text)
    }

    /// A gift message trigger.
    pub fn gift(
        user_id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
        gift_id: impl Into<String>,
    ) -> Self {
        let mut trigger = Self::new(RequestSource::Gift, user_id, username, text);
        trigger.gift_id = Some(gift_id.into());
        trigger
    }

    /// An operator-submitted manual request.
    pub fn admin(text: impl Into<String>) -> Self {
        Self::new(RequestSource::Admin, "admin", "admin", text)
    }

    /// An operator test request (voice preview etc.).
    pub fn test(text: impl Into<String>) -> Self {
        Self::new(RequestSource::Test, "test", "test", text)
    }

    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.requested_voice = Some(voice.into());
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<EngineId>) -> Self {
        self.requested_engine = Some(engine.into());
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Effective queue priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
            .unwrap_or_else(|| self.source.default_priority())
    }
}

/// An admitted speak request travelling through queue and processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsRequest {
    pub id: RequestId,
    pub user_id: String,
    pub username: String,
    /// Prepared text (see [`prepare_text`]).
    pub text: String,
    pub requested_voice: Option<String>,
    pub requested_engine: Option<EngineId>,
    pub source: RequestSource,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    pub status: RequestStatus,
}

impl TtsRequest {
    /// Build a request from a trigger whose text has already been prepared.
    ///
    /// `voice` is the resolved voice (requested → assigned → default).
    pub fn from_trigger(trigger: SpeakTrigger, text: String, voice: Option<String>) -> Self {
        let priority = trigger.priority();
        Self {
            id: RequestId::new(),
            user_id: trigger.user_id,
            username: trigger.username,
            text,
            requested_voice: voice,
            requested_engine: trigger.requested_engine,
            source: trigger.source,
            priority,
            enqueued_at: Utc::now(),
            status: RequestStatus::Received,
        }
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Returns `false` (and leaves the status unchanged) for illegal steps.
    pub fn transition(&mut self, next: RequestStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Number of characters billed for this request.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Normalise inbound text for speaking.
///
/// Collapses runs of whitespace to single spaces, trims, and truncates to at
/// most `max_chars` characters. Returns `None` when nothing speakable is left.
pub fn prepare_text(raw: &str, max_chars: usize) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    let prepared = match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    };
    (!prepared.is_empty()).then_some(prepared)
}
