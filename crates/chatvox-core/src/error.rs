//! Error types for the speech orchestrator.
//!
//! These errors are designed to be serializable so they can be reported back
//! to the request source (chat reply, admin panel) without depending on
//! non-serializable types like `std::io::Error` or `reqwest::Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::EngineId;

/// Failure of a single provider attempt.
///
/// Every variant triggers fallback to the next engine in the chain.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// The attempt exceeded its time budget.
    #[error("timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Credentials were rejected (HTTP 401/403 or equivalent).
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// The provider throttled us (HTTP 429 or equivalent).
    #[error("rate limited by provider")]
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// The provider failed on its side (HTTP 5xx, unexpected status).
    #[error("server error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Server {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        message: String,
    },

    /// The request never got a response (DNS, connect, TLS).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered but the payload was unusable.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ProviderError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Map an HTTP status code to the provider error taxonomy.
    ///
    /// Returns `None` for success codes.
    pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::auth(body)),
            429 => Some(Self::RateLimited {
                retry_after_secs: None,
            }),
            _ => Some(Self::server(Some(status), body)),
        }
    }
}

/// One failed engine attempt inside a fallback walk.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineAttempt {
    pub engine: EngineId,
    pub error: ProviderError,
}

/// Why the permission gate refused a user.
#[derive(Clone, Copy, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// Chat TTS is restricted and the user is not explicitly allowed.
    #[error("user is not whitelisted for TTS")]
    NotWhitelisted,

    /// The user has been blacklisted by an operator.
    #[error("user is blacklisted")]
    Blacklisted,

    /// The user's team level is below the configured minimum.
    #[error("team level {level} is below required level {required}")]
    BelowTeamLevel { level: u8, required: u8 },
}

/// Error type for speech orchestration.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TtsError {
    /// Nothing speakable was left after text preparation.
    #[error("Empty text")]
    EmptyText,

    /// Permission gate refused the user.
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: DenyReason },

    /// The user exceeded their rate limit.
    #[error("Rate limited: retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Queue is full and the request could not displace anything.
    #[error("Queue full: maximum {max_size} requests allowed")]
    QueueFull { max_size: u32 },

    /// A provider attempt timed out.
    #[error("Provider '{engine}' timed out after {timeout_ms} ms")]
    ProviderTimeout { engine: EngineId, timeout_ms: u64 },

    /// A provider rejected our credentials.
    #[error("Provider '{engine}' rejected credentials: {message}")]
    ProviderAuthError { engine: EngineId, message: String },

    /// A provider throttled us.
    #[error("Provider '{engine}' rate limited the request")]
    ProviderRateLimited { engine: EngineId },

    /// A provider failed on its side or returned garbage.
    #[error("Provider '{engine}' failed: {message}")]
    ProviderServerError { engine: EngineId, message: String },

    /// Every engine in the chain was open, disabled, or failed.
    #[error("All engines exhausted ({} attempt(s))", .attempts.len())]
    AllEnginesExhausted { attempts: Vec<EngineAttempt> },

    /// The synthesis task ended without producing a result.
    #[error("Synthesis task crashed: {message}")]
    SynthesisCrashed { message: String },

    /// Synthesized audio could not be written to the cache (non-fatal).
    #[error("Cache write failed: {message}")]
    CacheWriteFailure { message: String },

    /// A persistence collaborator failed.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// A settings update failed validation.
    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    /// The processor is no longer running.
    #[error("Speech service is stopped")]
    ServiceStopped,
}

impl TtsError {
    #[must_use]
    pub const fn permission_denied(reason: DenyReason) -> Self {
        Self::PermissionDenied { reason }
    }

    #[must_use]
    pub const fn queue_full(max_size: u32) -> Self {
        Self::QueueFull { max_size }
    }

    pub fn cache_write(message: impl Into<String>) -> Self {
        Self::CacheWriteFailure {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Classify a single provider failure.
    #[must_use]
    pub fn from_provider(engine: EngineId, error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout { timeout_ms } => Self::ProviderTimeout { engine, timeout_ms },
            ProviderError::Auth { message } => Self::ProviderAuthError { engine, message },
            ProviderError::RateLimited { .. } => Self::ProviderRateLimited { engine },
            other @ (ProviderError::Server { .. }
            | ProviderError::Transport { .. }
            | ProviderError::InvalidResponse { .. }) => Self::ProviderServerError {
                engine,
                message: other.to_string(),
            },
        }
    }

    /// Admission failures are terminal for the request and never retried.
    #[must_use]
    pub const fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyText
                | Self::PermissionDenied { .. }
                | Self::RateLimited { .. }
                | Self::QueueFull { .. }
        )
    }

    /// Convert to a message suitable for a chat reply or admin toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyText => "Nothing to say.".to_string(),
            Self::PermissionDenied {
                reason: DenyReason::Blacklisted,
            } => "You are not allowed to use TTS.".to_string(),
            Self::PermissionDenied {
                reason: DenyReason::NotWhitelisted,
            } => "TTS is restricted to approved users.".to_string(),
            Self::PermissionDenied {
                reason: DenyReason::BelowTeamLevel { required, .. },
            } => format!("TTS requires team level {required}."),
            Self::RateLimited { retry_after_ms } => {
                format!(
                    "Slow down! Try again in {} s.",
                    retry_after_ms.div_ceil(1000)
                )
            }
            Self::QueueFull { .. } => "The TTS queue is full, try again later.".to_string(),
            Self::ProviderTimeout { .. }
            | Self::ProviderAuthError { .. }
            | Self::ProviderRateLimited { .. }
            | Self::ProviderServerError { .. }
            | Self::AllEnginesExhausted { .. }
            | Self::SynthesisCrashed { .. } => {
                "Speech could not be generated right now.".to_string()
            }
            Self::CacheWriteFailure { .. } | Self::Storage { .. } => {
                "Internal storage problem.".to_string()
            }
            Self::InvalidSettings { message } => format!("Invalid settings: {message}"),
            Self::ServiceStopped => "TTS is not running.".to_string(),
        }
    }
}

/// Convenience result type for speech operations.
pub type TtsResult<T> = Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProviderError::from_status(200, ""), None);
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            Some(ProviderError::Auth { .. })
        ));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            Some(ProviderError::RateLimited { .. })
        ));
        assert!(matches!(
            ProviderError::from_status(503, "down"),
            Some(ProviderError::Server {
                status: Some(503),
                ..
            })
        ));
    }

    #[test]
    fn test_from_provider_classification() {
        let engine = EngineId::from("speechify");
        assert!(matches!(
            TtsError::from_provider(engine.clone(), ProviderError::Timeout { timeout_ms: 5 }),
            TtsError::ProviderTimeout { timeout_ms: 5, .. }
        ));
        assert!(matches!(
            TtsError::from_provider(engine, ProviderError::transport("dns")),
            TtsError::ProviderServerError { .. }
        ));
    }

    #[test]
    fn test_error_serialization() {
        let err = TtsError::AllEnginesExhausted {
            attempts: vec![EngineAttempt {
                engine: EngineId::from("google"),
                error: ProviderError::server(Some(500), "boom"),
            }],
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("all_engines_exhausted"));
        assert!(json.contains("google"));

        let parsed: TtsError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_admission_classification() {
        assert!(TtsError::queue_full(3).is_admission_failure());
        assert!(TtsError::RateLimited { retry_after_ms: 10 }.is_admission_failure());
        assert!(!TtsError::ServiceStopped.is_admission_failure());
    }

    #[test]
    fn test_user_messages() {
        let msg = TtsError::RateLimited {
            retry_after_ms: 1500,
        }
        .user_message();
        assert!(msg.contains("2 s"));
        assert!(
            TtsError::permission_denied(DenyReason::BelowTeamLevel {
                level: 0,
                required: 2
            })
            .user_message()
            .contains('2')
        );
    }
}
