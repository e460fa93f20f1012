//! Content-addressed cache keys and index entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audio::EngineId;

/// SHA-256 hex digest of (normalized text, voice, engine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a phrase.
    ///
    /// Text is trimmed and case-folded so that "Hello" and " hello " share
    /// audio. Fields are separated by a NUL byte, which cannot appear in a
    /// voice or engine identifier.
    pub fn derive(text: &str, voice: Option<&str>, engine: &EngineId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(text).as_bytes());
        hasher.update([0]);
        hasher.update(voice.unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(engine.as_str().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text form used for cache addressing.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Metadata for one cached blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub engine: EngineId,
    pub mime: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub use_count: u64,
}

impl CacheEntry {
    pub fn new(key: CacheKey, engine: EngineId, mime: String, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            engine,
            mime,
            size_bytes,
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }

    /// Record a hit.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_used_at = now;
        self.use_count += 1;
    }

    /// Whether the entry has been idle for longer than `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_used_at > ttl
    }
}

/// Cache counters for status reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub ttl_evictions: u64,
    pub lru_evictions: u64,
    pub write_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalizes_text() {
        let engine = EngineId::from("google");
        assert_eq!(
            CacheKey::derive("  Hello World ", Some("v1"), &engine),
            CacheKey::derive("hello world", Some("v1"), &engine)
        );
    }

    #[test]
    fn test_key_distinguishes_voice_and_engine() {
        let a = EngineId::from("a");
        let b = EngineId::from("b");
        let base = CacheKey::derive("hi", Some("v1"), &a);
        assert_ne!(base, CacheKey::derive("hi", Some("v2"), &a));
        assert_ne!(base, CacheKey::derive("hi", Some("v1"), &b));
        assert_ne!(base, CacheKey::derive("hi", None, &a));
        assert_eq!(base.as_str().len(), 64);
    }

    #[test]
    fn test_expiry() {
        let mut entry = CacheEntry::new(
            CacheKey::derive("x", None, &EngineId::from("e")),
            EngineId::from("e"),
            "audio/mpeg".into(),
            10,
        );
        let later = entry.last_used_at + chrono::Duration::seconds(120);
        assert!(entry.is_expired(later, chrono::Duration::seconds(60)));
        entry.touch(later);
        assert_eq!(entry.use_count, 1);
        assert!(!entry.is_expired(later, chrono::Duration::seconds(60)));
    }
}
