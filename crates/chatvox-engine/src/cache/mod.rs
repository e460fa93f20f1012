//! Content-addressed synthesis cache.
//!
//! The index (key → [`CacheEntry`]) lives in memory behind a single async
//! mutex and is persisted as a whole through the [`CacheStore`]; blobs are
//! read and written individually. Blob I/O never happens while the index
//! lock is held.
//!
//! Invariants:
//! - total indexed bytes ≤ `max_bytes` after every `store` and sweep
//! - entries idle for longer than `ttl` are never served
//!
//! Concurrent stores of the same key are last-write-wins.

mod sweeper;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chatvox_core::{
    CacheEntry, CacheKey, CacheStats, CacheStore, EngineId, StoreError, SynthesizedAudio,
    TtsError,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use sweeper::SweeperHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_bytes: u64,
}

/// A cache hit.
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub audio: SynthesizedAudio,
    /// Engine that originally produced the audio.
    pub engine: EngineId,
}

/// Counts from one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
}

#[derive(Default)]
struct CacheIndex {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: u64,
}

impl CacheIndex {
    fn insert(&mut self, entry: CacheEntry) {
        self.total_bytes += entry.size_bytes;
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.total_bytes -= old.size_bytes;
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn expired_keys(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> Vec<CacheKey> {
        self.entries
            .values()
            .filter(|entry| entry.is_expired(now, ttl))
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Least-recently-used keys whose removal brings the total under `max_bytes`.
    fn lru_overflow(&self, max_bytes: u64) -> Vec<CacheKey> {
        if self.total_bytes <= max_bytes {
            return Vec::new();
        }
        let mut by_age: Vec<&CacheEntry> = self.entries.values().collect();
        by_age.sort_by_key(|entry| (entry.last_used_at, entry.use_count));

        let mut excess = self.total_bytes - max_bytes;
        let mut victims = Vec::new();
        for entry in by_age {
            if excess == 0 {
                break;
            }
            excess = excess.saturating_sub(entry.size_bytes);
            victims.push(entry.key.clone());
        }
        victims
    }

    fn snapshot(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    ttl_evictions: AtomicU64,
    lru_evictions: AtomicU64,
    write_failures: AtomicU64,
}

pub struct SynthesisCache {
    store: Arc<dyn CacheStore>,
    index: Mutex<CacheIndex>,
    config: RwLock<CacheConfig>,
    counters: Counters,
}

impl SynthesisCache {
    /// Open the cache, loading the persisted index.
    ///
    /// The loaded index is trimmed to the configured bound immediately.
    pub async fn open(store: Arc<dyn CacheStore>, config: CacheConfig) -> Result<Self, StoreError> {
        let mut index = CacheIndex::default();
        for entry in store.load_index().await? {
            index.insert(entry);
        }
        debug!(
            target: "chatvox.cache",
            entries = index.entries.len(),
            bytes = index.total_bytes,
            "Cache index loaded"
        );

        let cache = Self {
            store,
            index: Mutex::new(index),
            config: RwLock::new(config),
            counters: Counters::default(),
        };
        cache.sweep().await;
        Ok(cache)
    }

    pub fn config(&self) -> CacheConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change TTL and size bound. Takes effect on the next store or sweep.
    pub fn set_config(&self, config: CacheConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Look up audio for exactly one engine.
    pub async fn lookup(
        &self,
        text: &str,
        voice: Option<&str>,
        engine: &EngineId,
    ) -> Option<SynthesizedAudio> {
        self.lookup_any(text, voice, std::slice::from_ref(engine))
            .await
            .map(|hit| hit.audio)
    }

    /// Look up audio produced by any of `engines`, in order.
    pub async fn lookup_any(
        &self,
        text: &str,
        voice: Option<&str>,
        engines: &[EngineId],
    ) -> Option<CachedAudio> {
        for engine in engines {
            let key = CacheKey::derive(text, voice, engine);
            if let Some(audio) = self.read(&key).await {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(target: "chatvox.cache", %key, %engine, "Cache hit");
                return Some(CachedAudio {
                    audio,
                    engine: engine.clone(),
                });
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn read(&self, key: &CacheKey) -> Option<SynthesizedAudio> {
        let ttl = self.ttl();
        let mime = {
            let index = self.index.lock().await;
            let entry = index.entries.get(key)?;
            if entry.is_expired(Utc::now(), ttl) {
                return None;
            }
            entry.mime.clone()
        };

        match self.store.read_blob(key).await {
            Ok(bytes) => {
                if let Some(entry) = self.index.lock().await.entries.get_mut(key) {
                    entry.touch(Utc::now());
                }
                Some(SynthesizedAudio::new(bytes, mime))
            }
            Err(e) => {
                warn!(target: "chatvox.cache", %key, error = %e, "Cached blob unreadable, dropping entry");
                self.index.lock().await.remove(key);
                None
            }
        }
    }

    /// Store audio for a phrase.
    ///
    /// Failures are counted and returned as [`TtsError::CacheWriteFailure`];
    /// callers treat them as non-fatal.
    pub async fn store(
        &self,
        text: &str,
        voice: Option<&str>,
        engine: &EngineId,
        audio: &SynthesizedAudio,
    ) -> Result<(), TtsError> {
        let config = self.config();
        let size = audio.len() as u64;
        if size == 0 || size > config.max_bytes {
            debug!(target: "chatvox.cache", size, "Audio not cacheable, skipping");
            return Ok(());
        }

        let key = CacheKey::derive(text, voice, engine);
        if let Err(e) = self.store.write_blob(&key, audio.bytes.clone()).await {
            return Err(self.write_failed(&key, &e));
        }

        let (victims, snapshot) = {
            let mut index = self.index.lock().await;
            index.insert(CacheEntry::new(
                key.clone(),
                engine.clone(),
                audio.mime.clone(),
                size,
            ));
            let victims = index.lru_overflow(config.max_bytes);
            for victim in &victims {
                index.remove(victim);
            }
            (victims, index.snapshot())
        };
        self.counters
            .lru_evictions
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        self.remove_blobs(&victims).await;

        self.store
            .save_index(&snapshot)
            .await
            .map_err(|e| self.write_failed(&key, &e))
    }

    fn write_failed(&self, key: &CacheKey, error: &StoreError) -> TtsError {
        self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
        warn!(target: "chatvox.cache", %key, %error, "Cache write failed");
        TtsError::cache_write(error.to_string())
    }

    /// Evict idle entries, then least-recently-used entries until the cache
    /// is under its size bound.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let config = self.config();
        let ttl = self.ttl();

        let (expired, evicted, snapshot) = {
            let mut index = self.index.lock().await;
            let expired = index.expired_keys(now, ttl);
            for key in &expired {
                index.remove(key);
            }
            let evicted = index.lru_overflow(config.max_bytes);
            for key in &evicted {
                index.remove(key);
            }
            (expired, evicted, index.snapshot())
        };

        let report = SweepReport {
            expired: expired.len(),
            evicted: evicted.len(),
        };
        if report == SweepReport::default() {
            return report;
        }

        self.counters
            .ttl_evictions
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        self.counters
            .lru_evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        self.remove_blobs(&expired).await;
        self.remove_blobs(&evicted).await;
        if let Err(e) = self.store.save_index(&snapshot).await {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(target: "chatvox.cache", error = %e, "Failed to persist cache index after sweep");
        }

        debug!(
            target: "chatvox.cache",
            expired = report.expired,
            evicted = report.evicted,
            "Cache sweep finished"
        );
        report
    }

    /// Persist the index, including hit metadata gathered since the last write.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.index.lock().await.snapshot();
        self.store.save_index(&snapshot).await
    }

    pub async fn stats(&self) -> CacheStats {
        let (entries, total_bytes) = {
            let index = self.index.lock().await;
            (index.entries.len(), index.total_bytes)
        };
        CacheStats {
            entries,
            total_bytes,
            max_bytes: self.config().max_bytes,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            ttl_evictions: self.counters.ttl_evictions.load(Ordering::Relaxed),
            lru_evictions: self.counters.lru_evictions.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Start the periodic sweep task. The returned handle owns the task.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        SweeperHandle::spawn(Arc::clone(self), interval)
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config().ttl).unwrap_or(chrono::Duration::MAX)
    }

    async fn remove_blobs(&self, keys: &[CacheKey]) {
        for key in keys {
            if let Err(e) = self.store.remove_blob(key).await {
                warn!(target: "chatvox.cache", %key, error = %e, "Failed to remove cached blob");
            }
        }
    }
}
