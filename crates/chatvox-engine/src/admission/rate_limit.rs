//! Per-user fixed-window rate limiting.
//!
//! Each user owns a window that starts at their first admission and allows at
//! most `limit` admissions until it expires; the next call after expiry opens
//! a fresh window. Lock order: the user map is held only long enough to find
//! or create the user's slot, then released before the slot is locked, so
//! distinct users never contend on the counter itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

/// Windows are pruned once the map grows beyond this many users.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

/// Result of [`RateLimiter::try_admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32 },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RwLock<RateLimitConfig>,
    windows: Mutex<HashMap<String, Arc<Mutex<Window>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: RwLock::new(config),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change limit and window length. Open windows keep their start time.
    pub fn set_config(&self, config: RateLimitConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn try_admit(&self, user_id: &str) -> Admission {
        self.try_admit_at(user_id, Instant::now())
    }

    pub fn try_admit_at(&self, user_id: &str, now: Instant) -> Admission {
        let config = self.config();
        let slot = self.slot(user_id, now, config.window);

        let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(window.started) >= config.window {
            window.started = now;
            window.count = 0;
        }

        if window.count < config.limit {
            window.count += 1;
            Admission::Admitted {
                remaining: config.limit - window.count,
            }
        } else {
            let retry_after = window
                .started
                .checked_add(config.window)
                .map_or(config.window, |expiry| expiry.saturating_duration_since(now));
            Admission::Rejected { retry_after }
        }
    }

    /// Number of users with a tracked window.
    pub fn tracked_users(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, user_id: &str, now: Instant, window: Duration) -> Arc<Mutex<Window>> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, slot| {
                slot.lock()
                    .map(|w| now.saturating_duration_since(w.started) < window)
                    .unwrap_or(false)
            });
        }

        Arc::clone(windows.entry(user_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Window {
                started: now,
                count: 0,
            }))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            limit,
            window: Duration::from_secs(secs),
        })
    }

    #[tokio::test]
    async fn rejects_excess_and_readmits_after_window() {
        let limiter = limiter(3, 60);
        let start = Instant::now();

        for i in 0..3 {
            assert!(
                limiter
                    .try_admit_at("alice", start + Duration::from_secs(i))
                    .is_admitted()
            );
        }
        assert_eq!(
            limiter.try_admit_at("alice", start + Duration::from_secs(10)),
            Admission::Rejected {
                retry_after: Duration::from_secs(50)
            }
        );

        assert_eq!(
            limiter.try_admit_at("alice", start + Duration::from_secs(60)),
            Admission::Admitted { remaining: 2 }
        );
    }

    #[tokio::test]
    async fn users_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.try_admit_at("a", now).is_admitted());
        assert!(!limiter.try_admit_at("a", now).is_admitted());
        assert!(limiter.try_admit_at("b", now).is_admitted());
        assert_eq!(limiter.tracked_users(), 2);
    }

    #[tokio::test]
    async fn concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(limiter(5, 60));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.try_admit("same-user").is_admitted()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn huge_window_rejects_without_overflow() {
        let limiter = limiter(1, u64::MAX / 2);
        let now = Instant::now();
        assert!(limiter.try_admit_at("u", now).is_admitted());
        assert_eq!(
            limiter.try_admit_at("u", now),
            Admission::Rejected {
                retry_after: Duration::from_secs(u64::MAX / 2)
            }
        );
    }

    #[tokio::test]
    async fn config_change_applies_to_open_windows() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.try_admit_at("a", now).is_admitted());
        limiter.set_config(RateLimitConfig {
            limit: 2,
            window: Duration::from_secs(60),
        });
        assert!(limiter.try_admit_at("a", now).is_admitted());
        assert!(!limiter.try_admit_at("a", now).is_admitted());
    }
}
