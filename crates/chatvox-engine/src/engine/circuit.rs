//! Per-engine circuit breaker.
//!
//! ```text
//! Closed ──(error rate > threshold)──▶ Open ──(cooldown elapsed)──▶ HalfOpen
//!   ▲                                   ▲                              │
//!   └────────────(probe succeeds)───────┼──────────────────────────────┤
//!                                       └───────(probe fails)──────────┘
//! ```
//!
//! The error rate is computed over the last `window_size` attempt outcomes
//! and only once at least `min_samples` have been recorded. Cooldown expiry
//! is evaluated lazily when an attempt is requested, so no timer task is
//! needed. In HalfOpen exactly one probe attempt is let through.

use std::collections::VecDeque;

use chatvox_core::{CircuitSettings, EngineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Permission to run one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Normal,
    Probe,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    engine: EngineId,
    config: CircuitSettings,
    state: CircuitState,
    /// `true` = failure.
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    last_failure_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(engine: EngineId, config: CircuitSettings) -> Self {
        Self {
            engine,
            outcomes: VecDeque::with_capacity(config.window_size),
            config,
            state: CircuitState::Closed,
            opened_at: None,
            probe_in_flight: false,
            last_failure_at: None,
        }
    }

    pub const fn state(&self) -> CircuitState {
        self.state
    }

    pub const fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }

    pub fn window_len(&self) -> usize {
        self.outcomes.len()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|failed| **failed).count();
        failures as f64 / self.outcomes.len() as f64
    }

    /// Apply new tuning. The outcome window is trimmed if it shrank.
    pub fn reconfigure(&mut self, config: CircuitSettings) {
        while self.outcomes.len() > config.window_size {
            self.outcomes.pop_front();
        }
        self.config = config;
    }

    /// Ask to run an attempt at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> Option<Permit> {
        match self.state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.config.cooldown());
                if !cooled {
                    return None;
                }
                self.transition(CircuitState::HalfOpen);
                self.probe_in_flight = true;
                Some(Permit::Probe)
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    None
                } else {
                    self.probe_in_flight = true;
                    Some(Permit::Probe)
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.outcomes.clear();
                self.opened_at = None;
                self.transition(CircuitState::Closed);
            }
            CircuitState::Closed => self.push(false),
            // A straggler from before the circuit opened; ignore.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.last_failure_at = Some(Utc::now());
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.open(now);
            }
            CircuitState::Closed => {
                self.push(true);
                if self.outcomes.len() >= self.config.min_samples
                    && self.error_rate() > self.config.error_threshold
                {
                    self.open(now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.config.window_size {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }

    fn open(&mut self, now: Instant) {
        self.opened_at = Some(now);
        self.transition(CircuitState::Open);
    }

    fn transition(&mut self, next: CircuitState) {
        let previous = std::mem::replace(&mut self.state, next);
        if previous == next {
            return;
        }
        match next {
            CircuitState::Open => warn!(
                target: "chatvox.circuit",
                engine = %self.engine,
                from = ?previous,
                error_rate = self.error_rate(),
                cooldown_secs = self.config.cooldown_secs,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => info!(
                target: "chatvox.circuit",
                engine = %self.engine,
                "Circuit half-open, allowing one probe"
            ),
            CircuitState::Closed => info!(
                target: "chatvox.circuit",
                engine = %self.engine,
                "Circuit closed"
            ),
        }
    }
}
