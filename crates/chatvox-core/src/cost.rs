//! Spend accounting types.
//!
//! The [`CostLedger`] is the persisted snapshot the cost tracker works on.
//! Hour and day buckets are keyed by their UTC start so a restart inside the
//! same hour continues the running totals.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, DurationRound, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::EngineId;

/// Lifetime totals for one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpend {
    pub characters: u64,
    pub requests: u64,
    pub cost: f64,
}

/// Budget state derived from the ledger and the configured thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    #[default]
    Ok,
    Warning,
    Critical,
}

/// Running spend totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLedger {
    pub engines: BTreeMap<EngineId, EngineSpend>,
    pub hour_start: DateTime<Utc>,
    pub hour_total: f64,
    pub day: NaiveDate,
    pub day_total: f64,
    /// Spend per engine within the current day.
    #[serde(default)]
    pub day_by_engine: BTreeMap<EngineId, f64>,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl CostLedger {
    /// Empty ledger whose buckets start at `now`.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            engines: BTreeMap::new(),
            hour_start: hour_floor(now),
            hour_total: 0.0,
            day: now.date_naive(),
            day_total: 0.0,
            day_by_engine: BTreeMap::new(),
        }
    }

    /// Reset buckets whose period ended before `now`.
    ///
    /// Returns `true` when the day bucket rolled over.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let hour = hour_floor(now);
        if hour != self.hour_start {
            self.hour_start = hour;
            self.hour_total = 0.0;
        }
        let day = now.date_naive();
        if day == self.day {
            return false;
        }
        self.day = day;
        self.day_total = 0.0;
        self.day_by_engine.clear();
        true
    }

    /// Add one successful synthesis to every bucket.
    pub fn add(&mut self, engine: &EngineId, characters: u64, cost: f64) {
        let spend = self.engines.entry(engine.clone()).or_default();
        spend.characters += characters;
        spend.requests += 1;
        spend.cost += cost;
        self.hour_total += cost;
        self.day_total += cost;
        *self.day_by_engine.entry(engine.clone()).or_default() += cost;
    }

    pub fn day_spend(&self, engine: &EngineId) -> f64 {
        self.day_by_engine.get(engine).copied().unwrap_or_default()
    }

    pub fn total_cost(&self) -> f64 {
        self.engines.values().map(|s| s.cost).sum()
    }
}

fn hour_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

/// Cost statistics for status reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStats {
    pub engines: BTreeMap<EngineId, EngineSpend>,
    pub hour_total: f64,
    pub day_total: f64,
    pub total: f64,
    pub level: BudgetLevel,
    /// Engines over their own daily limit.
    pub blocked_engines: BTreeSet<EngineId>,
    /// Every paid engine is blocked by the daily critical threshold.
    pub paid_engines_blocked: bool,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_add_updates_all_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        let mut ledger = CostLedger::starting_at(now);
        let engine = EngineId::from("google");
        ledger.add(&engine, 100, 0.4);
        ledger.add(&engine, 50, 0.2);

        let spend = ledger.engines[&engine];
        assert_eq!(spend.characters, 150);
        assert_eq!(spend.requests, 2);
        assert!((ledger.hour_total - 0.6).abs() < 1e-9);
        assert!((ledger.day_spend(&engine) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_roll_resets_hour_then_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 15, 0).unwrap();
        let mut ledger = CostLedger::starting_at(now);
        let engine = EngineId::from("google");
        ledger.add(&engine, 10, 1.0);

        assert!(!ledger.roll(now + TimeDelta::minutes(10)));
        assert!((ledger.hour_total - 1.0).abs() < 1e-9);

        assert!(ledger.roll(now + TimeDelta::hours(1)));
        assert_eq!(ledger.hour_total, 0.0);
        assert_eq!(ledger.day_total, 0.0);
        assert_eq!(ledger.day_spend(&engine), 0.0);
        assert!((ledger.total_cost() - 1.0).abs() < 1e-9);
    }
}
