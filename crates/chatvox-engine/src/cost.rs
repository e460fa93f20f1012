//! Spend tracking and budget safeguards.
//!
//! The tracker owns the [`CostLedger`] and persists it after every record.
//! Budget level and engine blocks are derived from the ledger and the
//! configured thresholds on every read, so a day rollover lifts blocks
//! without any extra bookkeeping.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use chatvox_core::{
    BudgetLevel, BudgetSettings, CostLedger, CostLedgerRepository, CostStats, EngineId,
    StoreError,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Engines the budget currently keeps out of the fallback chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetBlocks {
    /// Engines over their own daily limit.
    pub engines: BTreeSet<EngineId>,
    /// The daily critical threshold blocks every engine that costs money.
    pub paid_engines: bool,
}

impl BudgetBlocks {
    pub fn blocks(&self, engine: &EngineId, cost_per_char: f64) -> bool {
        self.engines.contains(engine) || (self.paid_engines && cost_per_char > 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty() && !self.paid_engines
    }
}

/// Budget level for a ledger under the given thresholds.
pub fn budget_level(ledger: &CostLedger, budget: &BudgetSettings) -> BudgetLevel {
    if budget
        .daily_critical
        .is_some_and(|limit| ledger.day_total >= limit)
    {
        return BudgetLevel::Critical;
    }
    let hourly = budget
        .hourly_warning
        .is_some_and(|limit| ledger.hour_total >= limit);
    let daily = budget
        .daily_warning
        .is_some_and(|limit| ledger.day_total >= limit);
    if hourly || daily {
        BudgetLevel::Warning
    } else {
        BudgetLevel::Ok
    }
}

/// Engines blocked for a ledger under the given thresholds.
pub fn budget_blocks(ledger: &CostLedger, budget: &BudgetSettings) -> BudgetBlocks {
    if !budget.block_on_critical {
        return BudgetBlocks::default();
    }
    BudgetBlocks {
        engines: budget
            .engine_daily_limits
            .iter()
            .filter(|(engine, limit)| ledger.day_spend(engine) >= **limit)
            .map(|(engine, _)| engine.clone())
            .collect(),
        paid_engines: budget_level(ledger, budget) == BudgetLevel::Critical,
    }
}

pub struct CostTracker {
    ledger: Mutex<CostLedger>,
    repository: Arc<dyn CostLedgerRepository>,
    budget: RwLock<BudgetSettings>,
    last_level: StdMutex<BudgetLevel>,
}

impl CostTracker {
    /// Load the persisted ledger (or start an empty one).
    pub async fn open(
        repository: Arc<dyn CostLedgerRepository>,
        budget: BudgetSettings,
    ) -> Result<Self, StoreError> {
        let now = Utc::now();
        let mut ledger = repository
            .load()
            .await?
            .unwrap_or_else(|| CostLedger::starting_at(now));
        ledger.roll(now);
        let level = budget_level(&ledger, &budget);

        Ok(Self {
            ledger: Mutex::new(ledger),
            repository,
            budget: RwLock::new(budget),
            last_level: StdMutex::new(level),
        })
    }

    pub fn budget(&self) -> BudgetSettings {
        self.budget
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_budget(&self, budget: BudgetSettings) {
        *self.budget.write().unwrap_or_else(PoisonError::into_inner) = budget;
    }

    /// Record one successful synthesis and persist the ledger.
    ///
    /// Persistence failures are logged; the in-memory totals stay correct.
    pub async fn record(&self, engine: &EngineId, characters: usize, cost: f64) -> BudgetLevel {
        self.record_at(engine, characters, cost, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        engine: &EngineId,
        characters: usize,
        cost: f64,
        now: DateTime<Utc>,
    ) -> BudgetLevel {
        let mut ledger = self.ledger.lock().await;
        ledger.roll(now);
        ledger.add(engine, characters as u64, cost);
        if let Err(e) = self.repository.save(&ledger).await {
            warn!(target: "chatvox.cost", error = %e, "Failed to persist cost ledger");
        }
        self.evaluate(&ledger)
    }

    /// Current budget level.
    pub async fn check(&self) -> BudgetLevel {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> BudgetLevel {
        let mut ledger = self.ledger.lock().await;
        ledger.roll(now);
        self.evaluate(&ledger)
    }

    /// Engines the budget currently blocks.
    pub async fn blocks(&self) -> BudgetBlocks {
        self.blocks_at(Utc::now()).await
    }

    pub async fn blocks_at(&self, now: DateTime<Utc>) -> BudgetBlocks {
        let mut ledger = self.ledger.lock().await;
        ledger.roll(now);
        self.evaluate(&ledger);
        budget_blocks(&ledger, &self.budget())
    }

    pub async fn stats(&self) -> CostStats {
        let mut ledger = self.ledger.lock().await;
        ledger.roll(Utc::now());
        let budget = self.budget();
        let blocks = budget_blocks(&ledger, &budget);
        CostStats {
            engines: ledger.engines.clone(),
            hour_total: ledger.hour_total,
            day_total: ledger.day_total,
            total: ledger.total_cost(),
            level: budget_level(&ledger, &budget),
            blocked_engines: blocks.engines,
            paid_engines_blocked: blocks.paid_engines,
        }
    }

    /// Compute the level and log a change from the previous evaluation.
    fn evaluate(&self, ledger: &CostLedger) -> BudgetLevel {
        let level = budget_level(ledger, &self.budget());
        let previous = std::mem::replace(
            &mut *self.last_level.lock().unwrap_or_else(PoisonError::into_inner),
            level,
        );
        if level > previous {
            warn!(
                target: "chatvox.cost",
                ?previous,
                ?level,
                hour_total = ledger.hour_total,
                day_total = ledger.day_total,
                "Budget threshold breached"
            );
        } else if level < previous {
            info!(target: "chatvox.cost", ?previous, ?level, "Budget level lowered");
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;

    #[derive(Default)]
    struct MemLedger(StdMutex<Option<CostLedger>>);

    #[async_trait]
    impl CostLedgerRepository for MemLedger {
        async fn load(&self) -> Result<Option<CostLedger>, StoreError> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn save(&self, ledger: &CostLedger) -> Result<(), StoreError> {
            *self.0.lock().unwrap() = Some(ledger.clone());
            Ok(())
        }
    }

    fn budget() -> BudgetSettings {
        BudgetSettings {
            hourly_warning: Some(1.0),
            daily_warning: Some(5.0),
            daily_critical: Some(10.0),
            engine_daily_limits: BTreeMap::from([(EngineId::from("google"), 3.0)]),
            block_on_critical: true,
        }
    }

    #[tokio::test]
    async fn levels_follow_thresholds() {
        let repo = Arc::new(MemLedger::default());
        let tracker = CostTracker::open(repo.clone(), budget()).await.unwrap();
        let engine = EngineId::from("speechify");
        let t0 = Utc::now();

        assert_eq!(tracker.record_at(&engine, 10, 0.5, t0).await, BudgetLevel::Ok);
        assert_eq!(tracker.record_at(&engine, 10, 0.6, t0).await, BudgetLevel::Warning);
        assert_eq!(tracker.record_at(&engine, 10, 9.0, t0).await, BudgetLevel::Critical);

        let saved = repo.0.lock().unwrap().clone().unwrap();
        assert_eq!(saved.engines[&engine].requests, 3);
    }

    #[tokio::test]
    async fn per_engine_limit_blocks_only_that_engine() {
        let tracker = CostTracker::open(Arc::new(MemLedger::default()), budget())
            .await
            .unwrap();
        let google = EngineId::from("google");
        let now = Utc::now();
        tracker.record_at(&google, 100, 3.0, now).await;

        let blocks = tracker.blocks_at(now).await;
        assert!(blocks.blocks(&google, 0.01));
        assert!(!blocks.blocks(&EngineId::from("tiktok"), 0.01));
        assert!(!blocks.paid_engines);
    }

    #[tokio::test]
    async fn critical_blocks_paid_engines_until_day_rolls() {
        let tracker = CostTracker::open(Arc::new(MemLedger::default()), budget())
            .await
            .unwrap();
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        tracker
            .record_at(&EngineId::from("speechify"), 1000, 12.0, day)
            .await;

        let blocks = tracker.blocks_at(day).await;
        assert!(blocks.paid_engines);
        assert!(blocks.blocks(&EngineId::from("any"), 0.001));
        assert!(!blocks.blocks(&EngineId::from("free"), 0.0));

        let next_day = day + chrono::Duration::hours(5);
        assert!(tracker.blocks_at(next_day).await.is_empty());
        assert_eq!(tracker.check_at(next_day).await, BudgetLevel::Ok);
    }

    #[tokio::test]
    async fn breach_without_blocking_only_alerts() {
        let budget = BudgetSettings {
            block_on_critical: false,
            ..budget()
        };
        let tracker = CostTracker::open(Arc::new(MemLedger::default()), budget)
            .await
            .unwrap();
        let now = Utc::now();
        let level = tracker
            .record_at(&EngineId::from("google"), 1, 50.0, now)
            .await;
        assert_eq!(level, BudgetLevel::Critical);
        assert!(tracker.blocks_at(now).await.is_empty());
    }
}
