//! Cost ledger snapshot as a JSON document.

use std::path::PathBuf;

use async_trait::async_trait;
use chatvox_core::{CostLedger, CostLedgerRepository, StoreError};

use super::{read_json, write_json};

pub struct JsonCostLedger {
    path: PathBuf,
}

impl JsonCostLedger {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CostLedgerRepository for JsonCostLedger {
    async fn load(&self) -> Result<Option<CostLedger>, StoreError> {
        read_json(&self.path).await
    }

    async fn save(&self, ledger: &CostLedger) -> Result<(), StoreError> {
        write_json(&self.path, ledger).await
    }
}

#[cfg(test)]
mod tests {
    use chatvox_core::EngineId;
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn ledger_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonCostLedger::new(dir.path().join("cost_ledger.json"));
        assert!(repo.load().await.unwrap().is_none());

        let mut ledger = CostLedger::starting_at(Utc::now());
        ledger.add(&EngineId::new("google"), 120, 0.0024);
        repo.save(&ledger).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), Some(ledger));
    }
}
