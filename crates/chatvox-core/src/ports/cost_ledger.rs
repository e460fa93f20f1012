//! Cost ledger repository port.

use async_trait::async_trait;

use super::StoreError;
use crate::cost::CostLedger;

/// Persistence for the spend ledger snapshot.
#[async_trait]
pub trait CostLedgerRepository: Send + Sync {
    /// Load the ledger, `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<CostLedger>, StoreError>;

    /// Replace the stored ledger.
    async fn save(&self, ledger: &CostLedger) -> Result<(), StoreError>;
}
