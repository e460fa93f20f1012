//! Composition helpers that build every store at once.

use std::path::Path;
use std::sync::Arc;

use chatvox_core::paths::{cache_dir, cost_ledger_path, permissions_path};
use chatvox_core::{CacheStore, CostLedgerRepository, PermissionStore, StoreError};

use crate::json::{JsonCacheStore, JsonCostLedger, JsonPermissionStore};
use crate::memory::{MemoryCacheStore, MemoryCostLedger, MemoryPermissionStore};

/// Trait-object-wrapped stores, ready to hand to the service.
#[derive(Clone)]
pub struct Stores {
    pub permissions: Arc<dyn PermissionStore>,
    pub ledger: Arc<dyn CostLedgerRepository>,
    pub cache: Arc<dyn CacheStore>,
}

/// Construction only; no domain logic.
pub struct StoreFactory;

impl StoreFactory {
    /// Open JSON-backed stores under `root`, creating directories as needed.
    pub async fn open_dir(root: &Path) -> Result<Stores, StoreError> {
        Ok(Stores {
            permissions: Arc::new(JsonPermissionStore::open(permissions_path(root)).await?),
            ledger: Arc::new(JsonCostLedger::new(cost_ledger_path(root))),
            cache: Arc::new(JsonCacheStore::open(cache_dir(root)).await?),
        })
    }

    pub fn in_memory() -> Stores {
        Stores {
            permissions: Arc::new(MemoryPermissionStore::default()),
            ledger: Arc::new(MemoryCostLedger::default()),
            cache: Arc::new(MemoryCacheStore::default()),
        }
    }
}
