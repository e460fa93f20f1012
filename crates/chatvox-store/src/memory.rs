//! In-memory stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chatvox_core::{
    CacheEntry, CacheKey, CacheStore, CostLedger, CostLedgerRepository, PermissionStore,
    StoreError, UserPermission,
};

#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    records: Mutex<BTreeMap<String, UserPermission>>,
}

impl MemoryPermissionStore {
    pub fn with_users(users: impl IntoIterator<Item = UserPermission>) -> Self {
        Self {
            records: Mutex::new(
                users
                    .into_iter()
                    .map(|user| (user.user_id.clone(), user))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPermission>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }

    async fn upsert(&self, record: UserPermission) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserPermission>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCostLedger {
    ledger: Mutex<Option<CostLedger>>,
    saves: AtomicUsize,
}

impl MemoryCostLedger {
    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Option<CostLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CostLedgerRepository for MemoryCostLedger {
    async fn load(&self) -> Result<Option<CostLedger>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, ledger: &CostLedger) -> Result<(), StoreError> {
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner) = Some(ledger.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// In-memory cache store. Blob writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    index: Mutex<Vec<CacheEntry>>,
    blobs: Mutex<HashMap<CacheKey, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn blob_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load_index(&self) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(self
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save_index(&self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
        Ok(())
    }

    async fn read_blob(&self, key: &CacheKey) -> Result<Bytes, StoreError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn write_blob(&self, key: &CacheKey, bytes: Bytes) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Storage("disk full".into()));
        }
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), bytes);
        Ok(())
    }

    async fn remove_blob(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
