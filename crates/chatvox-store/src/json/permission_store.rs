//! Permission table as a JSON array of records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chatvox_core::{PermissionStore, StoreError, UserPermission};
use tokio::sync::Mutex;
use tracing::debug;

use super::{read_json, write_json};

/// The whole table is held in memory and rewritten on every upsert.
pub struct JsonPermissionStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, UserPermission>>,
}

impl JsonPermissionStore {
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records: Vec<UserPermission> = read_json(&path).await?.unwrap_or_default();
        debug!(target: "chatvox.store", path = %path.display(), users = records.len(), "Permission table loaded");
        Ok(Self {
            path,
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.user_id.clone(), record))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl PermissionStore for JsonPermissionStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPermission>, StoreError> {
        Ok(self.records.lock().await.get(user_id).cloned())
    }

    async fn upsert(&self, record: UserPermission) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(record.user_id.clone(), record.clone());
        let snapshot: Vec<&UserPermission> = records.values().collect();
        if let Err(e) = write_json(&self.path, &snapshot).await {
            // Keep memory consistent with disk.
            match previous {
                Some(previous) => records.insert(record.user_id, previous),
                None => records.remove(&record.user_id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserPermission>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
