//! Permission store port.

use async_trait::async_trait;

use super::StoreError;
use crate::permission::UserPermission;

/// Persistence for the user-permission table.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fetch one user's record, `None` if the user has never been stored.
    async fn get(&self, user_id: &str) -> Result<Option<UserPermission>, StoreError>;

    /// Insert or replace a record.
    async fn upsert(&self, record: UserPermission) -> Result<(), StoreError>;

    /// All stored records, ordered by user id.
    async fn list(&self) -> Result<Vec<UserPermission>, StoreError>;
}
