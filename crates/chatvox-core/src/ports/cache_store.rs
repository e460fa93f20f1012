//! Cache store port.
//!
//! The cache keeps its index in memory and persists it as a whole; blobs are
//! stored individually under their key.

use async_trait::async_trait;
use bytes::Bytes;

use super::StoreError;
use crate::cache::{CacheEntry, CacheKey};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the persisted index (empty if none).
    async fn load_index(&self) -> Result<Vec<CacheEntry>, StoreError>;

    /// Replace the persisted index.
    async fn save_index(&self, entries: &[CacheEntry]) -> Result<(), StoreError>;

    /// Read a blob. Returns [`StoreError::NotFound`] if it is missing.
    async fn read_blob(&self, key: &CacheKey) -> Result<Bytes, StoreError>;

    /// Write (or overwrite) a blob.
    async fn write_blob(&self, key: &CacheKey, bytes: Bytes) -> Result<(), StoreError>;

    /// Remove a blob. Missing blobs are not an error.
    async fn remove_blob(&self, key: &CacheKey) -> Result<(), StoreError>;
}
