//! Cache index (`index.json`) plus one `<key>.bin` blob per entry.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chatvox_core::{CacheEntry, CacheKey, CacheStore, StoreError};
use tokio::fs;

use super::{read_json, read_optional, storage, write_atomic, write_json};

pub struct JsonCacheStore {
    dir: PathBuf,
}

impl JsonCacheStore {
    pub async fn open(dir: PathBuf) -> Result<Self, StoreError> {
        let blobs = dir.join("blobs");
        fs::create_dir_all(&blobs)
            .await
            .map_err(|e| storage(&blobs, &e))?;
        Ok(Self { dir })
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join("blobs").join(format!("{key}.bin"))
    }
}

#[async_trait]
impl CacheStore for JsonCacheStore {
    async fn load_index(&self) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(read_json(&self.index_path()).await?.unwrap_or_default())
    }

    async fn save_index(&self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        write_json(&self.index_path(), entries).await
    }

    async fn read_blob(&self, key: &CacheKey) -> Result<Bytes, StoreError> {
        read_optional(&self.blob_path(key))
            .await?
            .map(Bytes::from)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn write_blob(&self, key: &CacheKey, bytes: Bytes) -> Result<(), StoreError> {
        write_atomic(&self.blob_path(key), &bytes).await
    }

    async fn remove_blob(&self, key: &CacheKey) -> Result<(), StoreError> {
        let path = self.blob_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage(&path, &e)),
        }
    }
}
