//! JSON-file stores.

mod cache_store;
mod cost_ledger;
mod permission_store;

use std::io;
use std::path::Path;

use chatvox_core::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;

pub use cache_store::JsonCacheStore;
pub use cost_ledger::JsonCostLedger;
pub use permission_store::JsonPermissionStore;

fn storage(path: &Path, err: &io::Error) -> StoreError {
    StoreError::Storage(format!("{}: {err}", path.display()))
}

/// Write `contents` to `path` atomically: temp file, then rename.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| storage(parent, &e))?;
    }
    let temp = path.with_extension("tmp");
    fs::write(&temp, contents)
        .await
        .map_err(|e| storage(&temp, &e))?;
    fs::rename(&temp, path)
        .await
        .map_err(|e| storage(path, &e))
}

/// Read a file, `None` if it does not exist.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(storage(path, &e)),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let Some(bytes) = read_optional(path).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    write_atomic(path, &json).await
}
