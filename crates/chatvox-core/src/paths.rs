//! Data directory resolution.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATVOX_DATA_DIR";

#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,
}

/// Get the root directory for persisted state.
///
/// Resolution order:
/// 1. `CHATVOX_DATA_DIR` environment variable
/// 2. System data directory (e.g., `~/.local/share/chatvox`)
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    dirs::data_dir()
        .map(|dir| dir.join("chatvox"))
        .ok_or(PathError::NoDataDir)
}

pub fn permissions_path(root: &std::path::Path) -> PathBuf {
    root.join("permissions.json")
}

pub fn cost_ledger_path(root: &std::path::Path) -> PathBuf {
    root.join("cost_ledger.json")
}

pub fn cache_dir(root: &std::path::Path) -> PathBuf {
    root.join("cache")
}
