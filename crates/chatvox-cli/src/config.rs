//! Config file loading.
//!
//! The config file is JSON holding the orchestrator settings and the provider
//! chain:
//!
//! ```json
//! {
//!   "settings": { "engineOrder": ["primary"], "rateLimit": 3 },
//!   "providers": [
//!     { "kind": "http", "id": "primary", "endpoint": "https://tts.example/v1/speak",
//!       "apiKeyEnv": "PRIMARY_TTS_KEY", "costPerChar": 0.000016 }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatvox_core::{TtsSettings, validate_settings};
use chatvox_providers::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Name of the config file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CliConfig {
    pub settings: TtsSettings,
    pub providers: Vec<ProviderConfig>,
}

impl CliConfig {
    /// Parse and validate a config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid config file")?;
        validate_settings(&config.settings).context("Invalid settings in config file")?;
        Ok(config)
    }

    /// Load the config.
    ///
    /// An explicit path must exist. Without one, `config.json` in the data
    /// directory is used if present, otherwise defaults with no providers.
    pub async fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = default_config_path(data_dir);
                if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    return Ok(Self::default());
                }
                candidate
            }
        };
        let json = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("In {}", path.display()))
    }
}

pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}
