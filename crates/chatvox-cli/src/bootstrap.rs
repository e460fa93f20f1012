//! CLI bootstrap: the composition root.
//!
//! This is the only place the CLI wires stores, providers and the service
//! together. Handlers receive the composed [`CliContext`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatvox_core::data_root;
use chatvox_engine::{SinkKind, TtsService, TtsServiceDeps, build_tts_service};
use chatvox_providers::build_providers;
use chatvox_store::StoreFactory;
use tracing::debug;

use crate::config::CliConfig;

/// Fully composed application context for CLI commands.
pub struct CliContext {
    pub service: TtsService,
    pub data_dir: PathBuf,
}

impl CliContext {
    pub const fn service(&self) -> &TtsService {
        &self.service
    }
}

/// Resolve the data directory: the flag wins, then the usual lookup.
pub fn resolve_data_dir(flag: Option<&Path>) -> Result<PathBuf> {
    match flag {
        Some(dir) => Ok(dir.to_path_buf()),
        None => data_root().context("Cannot determine data directory; set CHATVOX_DATA_DIR"),
    }
}

/// Open the on-disk stores, build providers and start the service.
pub async fn bootstrap(config: CliConfig, data_dir: &Path, sink: SinkKind) -> Result<CliContext> {
    let stores = StoreFactory::open_dir(data_dir)
        .await
        .with_context(|| format!("Failed to open stores in {}", data_dir.display()))?;
    let providers = build_providers(&config.providers)?;
    debug!(
        data_dir = %data_dir.display(),
        providers = providers.len(),
        "Bootstrapping chatvox"
    );

    let service = build_tts_service(TtsServiceDeps {
        settings: config.settings,
        providers,
        permissions: stores.permissions,
        ledger: stores.ledger,
        cache: stores.cache,
        sink,
    })
    .await
    .context("Failed to start TTS service")?;

    Ok(CliContext {
        service,
        data_dir: data_dir.to_path_buf(),
    })
}
