//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the orchestrator expects from infrastructure:
//! synthesis providers, the audio sink, and persistence for permissions,
//! spend and cached audio. They use only domain types.

pub mod cache_store;
pub mod cost_ledger;
pub mod permission_store;
pub mod playback;
pub mod provider;

use thiserror::Error;

pub use cache_store::CacheStore;
pub use cost_ledger::CostLedgerRepository;
pub use permission_store::PermissionStore;
pub use playback::{PlaybackError, PlaybackSink};
pub use provider::{SynthesisProvider, SynthesisRequest};

/// Errors raised by persistence adapters.
///
/// Abstracts away the storage backend (filesystem, memory) so services only
/// see semantic failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record or blob does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend error (filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for crate::error::TtsError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}
