//! Persistence adapters for chatvox.
//!
//! Two families implement the core ports:
//! - `Json*`: one JSON document per store under the data directory, written
//!   atomically (temp file + rename); cached audio as one blob file per key
//! - `Memory*`: process-local, for tests and throwaway sessions

#![deny(unused_crate_dependencies)]

#[cfg(test)]
use chrono as _;

pub mod factory;
pub mod json;
pub mod memory;

pub use factory::{StoreFactory, Stores};
pub use json::{JsonCacheStore, JsonCostLedger, JsonPermissionStore};
pub use memory::{MemoryCacheStore, MemoryCostLedger, MemoryPermissionStore};
