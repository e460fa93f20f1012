//! Synthesis provider adapters for chatvox.
//!
//! - [`HttpProvider`]: the uniform HTTP adapter (POST `{text, voice}`, raw
//!   audio or base64-in-JSON back)
//! - [`ScriptedProvider`]: deterministic provider driven by a script of
//!   outcomes, for demos and tests
//!
//! [`build_providers`] turns serialized [`ProviderConfig`]s into trait
//! objects for the engine registry.

#![deny(unused_crate_dependencies)]

mod config;
mod http;
mod scripted;

pub use config::{ProviderBuildError, ProviderConfig, build_providers};
pub use http::{HttpProvider, HttpProviderConfig, decode_audio_response};
pub use scripted::{SCRIPTED_MIME, ScriptStep, ScriptedProvider, ScriptedProviderConfig};
