//! Serialized provider definitions.

use std::env;
use std::sync::Arc;

use chatvox_core::{EngineId, SynthesisProvider};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::http::{HttpProvider, HttpProviderConfig};
use crate::scripted::{ScriptedProvider, ScriptedProviderConfig};

/// One entry of the `providers` list in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProviderConfig {
    Http(HttpProviderConfig),
    Scripted(ScriptedProviderConfig),
}

impl ProviderConfig {
    pub const fn id(&self) -> &EngineId {
        match self {
            Self::Http(config) => &config.id,
            Self::Scripted(config) => &config.id,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderBuildError {
    #[error("Environment variable '{var}' for provider '{engine}' is not set")]
    MissingApiKey { engine: EngineId, var: String },

    #[error("Failed to build HTTP client for provider '{engine}': {message}")]
    Client { engine: EngineId, message: String },
}

/// Instantiate providers in config order.
pub fn build_providers(
    configs: &[ProviderConfig],
) -> Result<Vec<Arc<dyn SynthesisProvider>>, ProviderBuildError> {
    configs
        .iter()
        .map(|config| -> Result<Arc<dyn SynthesisProvider>, ProviderBuildError> {
            let provider: Arc<dyn SynthesisProvider> = match config {
                ProviderConfig::Http(http) => {
                    let api_key = resolve_api_key(http)?;
                    Arc::new(HttpProvider::new(http.clone(), api_key).map_err(|e| {
                        ProviderBuildError::Client {
                            engine: http.id.clone(),
                            message: e.to_string(),
                        }
                    })?)
                }
                ProviderConfig::Scripted(scripted) => {
                    Arc::new(ScriptedProvider::from_config(scripted.clone()))
                }
            };
            info!(target: "chatvox.provider", engine = %config.id(), "Provider registered");
            Ok(provider)
        })
        .collect()
}

fn resolve_api_key(config: &HttpProviderConfig) -> Result<Option<String>, ProviderBuildError> {
    match &config.api_key_env {
        Some(var) => env::var(var)
            .map(Some)
            .map_err(|_| ProviderBuildError::MissingApiKey {
                engine: config.id.clone(),
                var: var.clone(),
            }),
        None => Ok(config.api_key.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_list_deserializes_by_kind() {
        let configs: Vec<ProviderConfig> = serde_json::from_str(
            r#"[
                {"kind":"http","id":"google","endpoint":"http://127.0.0.1:9/tts","costPerChar":0.000016},
                {"kind":"scripted","id":"local"}
            ]"#,
        )
        .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].id(), &EngineId::new("google"));
        assert!(matches!(configs[1], ProviderConfig::Scripted(_)));

        let providers = build_providers(&configs).unwrap();
        let ids: Vec<_> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, [EngineId::new("google"), EngineId::new("local")]);
        assert!((providers[0].cost_per_char() - 0.000_016).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_key_variable_is_reported() {
        let config = ProviderConfig::Http(HttpProviderConfig {
            id: EngineId::new("paid"),
            endpoint: "http://127.0.0.1:9/tts".into(),
            api_key: None,
            api_key_env: Some("CHATVOX_TEST_KEY_THAT_IS_NEVER_SET".into()),
            cost_per_char: 0.0,
            voices: Vec::new(),
            audio_field: "audio".into(),
            default_mime: "audio/mpeg".into(),
        });
        let Err(err) = build_providers(&[config]) else {
            panic!("expected missing key error");
        };
        assert!(matches!(err, ProviderBuildError::MissingApiKey { .. }));
    }
}
