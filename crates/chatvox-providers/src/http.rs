//! Uniform HTTP synthesis adapter.
//!
//! # Wire Format
//!
//! Request: `POST <endpoint>` with `Authorization: Bearer <key>` and
//!
//! ```json
//! { "text": "hello", "voice": "en-US-1" }
//! ```
//!
//! Response: either raw audio bytes (the `Content-Type` is the mime type) or
//! a JSON object carrying base64 audio in a configurable field:
//!
//! ```json
//! { "audio": "SUQz…", "mime": "audio/mpeg" }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chatvox_core::{
    EngineId, ProviderError, SynthesisProvider, SynthesisRequest, SynthesizedAudio, VoiceInfo,
};
use reqwest::header::{CONTENT_TYPE, HeaderName, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on a single HTTP exchange. The registry's per-attempt timeout
/// is normally much shorter.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body excerpt kept in a [`ProviderError`].
const ERROR_SNIPPET_CHARS: usize = 200;

fn default_audio_field() -> String {
    "audio".to_string()
}

fn default_mime() -> String {
    "audio/mpeg".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProviderConfig {
    pub id: EngineId,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key. Takes precedence over
    /// `api_key` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub cost_per_char: f64,
    #[serde(default)]
    pub voices: Vec<VoiceInfo>,
    /// JSON field carrying base64 audio in JSON responses.
    #[serde(default = "default_audio_field")]
    pub audio_field: String,
    /// Mime type assumed when the response does not name one.
    #[serde(default = "default_mime")]
    pub default_mime: String,
}

#[derive(Serialize)]
struct SpeakBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

pub struct HttpProvider {
    config: HttpProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Build the adapter. `api_key` is the resolved key (see
    /// [`HttpProviderConfig::api_key_env`]).
    pub fn new(config: HttpProviderConfig, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl SynthesisProvider for HttpProvider {
    fn id(&self) -> EngineId {
        self.config.id.clone()
    }

    fn cost_per_char(&self) -> f64 {
        self.config.cost_per_char
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.config.voices.clone()
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let mut builder = self.client.post(&self.config.endpoint).json(&SpeakBody {
            text: &request.text,
            voice: request.voice.as_deref(),
        });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let content_type = header(CONTENT_TYPE);
        let retry_after = header(RETRY_AFTER).and_then(|v| v.trim().parse().ok());
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        debug!(
            target: "chatvox.provider",
            engine = %self.config.id,
            status,
            bytes = body.len(),
            "Provider responded"
        );

        if let Some(mut error) = ProviderError::from_status(status, snippet(&body)) {
            if let ProviderError::RateLimited { retry_after_secs } = &mut error {
                *retry_after_secs = retry_after;
            }
            return Err(error);
        }

        decode_audio_response(
            content_type.as_deref(),
            body,
            &self.config.audio_field,
            &self.config.default_mime,
        )
    }
}

fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(ERROR_SNIPPET_CHARS)
        .collect()
}

/// Turn a successful response body into audio.
///
/// JSON bodies must carry base64 audio in `audio_field` and may name the
/// mime type in `mime` or `contentType`; any other body is raw audio.
pub fn decode_audio_response(
    content_type: Option<&str>,
    body: Bytes,
    audio_field: &str,
    default_mime: &str,
) -> Result<SynthesizedAudio, ProviderError> {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty());

    let audio = if media_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/json")) {
        let json: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::invalid_response(format!("malformed JSON: {e}")))?;
        let encoded = json
            .get(audio_field)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ProviderError::invalid_response(format!("missing '{audio_field}' field"))
            })?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::invalid_response(format!("bad base64 audio: {e}")))?;
        let mime = ["mime", "contentType"]
            .iter()
            .find_map(|field| json.get(*field).and_then(serde_json::Value::as_str))
            .unwrap_or(default_mime);
        SynthesizedAudio::new(bytes, mime)
    } else {
        SynthesizedAudio::new(body, media_type.unwrap_or(default_mime))
    };

    if audio.is_empty() {
        return Err(ProviderError::invalid_response("empty audio"));
    }
    Ok(audio)
}
