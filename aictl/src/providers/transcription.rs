//! Adapter for Whisper-style audio transcription.
//!
//! Callers submit audio as a base64 `audio` payload field; the adapter
//! decodes it and uploads it as a `multipart/form-data` file part.
//! Transcription APIs report no token usage, so usage is estimated from the
//! transcript length.

use super::{JsonMap, ProviderAdapter, apply_mapping, ensure_versioned_suffix, execute, require_credential};
use crate::crypto::CredentialVault;
use crate::errors::{Error, Result};
use crate::store::models::Network;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};
use std::sync::Arc;

const DEFAULT_MODEL: &str = "whisper-1";
const TRANSCRIPTION_SUFFIX: &str = "/audio/transcriptions";

pub struct TranscriptionAdapter {
    client: reqwest::Client,
    vault: Arc<CredentialVault>,
}

impl TranscriptionAdapter {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>) -> Self {
        Self { client, vault }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for TranscriptionAdapter {
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let audio = payload
            .get("audio")
            .and_then(Value::as_str)
            .filter(|audio| !audio.is_empty())
            .ok_or_else(|| Error::Validation {
                message: "Audio data is required for transcription".to_string(),
            })?;

        let model = network
            .model_name
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut body = JsonMap::new();
        body.insert("audio".to_string(), json!(audio));
        body.insert("model".to_string(), json!(model));
        for key in ["language", "prompt"] {
            if let Some(value) = payload.get(key) {
                body.insert(key.to_string(), value.clone());
            }
        }
        Ok(body)
    }

    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let body = self.build_request(network, payload)?;
        let api_key = require_credential(&self.vault, network)?;

        let audio_b64 = body.get("audio").and_then(Value::as_str).unwrap_or_default();
        let audio = general_purpose::STANDARD
            .decode(audio_b64)
            .map_err(|e| Error::Validation {
                message: format!("Audio data is not valid base64: {e}"),
            })?;

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(audio).file_name("audio.mp3"))
            .text("model", model);
        for key in ["language", "prompt"] {
            if let Some(value) = body.get(key).and_then(Value::as_str) {
                form = form.text(key, value.to_string());
            }
        }

        let url = ensure_versioned_suffix(&network.api_url, TRANSCRIPTION_SUFFIX);
        let response = execute(
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .timeout(network.timeout)
                .multipart(form),
        )
        .await?;

        Ok(apply_mapping(response, network.response_mapping.as_ref()))
    }

    fn extract_usage(&self, response: &JsonMap) -> u64 {
        // Whisper reports no usage; roughly four characters per token
        response
            .get("text")
            .and_then(Value::as_str)
            .map(|text| (text.len() / 4) as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestType;

    fn adapter() -> TranscriptionAdapter {
        crate::crypto::install_test_crypto_provider();
        TranscriptionAdapter::new(reqwest::Client::new(), Arc::new(CredentialVault::new("test-secret")))
    }

    fn network() -> Network {
        Network::builder()
            .name("whisper")
            .display_name("Whisper")
            .provider("whisper")
            .network_type(RequestType::Transcription)
            .api_url("https://api.openai.com/v1")
            .build()
    }

    fn obj(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_missing_audio_is_a_validation_error() {
        let result = adapter().build_request(&network(), &obj(json!({"language": "en"})));
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = adapter().build_request(&network(), &obj(json!({"audio": ""})));
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_defaults_model_and_keeps_optional_fields() {
        let payload = obj(json!({"audio": "aGVsbG8=", "language": "en", "prompt": "radio show"}));
        let body = adapter().build_request(&network(), &payload).unwrap();

        assert_eq!(body.get("model"), Some(&json!("whisper-1")));
        assert_eq!(body.get("language"), Some(&json!("en")));
        assert_eq!(body.get("prompt"), Some(&json!("radio show")));
    }

    #[test]
    fn test_usage_estimated_from_transcript_length() {
        let response = obj(json!({"text": "a".repeat(40)}));
        assert_eq!(adapter().extract_usage(&response), 10);

        assert_eq!(adapter().extract_usage(&JsonMap::new()), 0);
    }

    #[test]
    fn test_transcription_url_variants() {
        assert_eq!(
            ensure_versioned_suffix("https://api.openai.com/v1/audio/transcriptions", TRANSCRIPTION_SUFFIX),
            "https://api.openai.com/v1/audio/transcriptions"
        );
        assert_eq!(
            ensure_versioned_suffix("https://api.openai.com/v1", TRANSCRIPTION_SUFFIX),
            "https://api.openai.com/v1/audio/transcriptions"
        );
        assert_eq!(
            ensure_versioned_suffix("https://api.openai.com", TRANSCRIPTION_SUFFIX),
            "https://api.openai.com/v1/audio/transcriptions"
        );
    }
}
