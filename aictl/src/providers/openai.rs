//! Adapter for OpenAI and OpenAI-compatible chat providers, plus DALL-E
//! style image generation.
//!
//! Several providers speak this wire format (Mistral, DeepSeek, Qwen,
//! GigaChat); the registry instantiates one adapter per tag with the
//! provider's default model. Networks of type `image` are routed to the
//! image-generation endpoint instead of chat completions.

use super::{
    JsonMap, ProviderAdapter, apply_mapping, ensure_suffix, ensure_versioned_suffix, execute, extract_prompt,
    require_credential, to_int,
};
use crate::crypto::CredentialVault;
use crate::errors::{Error, Result};
use crate::store::models::Network;
use crate::types::RequestType;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct OpenAiAdapter {
    client: reqwest::Client,
    vault: Arc<CredentialVault>,
    default_model: &'static str,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>, default_model: &'static str) -> Self {
        Self {
            client,
            vault,
            default_model,
        }
    }

    fn model_for(&self, network: &Network) -> String {
        network
            .model_name
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.to_string())
    }

    fn build_chat_request(&self, network: &Network, mut body: JsonMap, settings: Option<&Value>) -> JsonMap {
        // Caller settings fill gaps but never override explicit fields
        if let Some(settings) = settings.and_then(Value::as_object) {
            if let Some(temperature) = settings.get("temperature").and_then(Value::as_f64)
                && !body.contains_key("temperature")
            {
                body.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(max_tokens) = settings.get("maxTokens").and_then(Value::as_u64)
                && !body.contains_key("max_tokens")
            {
                body.insert("max_tokens".to_string(), json!(max_tokens));
            }
        }

        if !body.contains_key("model") {
            body.insert("model".to_string(), json!(self.model_for(network)));
        }
        body
    }

    fn build_image_request(&self, network: &Network, payload: &JsonMap, settings: Option<&Value>) -> Result<JsonMap> {
        let prompt = extract_prompt(payload).ok_or_else(|| Error::Validation {
            message: "Prompt is required for image generation".to_string(),
        })?;

        let mut body = JsonMap::new();
        body.insert("prompt".to_string(), json!(prompt));

        let model = payload
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| network.model_name.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "dall-e-3".to_string());
        body.insert("model".to_string(), json!(model));

        if let Some(n) = payload.get("n") {
            body.insert("n".to_string(), n.clone());
        }
        if let Some(quality) = payload.get("quality") {
            body.insert("quality".to_string(), json!(normalize_quality(quality)));
        }
        if let Some(style) = payload.get("style") {
            body.insert("style".to_string(), style.clone());
        }

        let settings = settings.and_then(Value::as_object);
        let size = settings.and_then(derive_image_size).unwrap_or("1024x1024");
        body.insert("size".to_string(), json!(size));

        if let Some(settings) = settings {
            if let Some(quality) = settings.get("quality")
                && !body.contains_key("quality")
            {
                body.insert("quality".to_string(), json!(normalize_quality(quality)));
            }
            if let Some(style) = settings.get("style")
                && !body.contains_key("style")
            {
                body.insert("style".to_string(), style.clone());
            }
            if let Some(n) = settings.get("n")
                && !body.contains_key("n")
            {
                body.insert("n".to_string(), n.clone());
            }
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let mut body = apply_mapping(payload.clone(), network.request_mapping.as_ref());

        // Service fields consumed by the broker, not forwarded upstream
        let settings = body.remove("settings");
        body.remove("mode");

        match network.network_type {
            RequestType::Image => self.build_image_request(network, &body, settings.as_ref()),
            _ => Ok(self.build_chat_request(network, body, settings.as_ref())),
        }
    }

    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let body = self.build_request(network, payload)?;
        let api_key = require_credential(&self.vault, network)?;

        let url = match network.network_type {
            RequestType::Image => ensure_suffix(&network.api_url, "/generations"),
            _ => ensure_versioned_suffix(&network.api_url, "/chat/completions"),
        };

        let response = execute(
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .timeout(network.timeout)
                .json(&body),
        )
        .await?;

        Ok(apply_mapping(response, network.response_mapping.as_ref()))
    }
}

/// Normalize a quality value for the image API. Accepted upstream values are
/// `standard` and `hd`; `high` maps to `hd`, everything else to `standard`.
fn normalize_quality(value: &Value) -> &'static str {
    let quality = match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    match quality.trim() {
        "high" | "hd" => "hd",
        _ => "standard",
    }
}

/// Pick the closest supported image size from explicit dimensions or an
/// aspect-ratio hint.
fn derive_image_size(settings: &JsonMap) -> Option<&'static str> {
    let width = to_int(settings.get("width"));
    let height = to_int(settings.get("height"));
    if let (Some(width), Some(height)) = (width, height) {
        return normalize_size_by_aspect(width, height);
    }

    match settings.get("aspectRatio").and_then(Value::as_str) {
        Some("16:9") => Some("1792x1024"),
        Some("9:16") => Some("1024x1792"),
        Some(ratio) if !ratio.is_empty() => Some("1024x1024"),
        _ => None,
    }
}

fn normalize_size_by_aspect(width: i64, height: i64) -> Option<&'static str> {
    if width <= 0 || height <= 0 {
        return None;
    }
    let aspect = width as f64 / height as f64;
    if (aspect - 1.0).abs() < 0.05 {
        Some("1024x1024")
    } else if aspect > 1.0 {
        Some("1792x1024")
    } else {
        Some("1024x1792")
    }
}
