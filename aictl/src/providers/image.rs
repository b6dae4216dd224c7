//! Best-effort adapter for Pollinations image generation.
//!
//! Unlike the other adapters, an upstream failure here does not propagate:
//! the adapter substitutes a deterministic direct-access CDN URL built from
//! the prompt, so callers always receive a usable image reference. A stored
//! credential is optional; decryption failures still abort the call.

use super::{JsonMap, ProviderAdapter, apply_mapping, execute, extract_prompt, optional_credential, to_int};
use crate::crypto::CredentialVault;
use crate::errors::{Error, Result};
use crate::store::models::Network;
use serde_json::{Value, json};
use std::sync::Arc;

const FALLBACK_CDN: &str = "https://image.pollinations.ai/prompt/";

pub struct ImageAdapter {
    client: reqwest::Client,
    vault: Arc<CredentialVault>,
}

impl ImageAdapter {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>) -> Self {
        Self { client, vault }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ImageAdapter {
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let prompt = extract_prompt(payload).ok_or_else(|| Error::Validation {
            message: "Prompt is required for image generation".to_string(),
        })?;

        let mut body = JsonMap::new();
        body.insert("prompt".to_string(), json!(prompt));

        if let Some(settings) = payload.get("settings").and_then(Value::as_object) {
            if let Some(width) = to_int(settings.get("width")) {
                body.insert("width".to_string(), json!(width));
            }
            if let Some(height) = to_int(settings.get("height")) {
                body.insert("height".to_string(), json!(height));
            }
            if let Some(ratio) = settings.get("aspectRatio").and_then(Value::as_str) {
                body.insert("ratio".to_string(), json!(ratio.to_lowercase()));
            }
            if let Some(quality) = settings.get("quality").and_then(Value::as_str) {
                body.insert("quality".to_string(), json!(quality));
            }
            if let Some(style) = settings.get("style").and_then(Value::as_str) {
                body.insert("style".to_string(), json!(style));
            }
            if let Some(seed) = settings.get("seed").and_then(Value::as_i64) {
                body.insert("seed".to_string(), json!(seed));
            }
        }

        if let Some(negative) = payload.get("negative_prompt").and_then(Value::as_str)
            && !negative.trim().is_empty()
        {
            body.insert("negative_prompt".to_string(), json!(negative));
        }

        if let Some(model) = network.model_name.clone().filter(|m| !m.is_empty())
            && !body.contains_key("model")
        {
            body.insert("model".to_string(), json!(model));
        }

        body.entry("nologo".to_string()).or_insert(json!(true));

        Ok(apply_mapping(body, network.request_mapping.as_ref()))
    }

    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let prompt = extract_prompt(payload).ok_or_else(|| Error::Validation {
            message: "Prompt is required for image generation".to_string(),
        })?;
        let body = self.build_request(network, payload)?;
        // Resolve the credential up front: a decryption failure must abort,
        // only upstream failures degrade to the CDN fallback
        let api_key = optional_credential(&self.vault, network)?;

        let width = to_int(body.get("width"));
        let height = to_int(body.get("height"));

        let mut request = self
            .client
            .post(&network.api_url)
            .timeout(network.timeout)
            .json(&body);
        if let Some(api_key) = api_key {
            request = request.bearer_auth(api_key);
        }

        match execute(request).await {
            Ok(raw) => Ok(normalize_response(&prompt, &body, Some(raw), width, height)),
            Err(err) => {
                tracing::warn!(network = %network.name, "image generation call failed, serving CDN fallback: {err}");
                Ok(fallback_response(&prompt, &body, width, height))
            }
        }
    }
}

fn normalize_response(
    prompt: &str,
    request: &JsonMap,
    raw: Option<JsonMap>,
    width: Option<i64>,
    height: Option<i64>,
) -> JsonMap {
    let mut assets = raw.as_ref().map(extract_asset_urls).unwrap_or_default();
    if assets.is_empty() {
        assets.push(cdn_url(prompt, width, height));
    }

    let status = raw
        .as_ref()
        .and_then(|r| r.get("status"))
        .cloned()
        .unwrap_or_else(|| json!("success"));

    let output: Vec<Value> = assets.iter().map(|url| json!({"url": url})).collect();

    let mut normalized = JsonMap::new();
    normalized.insert("provider".to_string(), json!("pollinations"));
    normalized.insert("prompt".to_string(), json!(prompt));
    normalized.insert("request".to_string(), Value::Object(request.clone()));
    normalized.insert("rawResponse".to_string(), raw.map(Value::Object).unwrap_or(Value::Null));
    normalized.insert("assets".to_string(), json!(assets));
    normalized.insert("output".to_string(), Value::Array(output));
    normalized.insert("status".to_string(), status);
    normalized.insert("tokensUsed".to_string(), json!(0));
    normalized
}

fn fallback_response(prompt: &str, request: &JsonMap, width: Option<i64>, height: Option<i64>) -> JsonMap {
    let mut raw = JsonMap::new();
    raw.insert("status".to_string(), json!("fallback"));
    raw.insert(
        "output".to_string(),
        json!([{"url": cdn_url(prompt, width, height)}]),
    );
    normalize_response(prompt, request, Some(raw), width, height)
}

/// Collect asset URLs from the shapes Pollinations responds with:
/// `output[].url`, `images[]` (strings or objects), and a top-level `url`.
fn extract_asset_urls(raw: &JsonMap) -> Vec<String> {
    let mut assets = Vec::new();

    if let Some(output) = raw.get("output").and_then(Value::as_array) {
        for item in output {
            if let Some(url) = item.get("url").and_then(Value::as_str)
                && !url.is_empty()
            {
                assets.push(url.to_string());
            }
        }
    }

    if let Some(images) = raw.get("images").and_then(Value::as_array) {
        for item in images {
            match item {
                Value::Object(map) => {
                    if let Some(url) = map.get("url").and_then(Value::as_str)
                        && !url.is_empty()
                    {
                        assets.push(url.to_string());
                    }
                }
                Value::String(url) if !url.is_empty() => assets.push(url.clone()),
                _ => {}
            }
        }
    }

    if let Some(url) = raw.get("url").and_then(Value::as_str)
        && !url.is_empty()
    {
        assets.push(url.to_string());
    }

    assets
}

fn cdn_url(prompt: &str, width: Option<i64>, height: Option<i64>) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(prompt.as_bytes()).collect();
    let mut url = format!("{FALLBACK_CDN}{encoded}");

    let mut query = Vec::new();
    if let Some(width) = width.filter(|w| *w > 0) {
        query.push(format!("width={width}"));
    }
    if let Some(height) = height.filter(|h| *h > 0) {
        query.push(format!("height={height}"));
    }
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    url
}
