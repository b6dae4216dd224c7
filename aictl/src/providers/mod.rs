//! Provider adapters: translation between the normalized request shape and
//! each upstream provider's wire format.
//!
//! Every adapter implements [`ProviderAdapter`]: it merges the caller payload
//! with network defaults, attaches the decrypted credential using the
//! provider's scheme, issues the HTTP call against the network's base URL
//! (appending the provider's fixed path suffix when not already present),
//! and extracts a usage count from the response.
//!
//! Adapters are selected through the [`ProviderRegistry`] dispatch table -
//! adding a provider is a pure-addition change.

pub mod anthropic;
pub mod image;
pub mod openai;
pub mod registry;
pub mod transcription;
pub mod yandex;

pub use registry::ProviderRegistry;

use crate::crypto::CredentialVault;
use crate::errors::{Error, Result};
use crate::store::models::Network;
use serde_json::Value;

/// JSON object type used for request and response payloads.
pub type JsonMap = serde_json::Map<String, Value>;

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Merge the caller payload with the network's defaults into the
    /// provider's wire shape. Fails with a validation error when a required
    /// field (prompt, audio data) is missing.
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap>;

    /// Dispatch the request against the network's base URL and return the
    /// normalized response body.
    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap>;

    /// Token usage from the provider's response shape. Providers without
    /// usage reporting return 0, never an absent value.
    fn extract_usage(&self, response: &JsonMap) -> u64 {
        usage_total_tokens(response)
    }
}

/// Read `usage.total_tokens` from an OpenAI-style response, 0 when absent.
pub(crate) fn usage_total_tokens(response: &JsonMap) -> u64 {
    response
        .get("usage")
        .and_then(|usage| usage.get("total_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Decrypt the network's stored credential.
///
/// An absent or empty credential fails with [`Error::MissingCredential`]
/// before any network call is attempted.
pub(crate) fn require_credential(vault: &CredentialVault, network: &Network) -> Result<String> {
    match network.api_key_encrypted.as_deref() {
        Some(encrypted) if !encrypted.is_empty() => vault.decrypt(encrypted),
        _ => Err(Error::MissingCredential {
            network: network.name.clone(),
        }),
    }
}

/// Decrypt the credential if one is stored. For providers where
/// authentication is optional. Decryption failures still propagate.
pub(crate) fn optional_credential(vault: &CredentialVault, network: &Network) -> Result<Option<String>> {
    match network.api_key_encrypted.as_deref() {
        Some(encrypted) if !encrypted.is_empty() => vault.decrypt(encrypted).map(Some),
        _ => Ok(None),
    }
}

/// Append `suffix` to the base URL unless it already ends with it.
pub(crate) fn ensure_suffix(base: &str, suffix: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    }
}

/// Append a `/v1`-versioned suffix, tolerating bases that already carry the
/// version segment or the full path.
pub(crate) fn ensure_versioned_suffix(base: &str, suffix: &str) -> String {
    if base.contains(suffix) {
        return base.trim_end_matches('/').to_string();
    }
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        format!("{trimmed}{suffix}")
    } else {
        format!("{trimmed}/v1{suffix}")
    }
}

/// Apply a configured key-rename map to a JSON object. Absent or empty
/// mapping is pass-through.
pub(crate) fn apply_mapping(mut body: JsonMap, mapping: Option<&JsonMap>) -> JsonMap {
    let Some(mapping) = mapping.filter(|m| !m.is_empty()) else {
        return body;
    };
    for (source, target) in mapping {
        if let Some(target) = target.as_str()
            && let Some(value) = body.remove(source)
        {
            body.insert(target.to_string(), value);
        }
    }
    body
}

/// Prompt from the payload's `prompt` field, falling back to the content of
/// the last user message.
pub(crate) fn extract_prompt(payload: &JsonMap) -> Option<String> {
    if let Some(prompt) = payload.get("prompt").and_then(Value::as_str)
        && !prompt.trim().is_empty()
    {
        return Some(prompt.to_string());
    }

    let messages = payload.get("messages")?.as_array()?;
    messages.iter().rev().find_map(|message| {
        let message = message.as_object()?;
        if message.get("role").and_then(Value::as_str) != Some("user") {
            return None;
        }
        message
            .get("content")
            .and_then(Value::as_str)
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
    })
}

/// Lenient integer coercion: numbers directly, numeric strings parsed.
pub(crate) fn to_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Send a prepared request, classifying non-success statuses as upstream
/// errors carrying status and body, and parsing the body as a JSON object.
pub(crate) async fn execute(builder: reqwest::RequestBuilder) -> Result<JsonMap> {
    let response = builder
        .send()
        .await
        .map_err(|e| Error::Other(anyhow::Error::new(e).context("upstream request failed")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Other(anyhow::Error::new(e).context("failed to read upstream response body")))?;

    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| Error::Other(anyhow::anyhow!("failed to parse upstream response as JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Other(anyhow::anyhow!(
            "expected a JSON object from upstream, got: {other}"
        ))),
    }
}
