//! Adapter for Anthropic-style chat providers.
//!
//! Anthropic authenticates with an `x-api-key` header rather than a bearer
//! token and requires an explicit `max_tokens` budget on every request.

use super::{JsonMap, ProviderAdapter, apply_mapping, execute, require_credential};
use crate::crypto::CredentialVault;
use crate::errors::Result;
use crate::store::models::Network;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    vault: Arc<CredentialVault>,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>) -> Self {
        Self { client, vault }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let mut body = apply_mapping(payload.clone(), network.request_mapping.as_ref());

        if !body.contains_key("model") {
            let model = network
                .model_name
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            body.insert("model".to_string(), json!(model));
        }

        if !body.contains_key("max_tokens") {
            body.insert("max_tokens".to_string(), json!(DEFAULT_MAX_TOKENS));
        }

        Ok(body)
    }

    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let body = self.build_request(network, payload)?;
        let api_key = require_credential(&self.vault, network)?;

        let response = execute(
            self.client
                .post(messages_url(&network.api_url))
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .timeout(network.timeout)
                .json(&body),
        )
        .await?;

        Ok(apply_mapping(response, network.response_mapping.as_ref()))
    }
}

fn messages_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/messages") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1/messages")
    }
}
