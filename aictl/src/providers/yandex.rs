//! Adapter for YandexGPT foundation-model completions.
//!
//! Yandex addresses models with a `modelUri` rather than a `model` name and
//! authenticates with an `Authorization: Api-Key` header.

use super::{JsonMap, ProviderAdapter, apply_mapping, execute, require_credential};
use crate::crypto::CredentialVault;
use crate::errors::Result;
use crate::store::models::Network;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_MODEL_URI: &str = "gpt://b1g6b7r9qqmq5g9b7q3r/yandexgpt-lite/latest";
const COMPLETION_SUFFIX: &str = "/foundationModels/v1/completion";

pub struct YandexAdapter {
    client: reqwest::Client,
    vault: Arc<CredentialVault>,
}

impl YandexAdapter {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>) -> Self {
        Self { client, vault }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for YandexAdapter {
    fn build_request(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let mut body = apply_mapping(payload.clone(), network.request_mapping.as_ref());

        if !body.contains_key("modelUri") {
            let model_uri = network
                .model_name
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_URI.to_string());
            body.insert("modelUri".to_string(), json!(model_uri));
        }

        Ok(body)
    }

    async fn send(&self, network: &Network, payload: &JsonMap) -> Result<JsonMap> {
        let body = self.build_request(network, payload)?;
        let api_key = require_credential(&self.vault, network)?;

        let response = execute(
            self.client
                .post(completion_url(&network.api_url))
                .header("Authorization", format!("Api-Key {api_key}"))
                .timeout(network.timeout)
                .json(&body),
        )
        .await?;

        Ok(apply_mapping(response, network.response_mapping.as_ref()))
    }
}

fn completion_url(base: &str) -> String {
    if base.contains("/completion") {
        return base.trim_end_matches('/').to_string();
    }
    format!("{}{COMPLETION_SUFFIX}", base.trim_end_matches('/'))
}
