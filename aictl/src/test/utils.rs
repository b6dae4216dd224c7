//! Shared helpers for integration tests.

use crate::config::{ClientConfig, Config, NetworkConfig};
use crate::store::models::ClientApplication;
use crate::types::RequestType;
use crate::{AppState, Application};
use std::time::Duration;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_CLIENT_KEY: &str = "test-client-key";

/// Baseline config: vault secret and one active client application.
pub fn create_test_config() -> Config {
    Config {
        secret_key: TEST_SECRET.to_string(),
        clients: vec![ClientConfig {
            name: "test-app".to_string(),
            api_key: TEST_CLIENT_KEY.to_string(),
            is_active: true,
        }],
        ..Config::default()
    }
}

/// A network seed pointing at a test server, with a short timeout and a
/// stored plaintext credential (encrypted during application startup).
pub fn network_config(name: &str, provider: &str, network_type: RequestType, api_url: &str) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        display_name: None,
        provider: provider.to_string(),
        network_type,
        api_url: api_url.to_string(),
        api_key: Some("sk-test".to_string()),
        model_name: None,
        is_active: true,
        is_free: false,
        priority: 100,
        timeout: Duration::from_secs(5),
        max_retries: 3,
        request_mapping: None,
        response_mapping: None,
    }
}

pub async fn create_test_app(config: Config) -> Application {
    crate::crypto::install_test_crypto_provider();
    Application::new(config).await.expect("Failed to create application")
}

/// The client application seeded by [`create_test_config`].
pub async fn test_client(state: &AppState) -> ClientApplication {
    state
        .stores
        .clients
        .find_by_api_key(TEST_CLIENT_KEY)
        .await
        .expect("client lookup failed")
        .expect("test client not seeded")
}

/// A canned OpenAI-style chat completion body reporting 21 total tokens.
pub fn chat_completion_body() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Hello! How can I help you today?"
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    })
}
