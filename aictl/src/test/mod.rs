pub mod utils;

use crate::config::LimitConfig;
use crate::errors::Error;
use crate::orchestrator::ProcessRequest;
use crate::providers::JsonMap;
use crate::types::{LimitPeriod, RequestStatus, RequestType, UserTier};
use serde_json::{Value, json};
use utils::{TEST_CLIENT_KEY, chat_completion_body, create_test_app, create_test_config, network_config, test_client};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_request(user_id: &str, network_name: Option<&str>) -> ProcessRequest {
    ProcessRequest {
        user_id: user_id.to_string(),
        network_name: network_name.map(str::to_string),
        request_type: RequestType::Chat,
        payload: json!({"messages": [{"role": "user", "content": "Hello"}]})
            .as_object()
            .unwrap()
            .clone(),
    }
}

/// End-to-end happy path through the HTTP surface: authenticated client,
/// mocked OpenAI upstream, usage recorded, remaining-quota metadata returned.
#[test_log::test(tokio::test)]
async fn test_e2e_chat_process_through_api() {
    let mock_server = MockServer::start().await;

    // The credential stored encrypted at startup must arrive decrypted
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config
        .networks
        .push(network_config("gpt4", "openai", RequestType::Chat, &format!("{}/v1", mock_server.uri())));
    config.limits.push(LimitConfig {
        network: "gpt4".to_string(),
        tier: UserTier::Free,
        period: LimitPeriod::Daily,
        request_limit: Some(10),
    });

    let app = create_test_app(config).await;
    let server = axum_test::TestServer::new(app.router()).unwrap();

    let response = server
        .post("/api/v1/ai/process")
        .add_header("x-api-key", TEST_CLIENT_KEY)
        .json(&json!({
            "user_id": "alice",
            "request_type": "chat",
            "payload": {"messages": [{"role": "user", "content": "Hello"}]}
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["network_used"], json!("gpt4"));
    assert_eq!(body["tokens_used"], json!(21));
    assert_eq!(body["remaining"], json!(9));
    assert_eq!(body["response"]["usage"]["total_tokens"], json!(21));
}

/// Requests without a valid client API key are rejected before any
/// orchestration work happens.
#[test_log::test(tokio::test)]
async fn test_api_rejects_unknown_client_key() {
    let app = create_test_app(create_test_config()).await;
    let server = axum_test::TestServer::new(app.router()).unwrap();

    let response = server
        .post("/api/v1/ai/process")
        .add_header("x-api-key", "not-a-key")
        .json(&json!({"user_id": "alice", "request_type": "chat"}))
        .await;
    response.assert_status_unauthorized();

    let response = server
        .post("/api/v1/ai/process")
        .json(&json!({"user_id": "alice", "request_type": "chat"}))
        .await;
    response.assert_status_unauthorized();
}

/// The discovery endpoint lists active networks without credentials.
#[test_log::test(tokio::test)]
async fn test_networks_listing() {
    let mut config = create_test_config();
    config
        .networks
        .push(network_config("gpt4", "openai", RequestType::Chat, "https://api.openai.com/v1"));
    let mut inactive = network_config("hidden", "mistral", RequestType::Chat, "https://api.mistral.ai");
    inactive.is_active = false;
    config.networks.push(inactive);

    let app = create_test_app(config).await;
    let server = axum_test::TestServer::new(app.router()).unwrap();

    let response = server
        .get("/api/v1/ai/networks")
        .add_header("x-api-key", TEST_CLIENT_KEY)
        .await;
    response.assert_status_ok();

    let networks: Vec<Value> = response.json();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0]["name"], json!("gpt4"));
    assert!(networks[0].get("api_key_encrypted").is_none());
}

/// Fallback scenario: a request explicitly naming a rate-limited paid
/// network is retried once against the free network of the same type, and
/// the final log shows the fallback network.
#[test_log::test(tokio::test)]
async fn test_fallback_after_upstream_rate_limit() {
    let premium_upstream = MockServer::start().await;
    let community_upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .expect(1)
        .mount(&premium_upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(1)
        .mount(&community_upstream)
        .await;

    let mut config = create_test_config();
    let mut premium = network_config("premium", "openai", RequestType::Chat, &format!("{}/v1", premium_upstream.uri()));
    premium.priority = 1;
    let mut community = network_config(
        "community",
        "openai",
        RequestType::Chat,
        &format!("{}/v1", community_upstream.uri()),
    );
    community.is_free = true;
    community.priority = 10;
    config.networks.push(premium);
    config.networks.push(community);

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let outcome = state
        .orchestrator
        .process(&client, chat_request("alice", Some("premium")))
        .await
        .expect("fallback pass should succeed");

    assert_eq!(outcome.status, RequestStatus::Success);
    assert_eq!(outcome.network_used, "community");
    assert_eq!(outcome.tokens_used, 21);

    // Both passes are logged; the final entry shows the fallback network
    let user = state
        .stores
        .users
        .find_by_client_and_external_id(client.id, "alice")
        .await
        .unwrap()
        .unwrap();
    let logs = state.stores.request_logs.find_by_user(user.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, RequestStatus::Failed);
    assert_eq!(logs[1].status, RequestStatus::Success);

    let community_id = state.stores.networks.find_by_name("community").await.unwrap().unwrap().id;
    assert_eq!(logs[1].network_id, Some(community_id));
}

/// A non-rate-limit upstream failure is terminal: no fallback attempt even
/// when a free network exists.
#[test_log::test(tokio::test)]
async fn test_no_fallback_for_other_upstream_errors() {
    let broken_upstream = MockServer::start().await;
    let community_upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&broken_upstream)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(0)
        .mount(&community_upstream)
        .await;

    let mut config = create_test_config();
    let mut broken = network_config("broken", "openai", RequestType::Chat, &format!("{}/v1", broken_upstream.uri()));
    broken.priority = 1;
    let mut community = network_config(
        "community",
        "openai",
        RequestType::Chat,
        &format!("{}/v1", community_upstream.uri()),
    );
    community.is_free = true;
    config.networks.push(broken);
    config.networks.push(community);

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let result = state.orchestrator.process(&client, chat_request("alice", Some("broken"))).await;
    assert!(matches!(result, Err(Error::Upstream { status: 500, .. })));

    community_upstream.verify().await;
}

/// A network without a stored credential fails before any HTTP call is made.
#[test_log::test(tokio::test)]
async fn test_missing_credential_fails_before_upstream_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    let mut bare = network_config("bare", "openai", RequestType::Chat, &format!("{}/v1", mock_server.uri()));
    bare.api_key = None;
    config.networks.push(bare);

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let result = state.orchestrator.process(&client, chat_request("alice", Some("bare"))).await;
    assert!(matches!(result, Err(Error::MissingCredential { .. })));

    mock_server.verify().await;
}

/// The configured daily ceiling is enforced across calls; the first request
/// over the limit is rejected with 429 and never reaches the upstream.
#[test_log::test(tokio::test)]
async fn test_quota_exhaustion_through_api() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config
        .networks
        .push(network_config("gpt4", "openai", RequestType::Chat, &format!("{}/v1", mock_server.uri())));
    config.limits.push(LimitConfig {
        network: "gpt4".to_string(),
        tier: UserTier::Free,
        period: LimitPeriod::Daily,
        request_limit: Some(1),
    });

    let app = create_test_app(config).await;
    let server = axum_test::TestServer::new(app.router()).unwrap();
    let body = json!({
        "user_id": "alice",
        "network_name": "gpt4",
        "request_type": "chat",
        "payload": {"messages": [{"role": "user", "content": "Hello"}]}
    });

    let first = server
        .post("/api/v1/ai/process")
        .add_header("x-api-key", TEST_CLIENT_KEY)
        .json(&body)
        .await;
    first.assert_status_ok();
    let first_body: Value = first.json();
    assert_eq!(first_body["remaining"], json!(0));

    let second = server
        .post("/api/v1/ai/process")
        .add_header("x-api-key", TEST_CLIENT_KEY)
        .json(&body)
        .await;
    assert_eq!(second.status_code(), 429);
    let second_body: Value = second.json();
    assert_eq!(second_body["status"], json!("failed"));

    mock_server.verify().await;
}

/// Transcription end to end: base64 audio uploaded as multipart, usage
/// estimated from transcript length.
#[test_log::test(tokio::test)]
async fn test_transcription_flow() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "a".repeat(40)})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.networks.push(network_config(
        "whisper",
        "whisper",
        RequestType::Transcription,
        &format!("{}/v1", mock_server.uri()),
    ));

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let request = ProcessRequest {
        user_id: "alice".to_string(),
        network_name: None,
        request_type: RequestType::Transcription,
        payload: json!({"audio": "aGVsbG8gd29ybGQ=", "language": "en"})
            .as_object()
            .unwrap()
            .clone(),
    };
    let outcome = state.orchestrator.process(&client, request).await.unwrap();

    assert_eq!(outcome.network_used, "whisper");
    assert_eq!(outcome.tokens_used, 10);
}

/// A transcription request without audio data fails validation before any
/// upstream call.
#[test_log::test(tokio::test)]
async fn test_transcription_without_audio_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.networks.push(network_config(
        "whisper",
        "whisper",
        RequestType::Transcription,
        &format!("{}/v1", mock_server.uri()),
    ));

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let request = ProcessRequest {
        user_id: "alice".to_string(),
        network_name: None,
        request_type: RequestType::Transcription,
        payload: JsonMap::new(),
    };
    let result = state.orchestrator.process(&client, request).await;
    assert!(matches!(result, Err(Error::Validation { .. })));

    mock_server.verify().await;
}

/// Best-effort image generation: when the upstream fails, the caller still
/// receives a deterministic CDN asset URL instead of an error.
#[test_log::test(tokio::test)]
async fn test_image_generation_degrades_to_cdn_fallback() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("offline"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    let mut pollinations = network_config("pollinations", "pollinations", RequestType::Image, &mock_server.uri());
    pollinations.api_key = None;
    pollinations.is_free = true;
    config.networks.push(pollinations);

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let request = ProcessRequest {
        user_id: "alice".to_string(),
        network_name: None,
        request_type: RequestType::Image,
        payload: json!({"prompt": "a red fox"}).as_object().unwrap().clone(),
    };
    let outcome = state.orchestrator.process(&client, request).await.unwrap();

    assert_eq!(outcome.status, RequestStatus::Success);
    let assets = outcome.response.get("assets").and_then(Value::as_array).unwrap();
    assert!(
        assets[0]
            .as_str()
            .unwrap()
            .starts_with("https://image.pollinations.ai/prompt/")
    );
    assert_eq!(outcome.tokens_used, 0);
}

/// Automatic selection skips exhausted networks and picks the lowest
/// priority value with quota remaining.
#[test_log::test(tokio::test)]
async fn test_automatic_selection_skips_exhausted_network() {
    let preferred_upstream = MockServer::start().await;
    let exhausted_upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(1)
        .mount(&preferred_upstream)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body()))
        .expect(0)
        .mount(&exhausted_upstream)
        .await;

    let mut config = create_test_config();
    let mut exhausted = network_config(
        "exhausted",
        "openai",
        RequestType::Chat,
        &format!("{}/v1", exhausted_upstream.uri()),
    );
    exhausted.priority = 1;
    let mut open = network_config(
        "open",
        "openai",
        RequestType::Chat,
        &format!("{}/v1", preferred_upstream.uri()),
    );
    open.priority = 20;
    config.networks.push(exhausted);
    config.networks.push(open);
    config.limits.push(LimitConfig {
        network: "exhausted".to_string(),
        tier: UserTier::Free,
        period: LimitPeriod::Daily,
        request_limit: Some(0),
    });

    let app = create_test_app(config).await;
    let state = app.state();
    let client = test_client(state).await;

    let outcome = state.orchestrator.process(&client, chat_request("alice", None)).await.unwrap();
    assert_eq!(outcome.network_used, "open");

    exhausted_upstream.verify().await;
}
