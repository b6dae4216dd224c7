//! Entity types persisted through the storage contracts.
//!
//! Networks and limits are owned by an administrative surface and read-only
//! to the orchestration core. External users, usage counters and request logs
//! are created and updated here.

use crate::types::{ClientId, ExternalUserId, LimitPeriod, NetworkId, RequestLogId, RequestStatus, RequestType, UserTier};
use bon::Builder;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// A configured upstream AI provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Network {
    #[builder(default = Uuid::new_v4())]
    pub id: NetworkId,
    /// Unique machine name clients may select explicitly
    #[builder(into)]
    pub name: String,
    /// Human-readable name for discovery listings
    #[builder(into)]
    pub display_name: String,
    /// Provider tag resolved against the adapter registry (case-insensitive)
    #[builder(into)]
    pub provider: String,
    pub network_type: RequestType,
    /// Base URL of the upstream API. Adapters append their fixed path suffix
    /// if not already present.
    #[builder(into)]
    pub api_url: String,
    /// Credential encrypted by the vault. None or empty means the network
    /// has no stored credential.
    #[builder(into)]
    pub api_key_encrypted: Option<String>,
    /// Default model attached to requests that don't name one
    #[builder(into)]
    pub model_name: Option<String>,
    #[builder(default = true)]
    pub is_active: bool,
    #[builder(default = false)]
    pub is_free: bool,
    /// Selection preference, lower wins
    #[builder(default = 100)]
    pub priority: i32,
    /// Upper bound on a single upstream call
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
    #[builder(default = 3)]
    pub max_retries: u32,
    /// Optional key-rename map applied to outgoing payloads
    pub request_mapping: Option<Map<String, Value>>,
    /// Optional key-rename map applied to upstream responses
    pub response_mapping: Option<Map<String, Value>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

/// A client application allowed to call the broker, identified by API key.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct ClientApplication {
    #[builder(default = Uuid::new_v4())]
    pub id: ClientId,
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub api_key: String,
    #[builder(default = true)]
    pub is_active: bool,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// An end user of a client application, created lazily on first request
/// from an unseen (client, external id) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: ExternalUserId,
    pub client_id: ClientId,
    pub external_user_id: String,
    pub tier: UserTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalUser {
    pub fn new(client_id: ClientId, external_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            external_user_id: external_user_id.into(),
            tier: UserTier::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request ceiling for a (network, tier, period) triple.
/// A missing row or a `None` ceiling means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLimit {
    pub id: Uuid,
    pub network_id: NetworkId,
    pub tier: UserTier,
    pub period: LimitPeriod,
    pub request_limit: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl NetworkLimit {
    pub fn new(network_id: NetworkId, tier: UserTier, period: LimitPeriod, request_limit: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            network_id,
            tier,
            period,
            request_limit,
            created_at: Utc::now(),
        }
    }
}

/// Per (user, network, period) usage accumulator.
///
/// At most one counter exists per (user, network, period-start); it is
/// created on first use in a period, incremented on every completed call,
/// and never decremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCounter {
    pub id: Uuid,
    pub external_user_id: ExternalUserId,
    pub network_id: NetworkId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub request_count: u32,
    pub token_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageCounter {
    pub fn new(external_user_id: ExternalUserId, network_id: NetworkId, period_start: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_user_id,
            network_id,
            period_start,
            // Daily period: start and end are the same calendar day
            period_end: period_start,
            request_count: 0,
            token_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn increment(&mut self, tokens_used: u64) {
        self.request_count += 1;
        self.token_count += tokens_used;
        self.updated_at = Utc::now();
    }
}

/// Immutable record of one orchestration attempt.
///
/// Created in `pending` when the attempt starts and finalized exactly once
/// (`success` or `failed`) before the outcome is returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: RequestLogId,
    pub client_id: ClientId,
    pub external_user_id: ExternalUserId,
    pub network_id: Option<NetworkId>,
    pub request_type: RequestType,
    pub request_payload: Map<String, Value>,
    pub response_payload: Option<Map<String, Value>>,
    pub status: RequestStatus,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub tokens_used: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RequestLog {
    pub fn pending(
        client_id: ClientId,
        external_user_id: ExternalUserId,
        network_id: Option<NetworkId>,
        request_type: RequestType,
        request_payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            external_user_id,
            network_id,
            request_type,
            request_payload,
            response_payload: None,
            status: RequestStatus::Pending,
            error_message: None,
            execution_time_ms: None,
            tokens_used: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn mark_completed(&mut self, response: Map<String, Value>, execution_time_ms: u64, tokens_used: u64) {
        self.status = RequestStatus::Success;
        self.response_payload = Some(response);
        self.execution_time_ms = Some(execution_time_ms);
        self.tokens_used = Some(tokens_used);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>, execution_time_ms: u64) {
        self.status = RequestStatus::Failed;
        self.error_message = Some(error_message.into());
        self.execution_time_ms = Some(execution_time_ms);
        self.completed_at = Some(Utc::now());
    }
}
