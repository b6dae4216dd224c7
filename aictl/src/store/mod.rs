//! Storage contracts for the orchestration core.
//!
//! Persistence is an external collaborator: the core only depends on the
//! narrow async contracts below (`find`/`save`, no transactional coupling
//! beyond single-row atomicity). [`memory`] provides the in-process
//! reference implementation used by the bundled server and the test suite;
//! a deployment backed by a real database implements the same traits.

pub mod errors;
pub mod memory;
pub mod models;

use crate::types::{ClientId, ExternalUserId, LimitPeriod, NetworkId, RequestLogId, RequestType, UserTier};
use chrono::NaiveDate;
use errors::Result;
use models::{ClientApplication, ExternalUser, Network, NetworkLimit, RequestLog, UsageCounter};
use std::sync::Arc;

#[async_trait::async_trait]
pub trait NetworkStore: Send + Sync {
    /// Look up a network by its unique machine name
    async fn find_by_name(&self, name: &str) -> Result<Option<Network>>;

    /// All active networks, for discovery listings
    async fn find_active(&self) -> Result<Vec<Network>>;

    /// Active networks of the given type, ascending priority (lower first)
    async fn find_active_by_type(&self, network_type: RequestType) -> Result<Vec<Network>>;

    async fn save(&self, network: Network) -> Result<Network>;
}

#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<ClientApplication>>;

    async fn save(&self, client: ClientApplication) -> Result<ClientApplication>;
}

#[async_trait::async_trait]
pub trait ExternalUserStore: Send + Sync {
    async fn find_by_client_and_external_id(
        &self,
        client_id: ClientId,
        external_user_id: &str,
    ) -> Result<Option<ExternalUser>>;

    async fn save(&self, user: ExternalUser) -> Result<ExternalUser>;
}

#[async_trait::async_trait]
pub trait NetworkLimitStore: Send + Sync {
    /// The configured ceiling for (network, tier, period), if any
    async fn find_limit(
        &self,
        network_id: NetworkId,
        tier: UserTier,
        period: LimitPeriod,
    ) -> Result<Option<NetworkLimit>>;

    async fn save(&self, limit: NetworkLimit) -> Result<NetworkLimit>;
}

#[async_trait::async_trait]
pub trait UsageCounterStore: Send + Sync {
    /// The counter for (user, network) whose period starts on the given day
    async fn find_active(
        &self,
        external_user_id: ExternalUserId,
        network_id: NetworkId,
        period_start: NaiveDate,
    ) -> Result<Option<UsageCounter>>;

    /// Upsert keyed by (user, network, period-start) - at most one counter
    /// ever exists per key
    async fn save(&self, counter: UsageCounter) -> Result<UsageCounter>;
}

#[async_trait::async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn get(&self, id: RequestLogId) -> Result<Option<RequestLog>>;

    /// A user's log entries, oldest first
    async fn find_by_user(&self, external_user_id: ExternalUserId) -> Result<Vec<RequestLog>>;

    async fn save(&self, log: RequestLog) -> Result<RequestLog>;
}

/// Bundle of storage handles shared across the application.
///
/// Each field is an independent trait object so deployments can mix backing
/// stores; [`Stores::in_memory`] wires them all to one [`memory::MemoryStore`].
#[derive(Clone)]
pub struct Stores {
    pub networks: Arc<dyn NetworkStore>,
    pub clients: Arc<dyn ClientStore>,
    pub users: Arc<dyn ExternalUserStore>,
    pub limits: Arc<dyn NetworkLimitStore>,
    pub counters: Arc<dyn UsageCounterStore>,
    pub request_logs: Arc<dyn RequestLogStore>,
}

impl Stores {
    /// All stores backed by a single shared in-memory map set.
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            networks: store.clone(),
            clients: store.clone(),
            users: store.clone(),
            limits: store.clone(),
            counters: store.clone(),
            request_logs: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
