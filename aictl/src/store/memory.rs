//! In-memory storage backed by concurrent maps.
//!
//! Single-row atomicity only: each `save` replaces one entry under its key.
//! Usage counters are keyed by (user, network, period-start), which upholds
//! the one-counter-per-period invariant structurally.

use super::errors::Result;
use super::models::{ClientApplication, ExternalUser, Network, NetworkLimit, RequestLog, UsageCounter};
use super::{ClientStore, ExternalUserStore, NetworkLimitStore, NetworkStore, RequestLogStore, UsageCounterStore};
use crate::types::{ClientId, ExternalUserId, LimitPeriod, NetworkId, RequestLogId, RequestType, UserTier};
use chrono::NaiveDate;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    networks: DashMap<NetworkId, Network>,
    clients: DashMap<ClientId, ClientApplication>,
    users: DashMap<ExternalUserId, ExternalUser>,
    limits: DashMap<(NetworkId, UserTier, LimitPeriod), NetworkLimit>,
    counters: DashMap<(ExternalUserId, NetworkId, NaiveDate), UsageCounter>,
    request_logs: DashMap<RequestLogId, RequestLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NetworkStore for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Network>> {
        Ok(self
            .networks
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| entry.value().clone()))
    }

    async fn find_active(&self) -> Result<Vec<Network>> {
        let mut networks: Vec<Network> = self
            .networks
            .iter()
            .filter(|entry| entry.value().is_active)
            .map(|entry| entry.value().clone())
            .collect();
        networks.sort_by_key(|n| n.priority);
        Ok(networks)
    }

    async fn find_active_by_type(&self, network_type: RequestType) -> Result<Vec<Network>> {
        let mut networks: Vec<Network> = self
            .networks
            .iter()
            .filter(|entry| entry.value().is_active && entry.value().network_type == network_type)
            .map(|entry| entry.value().clone())
            .collect();
        networks.sort_by_key(|n| n.priority);
        Ok(networks)
    }

    async fn save(&self, network: Network) -> Result<Network> {
        self.networks.insert(network.id, network.clone());
        Ok(network)
    }
}

#[async_trait::async_trait]
impl ClientStore for MemoryStore {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<ClientApplication>> {
        Ok(self
            .clients
            .iter()
            .find(|entry| entry.value().api_key == api_key)
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, client: ClientApplication) -> Result<ClientApplication> {
        self.clients.insert(client.id, client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl ExternalUserStore for MemoryStore {
    async fn find_by_client_and_external_id(
        &self,
        client_id: ClientId,
        external_user_id: &str,
    ) -> Result<Option<ExternalUser>> {
        Ok(self
            .users
            .iter()
            .find(|entry| {
                let user = entry.value();
                user.client_id == client_id && user.external_user_id == external_user_id
            })
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, user: ExternalUser) -> Result<ExternalUser> {
        self.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait::async_trait]
impl NetworkLimitStore for MemoryStore {
    async fn find_limit(
        &self,
        network_id: NetworkId,
        tier: UserTier,
        period: LimitPeriod,
    ) -> Result<Option<NetworkLimit>> {
        Ok(self
            .limits
            .get(&(network_id, tier, period))
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, limit: NetworkLimit) -> Result<NetworkLimit> {
        self.limits
            .insert((limit.network_id, limit.tier, limit.period), limit.clone());
        Ok(limit)
    }
}

#[async_trait::async_trait]
impl UsageCounterStore for MemoryStore {
    async fn find_active(
        &self,
        external_user_id: ExternalUserId,
        network_id: NetworkId,
        period_start: NaiveDate,
    ) -> Result<Option<UsageCounter>> {
        Ok(self
            .counters
            .get(&(external_user_id, network_id, period_start))
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, counter: UsageCounter) -> Result<UsageCounter> {
        self.counters.insert(
            (counter.external_user_id, counter.network_id, counter.period_start),
            counter.clone(),
        );
        Ok(counter)
    }
}

#[async_trait::async_trait]
impl RequestLogStore for MemoryStore {
    async fn get(&self, id: RequestLogId) -> Result<Option<RequestLog>> {
        Ok(self.request_logs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_user(&self, external_user_id: ExternalUserId) -> Result<Vec<RequestLog>> {
        let mut logs: Vec<RequestLog> = self
            .request_logs
            .iter()
            .filter(|entry| entry.value().external_user_id == external_user_id)
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by_key(|log| log.created_at);
        Ok(logs)
    }

    async fn save(&self, log: RequestLog) -> Result<RequestLog> {
        self.request_logs.insert(log.id, log.clone());
        Ok(log)
    }
}
