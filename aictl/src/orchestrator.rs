//! Request orchestration: user resolution, network selection, quota
//! enforcement, adapter dispatch and request logging.
//!
//! Each request moves through a fixed sequence: resolve the calling user,
//! select a network (explicit or automatic), enforce quota, dispatch through
//! the provider adapter, record usage and finalize the request log. A
//! failure that signals an upstream rate-limit condition is retried exactly
//! once against a free fallback network of the same type; the retry bound is
//! structural (a flag in the dispatch loop), not a recursion depth.
//!
//! Every terminal failure is persisted to the request log with its message
//! and elapsed time before being returned - callers never see an unlogged
//! failure.

use crate::errors::{Error, Result};
use crate::providers::{JsonMap, ProviderRegistry};
use crate::quota::QuotaTracker;
use crate::store::Stores;
use crate::store::models::{ClientApplication, ExternalUser, Network, RequestLog};
use crate::types::{NetworkId, RequestLogId, RequestStatus, RequestType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A normalized client request, independent of any provider wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    /// Caller-scoped user identity; the external user is created lazily on
    /// first sight
    pub user_id: String,
    /// Explicit network selection; automatic selection by type when absent
    #[serde(default)]
    pub network_name: Option<String>,
    pub request_type: RequestType,
    #[serde(default)]
    pub payload: JsonMap,
}

/// Outcome of a successful orchestration pass.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub request_id: RequestLogId,
    pub status: RequestStatus,
    /// Name of the network that served the request (the fallback's name when
    /// the primary was rate limited)
    pub network_used: String,
    pub response: JsonMap,
    pub tokens_used: u64,
    pub execution_time_ms: u64,
    /// Requests remaining in the current period; absent means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

pub struct Orchestrator {
    stores: Stores,
    registry: Arc<ProviderRegistry>,
    quota: QuotaTracker,
    enable_fallback: bool,
}

impl Orchestrator {
    pub fn new(stores: Stores, registry: Arc<ProviderRegistry>, quota: QuotaTracker, enable_fallback: bool) -> Self {
        Self {
            stores,
            registry,
            quota,
            enable_fallback,
        }
    }

    /// Process one client request end to end.
    pub async fn process(&self, client: &ClientApplication, request: ProcessRequest) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let user = self.resolve_user(client, &request.user_id).await?;

        let mut network = match self.select_network(&user, &request).await {
            Ok(network) => network,
            Err(err) => {
                self.record_failure(client, &user, None, &request, &err, &started).await;
                return Err(err);
            }
        };

        // Dispatch loop: one pass for the selected network plus at most one
        // fallback pass after an upstream rate-limit failure
        let mut fallback_used = false;
        loop {
            let mut log = RequestLog::pending(
                client.id,
                user.id,
                Some(network.id),
                request.request_type,
                request.payload.clone(),
            );
            log = self.stores.request_logs.save(log).await?;

            match self.dispatch(&network, &request).await {
                Ok((response, tokens_used)) => {
                    self.quota.record_usage(&user, &network, tokens_used).await?;

                    let execution_time_ms = elapsed_ms(&started);
                    log.mark_completed(response.clone(), execution_time_ms, tokens_used);
                    self.stores.request_logs.save(log.clone()).await?;

                    let remaining = self.quota.remaining(&user, &network).await?;
                    tracing::info!(
                        network = %network.name,
                        tokens = tokens_used,
                        elapsed_ms = execution_time_ms,
                        "request completed"
                    );

                    return Ok(ProcessOutcome {
                        request_id: log.id,
                        status: RequestStatus::Success,
                        network_used: network.name.clone(),
                        response,
                        tokens_used,
                        execution_time_ms,
                        remaining: remaining.as_option(),
                    });
                }
                Err(err) => {
                    log.mark_failed(err.to_string(), elapsed_ms(&started));
                    self.stores.request_logs.save(log).await?;

                    if !fallback_used
                        && self.enable_fallback
                        && err.is_rate_limited()
                        && let Some(fallback) = self.quota.find_fallback(&user, request.request_type).await?
                    {
                        tracing::info!(
                            from = %network.name,
                            to = %fallback.name,
                            "rate limited upstream, retrying on fallback network"
                        );
                        network = fallback;
                        fallback_used = true;
                        continue;
                    }

                    tracing::warn!(network = %network.name, "request failed: {err}");
                    return Err(err);
                }
            }
        }
    }

    /// Look up the external user, creating it on first request from an
    /// unseen (client, external id) pair.
    async fn resolve_user(&self, client: &ClientApplication, external_user_id: &str) -> Result<ExternalUser> {
        if let Some(user) = self
            .stores
            .users
            .find_by_client_and_external_id(client.id, external_user_id)
            .await?
        {
            return Ok(user);
        }

        tracing::debug!(client = %client.name, user = %external_user_id, "creating external user on first request");
        let user = self.stores.users.save(ExternalUser::new(client.id, external_user_id)).await?;
        Ok(user)
    }

    /// Explicit selection by name, or automatic selection: active networks of
    /// the requested type in ascending priority, first one with quota left.
    async fn select_network(&self, user: &ExternalUser, request: &ProcessRequest) -> Result<Network> {
        let network = match request.network_name.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => self
                .stores
                .networks
                .find_by_name(name)
                .await?
                .ok_or_else(|| Error::UnknownNetwork { name: name.to_string() })?,
            None => {
                let mut selected = None;
                for candidate in self.stores.networks.find_active_by_type(request.request_type).await? {
                    if self.quota.is_available(user, &candidate).await? {
                        selected = Some(candidate);
                        break;
                    }
                }
                selected.ok_or(Error::NoAvailableNetwork {
                    request_type: request.request_type,
                })?
            }
        };

        // Quota applies even when the network is named directly
        if !self.quota.is_available(user, &network).await? {
            return Err(Error::QuotaExceeded {
                network: network.name.clone(),
            });
        }

        Ok(network)
    }

    async fn dispatch(&self, network: &Network, request: &ProcessRequest) -> Result<(JsonMap, u64)> {
        let adapter = self.registry.resolve(&network.provider)?;
        let response = adapter.send(network, &request.payload).await?;
        let tokens_used = adapter.extract_usage(&response);
        Ok((response, tokens_used))
    }

    /// Persist a failed log entry for errors raised before dispatch.
    async fn record_failure(
        &self,
        client: &ClientApplication,
        user: &ExternalUser,
        network_id: Option<NetworkId>,
        request: &ProcessRequest,
        err: &Error,
        started: &Instant,
    ) {
        let mut log = RequestLog::pending(
            client.id,
            user.id,
            network_id,
            request.request_type,
            request.payload.clone(),
        );
        log.mark_failed(err.to_string(), elapsed_ms(started));
        if let Err(save_err) = self.stores.request_logs.save(log).await {
            tracing::error!("failed to persist request log: {save_err}");
        }
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
