//! Per-user request quotas and fallback network lookup.
//!
//! The tracker answers "is this call allowed" against configured
//! [`NetworkLimit`]s and records usage into [`UsageCounter`]s after completed
//! calls. The current period for daily limits is the calendar day in server
//! time zone.
//!
//! The check-then-increment sequence (`is_available` followed later by
//! `record_usage`) is not atomic: concurrent calls from the same user against
//! the same network can all pass the availability check before any of them
//! records usage, so a limit can transiently be exceeded by the number of
//! in-flight calls. This is a soft limit. Callers that need a hard cap must
//! serialize the check-and-record pair per (user, network).
//!
//! [`NetworkLimit`]: crate::store::models::NetworkLimit
//! [`UsageCounter`]: crate::store::models::UsageCounter

use crate::errors::Result;
use crate::store::models::{ExternalUser, Network, UsageCounter};
use crate::store::{NetworkLimitStore, NetworkStore, UsageCounterStore};
use crate::types::{LimitPeriod, RequestType};
use chrono::{Local, NaiveDate};
use std::sync::Arc;

/// Requests left in the current period for a (user, network) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// No limit configured for the user's tier
    Unlimited,
    Count(u32),
}

impl Remaining {
    /// Remaining count as an optional number, `None` meaning unlimited.
    pub fn as_option(&self) -> Option<u32> {
        match self {
            Remaining::Unlimited => None,
            Remaining::Count(n) => Some(*n),
        }
    }
}

/// Tracks usage counters and answers quota questions for the orchestrator.
#[derive(Clone)]
pub struct QuotaTracker {
    limits: Arc<dyn NetworkLimitStore>,
    counters: Arc<dyn UsageCounterStore>,
    networks: Arc<dyn NetworkStore>,
}

impl QuotaTracker {
    pub fn new(
        limits: Arc<dyn NetworkLimitStore>,
        counters: Arc<dyn UsageCounterStore>,
        networks: Arc<dyn NetworkStore>,
    ) -> Self {
        Self {
            limits,
            counters,
            networks,
        }
    }

    /// Start of the current daily period: today in server time zone.
    fn current_period_start() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Whether the user may call this network right now.
    ///
    /// True when no limit is configured for the user's tier, or when counted
    /// usage in the current period is below the configured ceiling.
    pub async fn is_available(&self, user: &ExternalUser, network: &Network) -> Result<bool> {
        let limit = self
            .limits
            .find_limit(network.id, user.tier, LimitPeriod::Daily)
            .await?;

        let Some(ceiling) = limit.and_then(|l| l.request_limit) else {
            // No limit configured = unlimited
            return Ok(true);
        };

        let used = self.used_in_current_period(user, network).await?;
        Ok(used < ceiling)
    }

    /// Requests remaining in the current period, `max(0, limit - used)`.
    pub async fn remaining(&self, user: &ExternalUser, network: &Network) -> Result<Remaining> {
        let limit = self
            .limits
            .find_limit(network.id, user.tier, LimitPeriod::Daily)
            .await?;

        let Some(ceiling) = limit.and_then(|l| l.request_limit) else {
            return Ok(Remaining::Unlimited);
        };

        let used = self.used_in_current_period(user, network).await?;
        Ok(Remaining::Count(ceiling.saturating_sub(used)))
    }

    /// Record one completed call against the matching period counter,
    /// creating the counter on first use in a period.
    pub async fn record_usage(&self, user: &ExternalUser, network: &Network, tokens_used: u64) -> Result<()> {
        let period_start = Self::current_period_start();

        let mut counter = self
            .counters
            .find_active(user.id, network.id, period_start)
            .await?
            .unwrap_or_else(|| UsageCounter::new(user.id, network.id, period_start));

        counter.increment(tokens_used);
        tracing::debug!(
            user = %user.external_user_id,
            network = %network.name,
            requests = counter.request_count,
            tokens = counter.token_count,
            "recorded usage"
        );
        self.counters.save(counter).await?;
        Ok(())
    }

    /// First free, active network of the given type (ascending priority) the
    /// user still has quota on. Used for the one-shot rate-limit fallback.
    pub async fn find_fallback(&self, user: &ExternalUser, network_type: RequestType) -> Result<Option<Network>> {
        for network in self.networks.find_active_by_type(network_type).await? {
            if network.is_free && self.is_available(user, &network).await? {
                return Ok(Some(network));
            }
        }
        Ok(None)
    }

    async fn used_in_current_period(&self, user: &ExternalUser, network: &Network) -> Result<u32> {
        let counter = self
            .counters
            .find_active(user.id, network.id, Self::current_period_start())
            .await?;
        Ok(counter.map(|c| c.request_count).unwrap_or(0))
    }
}
