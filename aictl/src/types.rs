//! Common type definitions shared across the crate.
//!
//! This module defines:
//! - Type aliases for entity IDs (ClientId, ExternalUserId, etc.)
//! - The request/network type taxonomy ([`RequestType`])
//! - User tier and quota period enums consumed by the quota tracker
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type ClientId = Uuid;
pub type ExternalUserId = Uuid;
pub type NetworkId = Uuid;
pub type RequestLogId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// The kind of work a network performs and a request asks for.
///
/// A request of a given type is only ever routed to networks of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Chat,
    Transcription,
    Image,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Chat => write!(f, "chat"),
            RequestType::Transcription => write!(f, "transcription"),
            RequestType::Image => write!(f, "image"),
        }
    }
}

/// Usage class of an external user. Selects which [`NetworkLimit`] applies.
///
/// [`NetworkLimit`]: crate::store::models::NetworkLimit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    New,
    Free,
    Paid,
}

impl Default for UserTier {
    fn default() -> Self {
        UserTier::Free
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserTier::New => write!(f, "new"),
            UserTier::Free => write!(f, "free"),
            UserTier::Paid => write!(f, "paid"),
        }
    }
}

/// Quota accounting window over which a usage counter accumulates.
///
/// Only daily limits are enforced by the tracker today; the other variants
/// exist so limit configuration stays representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPeriod {
    Daily,
    Monthly,
    Yearly,
}

impl Default for LimitPeriod {
    fn default() -> Self {
        LimitPeriod::Daily
    }
}

/// Lifecycle state of a request log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Success,
    Failed,
}
