//! Response DTOs for the HTTP surface.

use crate::store::models::Network;
use crate::types::{NetworkId, RequestType};
use serde::Serialize;

/// Public view of a network for client discovery. Carries no credential or
/// mapping configuration.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub id: NetworkId,
    pub name: String,
    pub display_name: String,
    pub provider: String,
    pub network_type: RequestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub is_free: bool,
    pub priority: i32,
}

impl From<Network> for NetworkInfo {
    fn from(network: Network) -> Self {
        Self {
            id: network.id,
            name: network.name,
            display_name: network.display_name,
            provider: network.provider,
            network_type: network.network_type,
            model_name: network.model_name,
            is_free: network.is_free,
            priority: network.priority,
        }
    }
}

/// Liveness response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
