//! Request handlers for the HTTP surface.

use super::models::{HealthResponse, NetworkInfo};
use crate::AppState;
use crate::errors::{Error, Result};
use crate::orchestrator::{ProcessOutcome, ProcessRequest};
use crate::store::models::ClientApplication;
use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};

const API_KEY_HEADER: &str = "x-api-key";

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Process one AI request on behalf of an authenticated client application.
pub async fn process_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessOutcome>> {
    let client = authenticate_client(&state, &headers).await?;
    let outcome = state.orchestrator.process(&client, request).await?;
    Ok(Json(outcome))
}

/// Active networks available for selection, without credentials.
pub async fn list_networks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<NetworkInfo>>> {
    authenticate_client(&state, &headers).await?;
    let networks = state.stores.networks.find_active().await?;
    Ok(Json(networks.into_iter().map(NetworkInfo::from).collect()))
}

/// Resolve the calling client application from the `X-Api-Key` header.
/// Unknown or inactive keys are rejected before any orchestration work.
async fn authenticate_client(state: &AppState, headers: &HeaderMap) -> Result<ClientApplication> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(Error::Unauthenticated)?;

    let client = state
        .stores
        .clients
        .find_by_api_key(api_key)
        .await?
        .ok_or(Error::Unauthenticated)?;

    if !client.is_active {
        return Err(Error::Unauthenticated);
    }

    Ok(client)
}
