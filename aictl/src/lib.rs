//! # aictl: AI Integration Control Layer
//!
//! `aictl` brokers requests from client applications to multiple third-party
//! AI providers (chat, transcription, image generation) behind one
//! normalized interface, enforcing per-user usage quotas and keeping
//! provider credentials encrypted at rest.
//!
//! ## Overview
//!
//! Client applications authenticate with an API key and submit normalized
//! requests naming a user, a request type, and an optional explicit network.
//! The orchestrator resolves the calling user (creating it lazily on first
//! sight), selects a configured network - explicit by name, or automatically
//! by ascending priority among active networks of the requested type with
//! quota remaining - and dispatches through the provider adapter matching
//! the network's provider tag. On success, token usage is extracted from the
//! provider response and recorded against the user's daily counter; the
//! response is returned together with remaining-quota metadata. An upstream
//! rate-limit failure is retried exactly once against a free network of the
//! same type.
//!
//! Every orchestration attempt is recorded: a request log entry is created
//! in `pending` when dispatch starts and finalized as `success` or `failed`
//! (with message and elapsed time) before the outcome reaches the caller.
//!
//! ### Core Components
//!
//! - [`crypto`]: the credential vault - AES-256-GCM encryption of provider
//!   API keys with a key injected from configuration.
//! - [`providers`]: one adapter per provider family behind the
//!   [`providers::ProviderAdapter`] trait, selected through a fixed
//!   case-insensitive dispatch table ([`providers::ProviderRegistry`]).
//! - [`quota`]: per (user, network, period) counters answering availability
//!   and remaining-quota questions. The check-then-record pair is a
//!   documented soft limit, not a hard cap.
//! - [`orchestrator`]: the per-request control flow described above.
//! - [`store`]: narrow async storage contracts with an in-memory reference
//!   implementation; persistence is an external collaborator.
//! - [`api`]: the thin axum surface (`POST /api/v1/ai/process`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use aictl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = aictl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     aictl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

use crate::crypto::CredentialVault;
use crate::orchestrator::Orchestrator;
use crate::providers::ProviderRegistry;
use crate::quota::QuotaTracker;
use crate::store::Stores;
use crate::store::models::{ClientApplication, Network, NetworkLimit};
use axum::Router;
use axum::http::HeaderValue;
use bon::Builder;
pub use config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub use types::{ClientId, ExternalUserId, NetworkId, RequestLogId, RequestType, UserTier};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub orchestrator: Arc<Orchestrator>,
}

/// The assembled application: seeded stores, adapter registry, orchestrator
/// and HTTP router.
pub struct Application {
    state: AppState,
}

impl Application {
    /// Build the application from configuration: construct the vault and
    /// adapter registry, seed the stores with configured networks, limits
    /// and clients (encrypting provider credentials on the way in), and wire
    /// the orchestrator.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let vault = Arc::new(CredentialVault::new(&config.secret_key));
        let stores = Stores::in_memory();
        let registry = Arc::new(ProviderRegistry::new(reqwest::Client::new(), vault.clone()));

        seed_stores(&config, &stores, &vault, &registry).await?;

        let quota = QuotaTracker::new(stores.limits.clone(), stores.counters.clone(), stores.networks.clone());
        let orchestrator = Arc::new(Orchestrator::new(
            stores.clone(),
            registry,
            quota,
            config.enable_fallback,
        ));

        let state = AppState::builder()
            .config(config)
            .stores(stores)
            .orchestrator(orchestrator)
            .build();

        Ok(Self { state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The HTTP router with tracing and CORS layers applied.
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            .layer(cors_layer(&self.state.config))
    }

    /// Bind and serve until the shutdown future resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("listening on {addr}");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Populate the stores from configuration. Provider tags are validated
/// against the registry and plaintext credentials are encrypted before they
/// are stored.
async fn seed_stores(
    config: &Config,
    stores: &Stores,
    vault: &CredentialVault,
    registry: &ProviderRegistry,
) -> anyhow::Result<()> {
    for client in &config.clients {
        stores
            .clients
            .save(
                ClientApplication::builder()
                    .name(client.name.clone())
                    .api_key(client.api_key.clone())
                    .is_active(client.is_active)
                    .build(),
            )
            .await?;
    }

    let mut network_ids = HashMap::new();
    for seed in &config.networks {
        registry
            .resolve(&seed.provider)
            .map_err(|_| anyhow::anyhow!("network {} uses unknown provider {}", seed.name, seed.provider))?;

        let api_key_encrypted = match seed.api_key.as_deref() {
            Some(key) if !key.is_empty() => Some(vault.encrypt(key)?),
            _ => None,
        };

        let network = Network::builder()
            .name(seed.name.clone())
            .display_name(seed.display_name.clone().unwrap_or_else(|| seed.name.clone()))
            .provider(seed.provider.clone())
            .network_type(seed.network_type)
            .api_url(seed.api_url.clone())
            .maybe_api_key_encrypted(api_key_encrypted)
            .maybe_model_name(seed.model_name.clone())
            .is_active(seed.is_active)
            .is_free(seed.is_free)
            .priority(seed.priority)
            .timeout(seed.timeout)
            .max_retries(seed.max_retries)
            .maybe_request_mapping(seed.request_mapping.clone())
            .maybe_response_mapping(seed.response_mapping.clone())
            .build();

        network_ids.insert(seed.name.clone(), network.id);
        stores.networks.save(network).await?;
    }

    for limit in &config.limits {
        let network_id = network_ids
            .get(&limit.network)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("limit references unknown network: {}", limit.network))?;
        stores
            .limits
            .save(NetworkLimit::new(network_id, limit.tier, limit.period, limit.request_limit))
            .await?;
    }

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
