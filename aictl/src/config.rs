//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can
//! be specified via `-f` flag or `AICTL_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AICTL_` override
//!    YAML values; use double underscores for nesting
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding
//! - **Security**: `secret_key` - symmetric key for the credential vault
//! - **Routing**: `enable_fallback` - one-shot rate-limit fallback toggle
//! - **Networks**: `networks` - upstream provider endpoints; their `api_key`
//!   values are plaintext in the file and encrypted into the store at startup
//! - **Limits**: `limits` - per (network, tier, period) request ceilings
//! - **Clients**: `clients` - client applications and their API keys

use crate::types::{LimitPeriod, RequestType, UserTier};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default secret from the upstream project; only acceptable outside production.
const DEFAULT_SECRET_KEY: &str = "change-this-to-32-byte-secret-key-in-production";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AICTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded once at startup and passed into the components that need it; the
/// core never re-reads configuration from disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for the credential vault
    pub secret_key: String,
    /// Retry once against a free network of the same type after an upstream
    /// rate-limit failure
    pub enable_fallback: bool,
    /// CORS origins allowed to call the API; empty allows any origin
    pub cors_origins: Vec<String>,
    /// Upstream networks registered at startup
    pub networks: Vec<NetworkConfig>,
    /// Request ceilings registered at startup
    pub limits: Vec<LimitConfig>,
    /// Client applications allowed to call the broker
    pub clients: Vec<ClientConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            enable_fallback: true,
            cors_origins: Vec::new(),
            networks: Vec::new(),
            limits: Vec::new(),
            clients: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the YAML file named by `args` plus `AICTL_`
    /// environment overrides.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let config: Config = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("AICTL_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.secret_key.is_empty() {
            anyhow::bail!("secret_key must not be empty");
        }
        if self.secret_key == DEFAULT_SECRET_KEY {
            tracing::warn!("secret_key is the built-in default; set a unique value in production");
        }

        for limit in &self.limits {
            if !self.networks.iter().any(|n| n.name == limit.network) {
                anyhow::bail!("limit references unknown network: {}", limit.network);
            }
        }

        let mut names: Vec<&str> = self.networks.iter().map(|n| n.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.networks.len() {
            anyhow::bail!("network names must be unique");
        }

        Ok(())
    }
}

/// An upstream network as declared in configuration. The stored record is
/// created from this at startup, with `api_key` encrypted by the vault.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub provider: String,
    pub network_type: RequestType,
    pub api_url: String,
    /// Plaintext provider credential; never stored unencrypted
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub request_mapping: Option<Map<String, Value>>,
    #[serde(default)]
    pub response_mapping: Option<Map<String, Value>>,
}

/// A request ceiling for (network, tier, period). A missing `request_limit`
/// means the row only documents an explicitly unlimited combination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    /// Network name the limit applies to
    pub network: String,
    pub tier: UserTier,
    #[serde(default)]
    pub period: LimitPeriod,
    #[serde(default)]
    pub request_limit: Option<u32>,
}

/// A client application allowed to call the broker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub name: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}
