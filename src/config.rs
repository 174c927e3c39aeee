//! Configuration management for Ratewall.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "RATEWALL";

/// Conventional variable names used by hosted REST counter stores.
const REST_URL_VAR: &str = "UPSTASH_REDIS_REST_URL";
const REST_TOKEN_VAR: &str = "UPSTASH_REDIS_REST_TOKEN";

/// Main configuration for the Ratewall service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatewallConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Counter store configuration.
///
/// The remote store is used only when both `remote_url` and `remote_token`
/// are present; otherwise every counter lives in the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the REST counter store
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token for the REST counter store
    #[serde(default)]
    pub remote_token: Option<String>,

    /// Per-command timeout for the remote store in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Interval between sweeps of expired local entries, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_token: None,
            request_timeout_ms: default_request_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_request_timeout() -> u64 {
    1500
}

fn default_sweep_interval() -> u64 {
    60
}

/// Connection details for the remote counter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub url: String,
    pub token: String,
}

impl StoreConfig {
    /// The remote endpoint, if both the URL and the token are configured.
    pub fn remote(&self) -> Option<RemoteEndpoint> {
        let url = self.remote_url.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let token = self.remote_token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(RemoteEndpoint {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Fill unset remote settings from the conventional REST store variables.
    fn apply_rest_env_fallback(&mut self) {
        if self.remote_url.is_none() {
            self.remote_url = std::env::var(REST_URL_VAR).ok();
        }
        if self.remote_token.is_none() {
            self.remote_token = std::env::var(REST_TOKEN_VAR).ok();
        }
    }
}

impl RatewallConfig {
    /// Load configuration from an optional YAML file and the environment.
    ///
    /// Environment keys use the `RATEWALL_` prefix and `__` between nesting
    /// levels, e.g. `RATEWALL_STORE__REMOTE_URL`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: RatewallConfig = builder.build()?.try_deserialize()?;
        config.store.apply_rest_env_fallback();
        Ok(config)
    }
}
