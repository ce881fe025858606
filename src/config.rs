//! Client configuration and environment overrides.
//!
//! Each setting resolves in priority order:
//!
//! 1. An explicit value on [`ClientConfig`] (or in its JSON form).
//! 2. The matching environment variable, when built with [`ClientConfig::from_env`].
//! 3. The built-in default.

use crate::error::{InferenceError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical model hub.
pub const HF_HUB_URL: &str = "https://huggingface.co";
/// Routing proxy in front of every provider.
pub const HF_ROUTER_URL: &str = "https://router.huggingface.co";

/// Overrides [`ClientConfig::hub_url`].
pub const HUB_URL_ENV: &str = "HF_ENDPOINT";
/// Overrides [`ClientConfig::router_url`].
pub const ROUTER_URL_ENV: &str = "HF_ROUTER_URL";
/// Default access token.
pub const TOKEN_ENV: &str = "HF_TOKEN";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_TASK_TTL_SECS: u64 = 10 * 60;
const DEFAULT_TASK_CAPACITY: usize = 1000;

/// Settings shared by every request issued through one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub hub_url: String,
    pub router_url: String,
    pub user_agent: String,
    /// Token used when a request does not carry its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Delay between polls of asynchronous provider jobs.
    pub poll_interval_ms: u64,
    /// Lifetime of cached model pipeline tags.
    pub default_task_ttl_secs: u64,
    /// Maximum number of cached pipeline tags.
    pub default_task_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: HF_HUB_URL.to_string(),
            router_url: HF_ROUTER_URL.to_string(),
            user_agent: default_user_agent(),
            access_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_task_ttl_secs: DEFAULT_TASK_TTL_SECS,
            default_task_capacity: DEFAULT_TASK_CAPACITY,
        }
    }
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    /// Defaults, overridden by `HF_ENDPOINT`, `HF_ROUTER_URL`, and `HF_TOKEN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(HUB_URL_ENV) {
            config.hub_url = url;
        }
        if let Ok(url) = std::env::var(ROUTER_URL_ENV) {
            config.router_url = url;
        }
        config.access_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        config
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| InferenceError::Config(format!("Invalid client config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check URLs parse and trim trailing slashes so paths can be joined with
    /// a single `/`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("hub_url", &self.hub_url), ("router_url", &self.router_url)] {
            url::Url::parse(value).map_err(|e| {
                InferenceError::Config(format!("{name} '{value}' is not a URL: {e}"))
            })?;
        }
        if self.default_task_capacity == 0 {
            return Err(InferenceError::Config(
                "default_task_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.hub_url = self.hub_url.trim_end_matches('/').to_string();
        self.router_url = self.router_url.trim_end_matches('/').to_string();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_task_ttl(&self) -> Duration {
        Duration::from_secs(self.default_task_ttl_secs)
    }
}
