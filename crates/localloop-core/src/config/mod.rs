//! Client configuration.
//!
//! Provides a unified `ClientConfig` used by the session manager, the REST
//! client and the push router to discover the backend and tune timeouts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{env_text, normalize_base_url};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 90;
const EVENTS_STREAM_PATH: &str = "events/stream";

/// Runtime client configuration.
///
/// The request timeout is generous on purpose: free-tier backends can take
/// tens of seconds to wake up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_token_expiry_margin_secs")]
    pub token_expiry_margin_secs: i64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: Option<u64>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_token_expiry_margin_secs() -> i64 {
    DEFAULT_TOKEN_EXPIRY_MARGIN_SECS
}

const fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

#[allow(clippy::unnecessary_wraps)]
const fn default_heartbeat_timeout_secs() -> Option<u64> {
    Some(DEFAULT_HEARTBEAT_TIMEOUT_SECS)
}

impl ClientConfig {
    /// Build a config with defaults for everything but the base URL.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        let api_base_url = normalize_base_url(&api_base_url.into())?;
        Ok(Self {
            api_base_url,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_expiry_margin_secs: DEFAULT_TOKEN_EXPIRY_MARGIN_SECS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_timeout_secs: Some(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            data_dir: None,
        })
    }

    /// Read `LOCALLOOP_API_BASE_URL`, `LOCALLOOP_REQUEST_TIMEOUT_SECS` and
    /// `LOCALLOOP_DATA_DIR` from the environment.
    pub fn from_env() -> Result<Self> {
        let base = env_text("LOCALLOOP_API_BASE_URL").ok_or_else(|| {
            Error::InvalidConfiguration("LOCALLOOP_API_BASE_URL is not set".to_string())
        })?;
        let mut config = Self::new(base)?;

        if let Some(raw) = env_text("LOCALLOOP_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw.parse().map_err(|_| {
                Error::InvalidConfiguration(format!(
                    "LOCALLOOP_REQUEST_TIMEOUT_SECS must be a number of seconds, got '{raw}'"
                ))
            })?;
        }
        config.data_dir = env_text("LOCALLOOP_DATA_DIR").map(PathBuf::from);
        Ok(config)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_secs.map(Duration::from_secs)
    }

    /// Absolute URL for a "Concept/action" endpoint.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url,
            build_api_path(&self.api_base_url, endpoint)
        )
    }

    /// Absolute URL of the server-sent events stream.
    pub fn events_url(&self) -> String {
        self.endpoint_url(EVENTS_STREAM_PATH)
    }
}

/// Resolve an endpoint path relative to the API base.
///
/// Bases that already end in `/api` get the bare endpoint; anything else
/// gets an `api/` prefix. The result never starts with a slash.
pub fn build_api_path(base: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    let base = base.trim_end_matches('/');
    if base.ends_with("/api") || base == "api" {
        endpoint.to_string()
    } else {
        format!("api/{endpoint}")
    }
}
