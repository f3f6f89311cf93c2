//! Executor configuration
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (`--server`)
//! 2. Environment variables (`GROUPEXEC_SERVER_URL`, `GROUPEXEC_CLIENT_ID`)
//! 3. Config file (`--config path.toml`)
//! 4. Defaults

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GroupExecError;
use crate::orchestrator::RunSettings;
use crate::poller::PollerSettings;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";
pub const DEFAULT_SENDER_CLASS: &str = "CCXGroupExecutorSender";
pub const DEFAULT_BACKEND_ENDPOINT: &str = "/ccx_group_executor/execute_backend";

pub const ENV_SERVER_URL: &str = "GROUPEXEC_SERVER_URL";
pub const ENV_CLIENT_ID: &str = "GROUPEXEC_CLIENT_ID";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Base URL of the queue server
    pub server_url: String,

    /// Client id sent with submissions (random when unset)
    pub client_id: Option<String>,

    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,

    /// How long Completed/Cancelled stay visible before the run resets
    pub status_hold_ms: u64,

    pub request_timeout_secs: u64,

    /// Upper bound on a single queue wait; unbounded when unset
    pub max_queue_wait_secs: Option<u64>,

    /// Re-roll `seed`/`noise_seed` inputs on every submission
    pub randomize_seeds: bool,

    /// Class of the nodes that trigger submission interception
    pub sender_class: String,

    /// Server route accepting delegated plans
    pub backend_endpoint: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            client_id: None,
            poll_interval_ms: 300,
            settle_delay_ms: 200,
            status_hold_ms: 2000,
            request_timeout_secs: 30,
            max_queue_wait_secs: None,
            randomize_seeds: false,
            sender_class: DEFAULT_SENDER_CLASS.to_string(),
            backend_endpoint: DEFAULT_BACKEND_ENDPOINT.to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Load defaults, then the optional TOML file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, GroupExecError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    GroupExecError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    pub fn from_toml(content: &str) -> Result<Self, GroupExecError> {
        toml::from_str(content)
            .map_err(|e| GroupExecError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Environment variables take precedence over file values
    pub fn with_env(self) -> Self {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = Some(id);
        }
        self
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Parsed server URL; only http(s) is accepted
    pub fn server_url(&self) -> Result<Url, GroupExecError> {
        let url = Url::parse(&self.server_url).map_err(|e| {
            GroupExecError::Config(format!("Invalid server URL '{}': {}", self.server_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(GroupExecError::Config(format!(
                "Unsupported server URL scheme '{}' (expected http or https)",
                other
            ))),
        }
    }

    /// Configured client id, or a fresh random one
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn validate(&self) -> Result<(), GroupExecError> {
        self.server_url()?;
        if self.poll_interval_ms == 0 {
            return Err(GroupExecError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.sender_class.trim().is_empty() {
            return Err(GroupExecError::Config("sender_class must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            max_wait: self.max_queue_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            status_hold: Duration::from_millis(self.status_hold_ms),
            randomize_seeds: self.randomize_seeds,
        }
    }
}
