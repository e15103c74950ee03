use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

/// How credentials travel with the stream request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsMode {
    /// Never send `Authorization` or `Cookie` headers
    Omit,
    #[default]
    SameOrigin,
    Include,
}

impl CredentialsMode {
    pub fn allows_credentials(&self) -> bool {
        !matches!(self, CredentialsMode::Omit)
    }
}

/// Configuration for one push connection
///
/// Immutable once handed to a connection. Reconfiguring means building a new
/// connection from a new config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    /// Base delay before the first reconnect attempt
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Multiplier applied per failed attempt
    #[serde(default = "default_reconnect_decay")]
    pub reconnect_decay: f64,
    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Silence longer than this while open counts as a dead connection
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub credentials: CredentialsMode,
    /// JSON body; when present the stream is requested with POST instead of GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_reconnect() -> bool {
    true
}

fn default_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_reconnect_decay() -> f64 {
    1.5
}

fn default_max_reconnect_interval_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: default_reconnect(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_decay: default_reconnect_decay(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            headers: HashMap::new(),
            credentials: CredentialsMode::default(),
            body: None,
        }
    }

    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reconnect_decay(mut self, decay: f64) -> Self {
        self.reconnect_decay = decay;
        self
    }

    pub fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = mode;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Backoff delay for a zero-indexed attempt:
    /// `min(base * decay^attempt, max)`
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnect_interval_ms as f64;
        let max = self.max_reconnect_interval_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (base * self.reconnect_decay.powi(exponent)).min(max);

        // NaN/inf from a pathological decay collapse to the cap
        if delay.is_finite() && delay >= 0.0 {
            Duration::from_millis(delay.round() as u64)
        } else {
            Duration::from_millis(self.max_reconnect_interval_ms)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !self.reconnect_decay.is_finite() || self.reconnect_decay < 1.0 {
            return Err(ConfigError::InvalidDecay(self.reconnect_decay));
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("heartbeat_timeout_ms"));
        }
        Ok(())
    }
}

/// Tuning for the batch scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Fixed flush interval, also the seed of the adaptive interval
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: usize,
    #[serde(default = "default_adaptive_throttling")]
    pub adaptive_throttling: bool,
}

fn default_max_batch_size() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    16
}

fn default_backpressure_threshold() -> usize {
    1_000
}

fn default_adaptive_throttling() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            backpressure_threshold: default_backpressure_threshold(),
            adaptive_throttling: default_adaptive_throttling(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_backpressure_threshold(mut self, threshold: usize) -> Self {
        self.backpressure_threshold = threshold;
        self
    }

    pub fn with_adaptive_throttling(mut self, enabled: bool) -> Self {
        self.adaptive_throttling = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroValue("max_batch_size"));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("flush_interval_ms"));
        }
        if self.backpressure_threshold == 0 {
            return Err(ConfigError::ZeroValue("backpressure_threshold"));
        }
        Ok(())
    }
}
