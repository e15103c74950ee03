use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ServerError;

/// Failures surfaced through a connection's error channel
///
/// None of these are fatal to the caller: they are reported for
/// observability while the connection recovers on its own.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Unexpected HTTP status: {status}")]
    Status { status: u16 },

    #[error("No event received for {elapsed_ms}ms (timeout {timeout_ms}ms)")]
    HeartbeatTimeout { elapsed_ms: u64, timeout_ms: u64 },

    #[error("Server error: {}", .0.message)]
    Server(ServerError),

    #[error("Stream ended before completion")]
    StreamEnded,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for StreamError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Endpoint URL is empty")]
    MissingUrl,

    #[error("Reconnect decay must be a finite value >= 1.0, got {0}")]
    InvalidDecay(f64),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}
