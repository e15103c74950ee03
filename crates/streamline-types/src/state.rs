use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StreamError;

/// Lifecycle of a push connection
///
/// `Idle → Connecting → Open → (Error | Closed)`; `Error` moves to
/// `Reconnecting` while retries remain, otherwise to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Error,
    /// Waiting out a backoff delay before the next connect
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn ready_state(&self) -> ReadyState {
        match self {
            ConnectionState::Idle
            | ConnectionState::Connecting
            | ConnectionState::Error
            | ConnectionState::Reconnecting => ReadyState::Connecting,
            ConnectionState::Open => ReadyState::Open,
            ConnectionState::Closed => ReadyState::Closed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Coarse transport state, in the shape browsers expose for event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

/// Read-only snapshot of a connection's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub reconnect_count: u64,
    pub message_count: u64,
    pub error_count: u64,
    pub last_error: Option<StreamError>,
    /// Live while connected, otherwise the length of the last session
    pub uptime: Duration,
}

/// Scheduling weight of a queued update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

/// Scheduler counters
///
/// Everything accumulates except the two averages, which are exponential
/// moving averages with α = 0.2.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetrics {
    pub total_updates: u64,
    pub batches_processed: u64,
    pub average_batch_size: f64,
    /// Milliseconds
    pub average_processing_time: f64,
    pub dropped_updates: u64,
    pub backpressure_events: u64,
}
