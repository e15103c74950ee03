//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use streamline::prelude::*;
//! ```

pub use crate::{
    BatchProcessor, BatchScheduler, Completion, ConnectionConfig, ConnectionState,
    ConnectionStats, Priority, Progress, SchedulerConfig, StreamConnection, StreamError,
    StreamingMetadata, Token, Unsubscribe, UpdateMetrics,
};
pub use crate::{from_async_fn, from_fn};
