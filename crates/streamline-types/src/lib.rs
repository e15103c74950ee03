pub mod config;
pub mod error;
pub mod events;
pub mod state;

pub use config::{ConnectionConfig, CredentialsMode, SchedulerConfig};
pub use error::{ConfigError, StreamError};
pub use events::{
    Completion, ExhaustedInfo, Progress, ReconnectInfo, ReconnectedInfo, ServerError,
    StreamingMetadata, Token,
};
pub use state::{ConnectionState, ConnectionStats, Priority, ReadyState, UpdateMetrics};
