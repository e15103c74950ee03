//! # Streamline
//!
//! Resilient consumption of incrementally generated responses over
//! Server-Sent Events, plus an adaptive batch scheduler that keeps a
//! downstream consumer (typically a UI render loop) from being flooded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streamline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = BatchScheduler::new(
//!         SchedulerConfig::default(),
//!         from_fn(|tokens: Vec<String>| {
//!             print!("{}", tokens.concat());
//!             Ok(())
//!         }),
//!     )?;
//!
//!     let connection = StreamConnection::new(
//!         ConnectionConfig::new("http://localhost:3000/stream")
//!             .with_header("Authorization", "Bearer token"),
//!     );
//!
//!     let sink = scheduler.clone();
//!     let _tokens = connection.on_token(move |token| {
//!         sink.enqueue(token.to_display_string(), Priority::Normal);
//!     });
//!     let _errors = connection.on_error(|error| eprintln!("stream error: {}", error));
//!
//!     tokio::signal::ctrl_c().await?;
//!     connection.close();
//!     scheduler.flush().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`streamline-types`**: configuration, payloads, stats and errors
//! - **`streamline-sse`**: `StreamConnection`, SSE parsing, the `Transport` seam
//! - **`streamline-batch`**: `BatchScheduler` with backpressure and adaptive throttling
//!
//! The two halves are independent; callers wire connection callbacks into
//! `BatchScheduler::enqueue` themselves.
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use streamline_types::{
    Completion, ConfigError, ConnectionConfig, ConnectionState, ConnectionStats,
    CredentialsMode, ExhaustedInfo, Priority, Progress, ReadyState, ReconnectInfo,
    ReconnectedInfo, SchedulerConfig, ServerError, StreamError, StreamingMetadata, Token,
    UpdateMetrics,
};

pub use streamline_sse::{
    decode_frame, parse_sse_stream, HttpTransport, ServerEvent, SseFrame, SseStream,
    StreamConnection, Transport, Unsubscribe,
};

pub use streamline_batch::{from_async_fn, from_fn, BatchProcessor, BatchScheduler};
