pub mod processor;
pub mod scheduler;

pub use processor::{from_async_fn, from_fn, AsyncFnProcessor, BatchProcessor, FnProcessor};
pub use scheduler::{BatchScheduler, MAX_ADAPTIVE_INTERVAL_MS, MIN_ADAPTIVE_INTERVAL_MS};
