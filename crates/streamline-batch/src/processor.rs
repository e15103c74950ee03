use async_trait::async_trait;
use std::future::Future;

/// Consumer of flushed batches
///
/// Called with at most `max_batch_size` payloads, never concurrently with
/// itself for the same scheduler. A returned error is logged and the batch
/// is discarded.
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn process(&self, batch: Vec<T>) -> anyhow::Result<()>;
}

/// Synchronous closure adapter, see [`from_fn`]
pub struct FnProcessor<F> {
    f: F,
}

#[async_trait]
impl<T, F> BatchProcessor<T> for FnProcessor<F>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync,
{
    async fn process(&self, batch: Vec<T>) -> anyhow::Result<()> {
        (self.f)(batch)
    }
}

/// Async closure adapter, see [`from_async_fn`]
pub struct AsyncFnProcessor<F> {
    f: F,
}

#[async_trait]
impl<T, F, Fut> BatchProcessor<T> for AsyncFnProcessor<F>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn process(&self, batch: Vec<T>) -> anyhow::Result<()> {
        (self.f)(batch).await
    }
}

pub fn from_fn<T, F>(f: F) -> FnProcessor<F>
where
    F: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync,
{
    FnProcessor { f }
}

pub fn from_async_fn<T, F, Fut>(f: F) -> AsyncFnProcessor<F>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    AsyncFnProcessor { f }
}
