use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use streamline_types::{ConfigError, Priority, SchedulerConfig, UpdateMetrics};

use crate::processor::BatchProcessor;

/// Smoothing factor for the batch size and processing time averages
const EMA_ALPHA: f64 = 0.2;

/// One display frame at 60 fps, in milliseconds
const FRAME_BUDGET_MS: f64 = 1000.0 / 60.0;

const SLOW_BATCH_MS: f64 = FRAME_BUDGET_MS * 0.5;
const FAST_BATCH_MS: f64 = FRAME_BUDGET_MS * 0.2;

pub const MAX_ADAPTIVE_INTERVAL_MS: f64 = 100.0;
pub const MIN_ADAPTIVE_INTERVAL_MS: f64 = 8.0;

/// A payload waiting for the next flush
#[derive(Debug, Clone)]
pub(crate) struct QueuedUpdate<T> {
    payload: T,
    priority: Priority,
    enqueued_at: Instant,
    /// Tie-breaker for updates enqueued within the same clock tick
    seq: u64,
}

impl<T> QueuedUpdate<T> {
    fn sort_key(&self) -> (Reverse<u8>, Instant, u64) {
        (Reverse(self.priority.weight()), self.enqueued_at, self.seq)
    }
}

struct State<T> {
    queue: Vec<QueuedUpdate<T>>,
    next_seq: u64,
    metrics: UpdateMetrics,
    adaptive_interval_ms: f64,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a timer is armed or cancelled; a firing timer only
    /// drains when its generation is still current
    timer_generation: u64,
    is_processing: bool,
}

impl<T> State<T> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            self.timer_generation += 1;
        }
    }
}

struct Inner<T: Send + 'static> {
    config: SchedulerConfig,
    processor: Arc<dyn BatchProcessor<T>>,
    state: Mutex<State<T>>,
}

/// Who asked for a batch to be drained
#[derive(Clone, Copy)]
enum Trigger {
    Timer(u64),
    Explicit,
}

/// Coalesces updates into size and time bounded batches
///
/// Updates are ordered by priority, then by arrival, and handed to a single
/// [`BatchProcessor`]. The flush timer is single-flight: however many
/// updates arrive, at most one timer task is pending. When the queue
/// reaches `backpressure_threshold`, low priority updates (or failing that,
/// the oldest tenth of the queue) are shed so `len()` never exceeds the
/// threshold.
///
/// Cloning is cheap and every clone drives the same queue.
pub struct BatchScheduler<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for BatchScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> BatchScheduler<T> {
    pub fn new<P>(config: SchedulerConfig, processor: P) -> Result<Self, ConfigError>
    where
        P: BatchProcessor<T> + 'static,
    {
        Self::with_processor(config, Arc::new(processor))
    }

    pub fn with_processor(
        config: SchedulerConfig,
        processor: Arc<dyn BatchProcessor<T>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let state = State {
            queue: Vec::new(),
            next_seq: 0,
            metrics: UpdateMetrics::default(),
            adaptive_interval_ms: config.flush_interval_ms as f64,
            timer: None,
            timer_generation: 0,
            is_processing: false,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                processor,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queue one update and make sure a flush is pending
    ///
    /// Never blocks and never fails. Outside a tokio runtime no timer can be
    /// armed; queued updates then wait for an explicit [`flush`](Self::flush).
    pub fn enqueue(&self, payload: T, priority: Priority) {
        let mut state = self.inner.lock_state();

        if state.queue.len() >= self.inner.config.backpressure_threshold {
            self.inner.shed_load(&mut state);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(QueuedUpdate {
            payload,
            priority,
            enqueued_at: Instant::now(),
            seq,
        });
        state.metrics.total_updates += 1;

        if state.timer.is_none() {
            self.inner.schedule_flush(&mut state);
        }
    }

    pub fn enqueue_batch<I>(&self, payloads: I, priority: Priority)
    where
        I: IntoIterator<Item = T>,
    {
        for payload in payloads {
            self.enqueue(payload, priority);
        }
    }

    /// Cancel the pending timer and drain one batch now
    ///
    /// Returns how many updates were handed to the processor; zero when the
    /// queue is empty or another batch is still being processed.
    pub async fn flush(&self) -> usize {
        self.inner.process_next_batch(Trigger::Explicit).await
    }

    /// Discard everything queued without calling the processor
    pub fn clear(&self) {
        let mut state = self.inner.lock_state();
        state.cancel_timer();
        let discarded = state.queue.len();
        state.queue.clear();

        if discarded > 0 {
            tracing::debug!("Cleared {} queued updates", discarded);
        }
    }

    pub fn metrics(&self) -> UpdateMetrics {
        self.inner.lock_state().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.inner.lock_state().metrics = UpdateMetrics::default();
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock_state().is_processing
    }

    /// Delay the next flush timer will be armed with
    pub fn current_interval(&self) -> Duration {
        let state = self.inner.lock_state();
        self.inner.interval(&state)
    }
}

impl<T: Send + 'static> std::fmt::Debug for BatchScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("BatchScheduler")
            .field("queued", &state.queue.len())
            .field("is_processing", &state.is_processing)
            .field("metrics", &state.metrics)
            .finish()
    }
}

impl<T: Send + 'static> Inner<T> {
    fn lock_state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interval(&self, state: &State<T>) -> Duration {
        if self.config.adaptive_throttling {
            Duration::from_micros((state.adaptive_interval_ms * 1000.0).round() as u64)
        } else {
            Duration::from_millis(self.config.flush_interval_ms)
        }
    }

    /// Arm the flush timer; the caller has checked none is pending
    fn schedule_flush(self: &Arc<Self>, state: &mut State<T>) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!("No tokio runtime, flush deferred until flush() is called");
            return;
        };

        let delay = self.interval(state);
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let inner: Weak<Self> = Arc::downgrade(self);
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.process_next_batch(Trigger::Timer(generation)).await;
            }
        }));
    }

    /// Drop low priority updates, or the oldest tenth when that frees
    /// nothing (or would empty the queue)
    fn shed_load(&self, state: &mut State<T>) {
        let before = state.queue.len();
        let low = state
            .queue
            .iter()
            .filter(|update| update.priority == Priority::Low)
            .count();

        if low > 0 && low < before {
            state.queue.retain(|update| update.priority != Priority::Low);
        } else {
            let count = (before / 10).max(1);
            state.queue.sort_by_key(|update| update.seq);
            state.queue.drain(..count.min(before));
        }

        let dropped = before - state.queue.len();
        state.metrics.dropped_updates += dropped as u64;
        state.metrics.backpressure_events += 1;

        tracing::warn!(
            "Backpressure: dropped {} of {} queued updates (threshold {})",
            dropped,
            before,
            self.config.backpressure_threshold
        );
    }

    async fn process_next_batch(self: &Arc<Self>, trigger: Trigger) -> usize {
        let batch = {
            let mut state = self.lock_state();
            match trigger {
                Trigger::Timer(generation) if generation != state.timer_generation => {
                    tracing::trace!("Stale flush timer {} ignored", generation);
                    return 0;
                }
                Trigger::Timer(_) => state.timer = None,
                Trigger::Explicit => state.cancel_timer(),
            }

            if state.is_processing {
                tracing::debug!("Batch already in flight, skipping flush");
                return 0;
            }
            if state.queue.is_empty() {
                return 0;
            }

            state.queue.sort_by_key(QueuedUpdate::sort_key);
            let take = state.queue.len().min(self.config.max_batch_size);
            let batch: Vec<T> = state
                .queue
                .drain(..take)
                .map(|update| update.payload)
                .collect();
            state.is_processing = true;
            batch
        };

        let size = batch.len();
        let guard = ProcessingGuard { inner: self };
        let started = Instant::now();
        let result = self.processor.process(batch).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        drop(guard);

        let mut state = self.lock_state();
        match result {
            Ok(()) => {
                self.record_batch(&mut state, size, elapsed_ms);
                tracing::debug!(
                    "Processed batch of {} in {:.2}ms ({} still queued)",
                    size,
                    elapsed_ms,
                    state.queue.len()
                );
            }
            Err(e) => {
                tracing::warn!("Batch processor failed, discarding {} updates: {:#}", size, e);
            }
        }

        if !state.queue.is_empty() && state.timer.is_none() {
            self.schedule_flush(&mut state);
        }

        size
    }

    fn record_batch(&self, state: &mut State<T>, size: usize, elapsed_ms: f64) {
        let metrics = &mut state.metrics;
        metrics.batches_processed += 1;
        metrics.average_batch_size = ema(metrics.average_batch_size, size as f64);
        metrics.average_processing_time = ema(metrics.average_processing_time, elapsed_ms);

        if !self.config.adaptive_throttling {
            return;
        }

        let average = metrics.average_processing_time;
        let current = state.adaptive_interval_ms;
        let next = if average > SLOW_BATCH_MS {
            (current * 1.2).min(MAX_ADAPTIVE_INTERVAL_MS)
        } else if average < FAST_BATCH_MS {
            (current * 0.8).max(MIN_ADAPTIVE_INTERVAL_MS)
        } else {
            current
        };

        if next != current {
            tracing::trace!("Adaptive flush interval {:.2}ms -> {:.2}ms", current, next);
            state.adaptive_interval_ms = next;
        }
    }
}

impl<T: Send + 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

/// Clears `is_processing` even when the flush future is dropped mid-batch
struct ProcessingGuard<'a, T: Send + 'static> {
    inner: &'a Inner<T>,
}

impl<T: Send + 'static> Drop for ProcessingGuard<'_, T> {
    fn drop(&mut self) {
        self.inner.lock_state().is_processing = false;
    }
}

fn ema(average: f64, sample: f64) -> f64 {
    EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * average
}
