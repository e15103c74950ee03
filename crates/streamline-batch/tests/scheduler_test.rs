use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamline_batch::{from_async_fn, from_fn, BatchScheduler};
use streamline_types::{Priority, SchedulerConfig, UpdateMetrics};

type Batches = Arc<Mutex<Vec<Vec<u32>>>>;

/// Scheduler whose processor records every batch it receives
fn recording(config: SchedulerConfig) -> (BatchScheduler<u32>, Batches) {
    let batches: Batches = Arc::default();
    let sink = Arc::clone(&batches);
    let scheduler = BatchScheduler::new(
        config,
        from_fn(move |batch: Vec<u32>| {
            sink.lock().unwrap().push(batch);
            Ok(())
        }),
    )
    .unwrap();
    (scheduler, batches)
}

/// Scheduler whose processor takes `cost` of (virtual) time per batch
fn slow(config: SchedulerConfig, cost: Duration) -> (BatchScheduler<u32>, Batches) {
    let batches: Batches = Arc::default();
    let sink = Arc::clone(&batches);
    let scheduler = BatchScheduler::new(
        config,
        from_async_fn(move |batch: Vec<u32>| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(cost).await;
                sink.lock().unwrap().push(batch);
                Ok::<(), anyhow::Error>(())
            }
        }),
    )
    .unwrap();
    (scheduler, batches)
}

#[tokio::test(start_paused = true)]
async fn test_flush_takes_at_most_max_batch_size() {
    let (scheduler, batches) = recording(SchedulerConfig::new().with_max_batch_size(50));

    for id in 0..60 {
        let priority = if id >= 50 { Priority::High } else { Priority::Normal };
        scheduler.enqueue(id, priority);
    }

    assert_eq!(scheduler.flush().await, 50);
    assert_eq!(scheduler.len(), 10);

    let expected_first: Vec<u32> = (50..60).chain(0..40).collect();
    assert_eq!(batches.lock().unwrap()[0], expected_first);

    // The remainder goes out on the next cycle
    tokio::time::sleep(Duration::from_millis(100)).await;
    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1], (40..50).collect::<Vec<_>>());
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timer_drains_queue_in_batches() {
    let (scheduler, batches) = recording(SchedulerConfig::new().with_max_batch_size(50));

    scheduler.enqueue_batch(0..60, Priority::Normal);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sizes: Vec<usize> = batches.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![50, 10]);

    let metrics = scheduler.metrics();
    assert_eq!(metrics.total_updates, 60);
    assert_eq!(metrics.batches_processed, 2);
    // 0.2 * 50, then 0.2 * 10 + 0.8 * 10
    assert!((metrics.average_batch_size - 10.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_single_timer_for_burst() {
    let (scheduler, batches) = recording(SchedulerConfig::new());

    scheduler.enqueue(1, Priority::Normal);
    scheduler.enqueue(2, Priority::Low);
    scheduler.enqueue(3, Priority::High);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*batches.lock().unwrap(), vec![vec![3, 1, 2]]);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_drops_exactly_one_low_update() {
    let (scheduler, _batches) = recording(SchedulerConfig::new().with_backpressure_threshold(5));

    for id in 0..6 {
        scheduler.enqueue(id, Priority::Low);
    }

    let metrics = scheduler.metrics();
    assert_eq!(metrics.dropped_updates, 1);
    assert_eq!(metrics.backpressure_events, 1);
    assert_eq!(metrics.total_updates, 6);
    assert_eq!(scheduler.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_queue_never_exceeds_threshold() {
    let (scheduler, _batches) = recording(SchedulerConfig::new().with_backpressure_threshold(20));
    let priorities = [Priority::Low, Priority::Normal, Priority::High, Priority::Normal];

    for id in 0..500u32 {
        scheduler.enqueue(id, priorities[id as usize % priorities.len()]);
        assert!(scheduler.len() <= 20, "queue grew to {}", scheduler.len());
    }

    let metrics = scheduler.metrics();
    assert_eq!(metrics.total_updates, 500);
    assert_eq!(metrics.dropped_updates + scheduler.len() as u64, 500);
}

#[tokio::test(start_paused = true)]
async fn test_slow_batches_widen_interval() {
    let (scheduler, _batches) = slow(SchedulerConfig::new(), Duration::from_millis(50));
    assert_eq!(scheduler.current_interval(), Duration::from_millis(16));

    scheduler.enqueue(0, Priority::Normal);
    scheduler.flush().await;
    assert!(scheduler.current_interval() > Duration::from_millis(16));

    for id in 1..40 {
        scheduler.enqueue(id, Priority::Normal);
        scheduler.flush().await;
    }
    assert_eq!(scheduler.current_interval(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_fast_batches_narrow_interval() {
    let (scheduler, _batches) = recording(SchedulerConfig::new());

    for id in 0..10 {
        scheduler.enqueue(id, Priority::Normal);
        scheduler.flush().await;
    }

    assert_eq!(scheduler.current_interval(), Duration::from_millis(8));
    assert_eq!(scheduler.metrics().average_processing_time, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_interval_without_adaptive_throttling() {
    let (scheduler, _batches) = slow(
        SchedulerConfig::new().with_adaptive_throttling(false),
        Duration::from_millis(50),
    );

    for id in 0..5 {
        scheduler.enqueue(id, Priority::Normal);
        scheduler.flush().await;
    }

    assert_eq!(scheduler.current_interval(), Duration::from_millis(16));
    assert!(scheduler.metrics().average_processing_time > 8.0);
}

#[tokio::test(start_paused = true)]
async fn test_updates_during_processing_are_not_stranded() {
    let (scheduler, batches) = slow(SchedulerConfig::new(), Duration::from_millis(20));

    scheduler.enqueue(1, Priority::Normal);
    tokio::time::sleep(Duration::from_millis(17)).await;
    assert!(scheduler.is_processing());

    scheduler.enqueue(2, Priority::Normal);
    assert_eq!(scheduler.flush().await, 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*batches.lock().unwrap(), vec![vec![1], vec![2]]);
    assert!(!scheduler.is_processing());
}

#[tokio::test(start_paused = true)]
async fn test_processor_failure_is_not_retried() {
    let calls = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&calls);
    let scheduler = BatchScheduler::new(
        SchedulerConfig::new(),
        from_fn(move |_batch: Vec<u32>| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                anyhow::bail!("render sink unavailable");
            }
            Ok(())
        }),
    )
    .unwrap();

    scheduler.enqueue(1, Priority::Normal);
    assert_eq!(scheduler.flush().await, 1);
    assert!(!scheduler.is_processing());
    assert!(scheduler.is_empty());
    assert_eq!(scheduler.metrics().batches_processed, 0);

    scheduler.enqueue(2, Priority::Normal);
    assert_eq!(scheduler.flush().await, 1);
    assert_eq!(scheduler.metrics().batches_processed, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_is_idempotent() {
    let (scheduler, batches) = recording(SchedulerConfig::new());

    scheduler.enqueue_batch(0..5, Priority::High);
    scheduler.clear();
    scheduler.clear();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(scheduler.is_empty());
    assert!(batches.lock().unwrap().is_empty());
    assert_eq!(scheduler.metrics().total_updates, 5);
    assert_eq!(scheduler.flush().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_metrics() {
    let (scheduler, _batches) = recording(SchedulerConfig::new().with_backpressure_threshold(1));

    scheduler.enqueue(1, Priority::Normal);
    scheduler.enqueue(2, Priority::Normal);
    scheduler.flush().await;
    assert_eq!(scheduler.metrics().dropped_updates, 1);

    scheduler.reset_metrics();
    assert_eq!(scheduler.metrics(), UpdateMetrics::default());
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_queue() {
    let (scheduler, batches) = recording(SchedulerConfig::new());
    let producer = scheduler.clone();

    let handle = tokio::spawn(async move {
        producer.enqueue_batch([7, 8], Priority::Normal);
    });
    handle.await.unwrap();

    assert_eq!(scheduler.len(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*batches.lock().unwrap(), vec![vec![7, 8]]);
}
