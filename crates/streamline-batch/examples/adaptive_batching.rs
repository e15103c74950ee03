use anyhow::Result;
use std::time::Duration;
use streamline_batch::{from_async_fn, BatchScheduler};
use streamline_types::{Priority, SchedulerConfig};
use tokio::time::Instant;

/// Bursty producer against a render sink that gets slower as batches grow.
/// Watch the flush interval stretch under load and shrink once it eases.
#[tokio::main]
async fn main() -> Result<()> {
    let scheduler = BatchScheduler::new(
        SchedulerConfig::default().with_backpressure_threshold(200),
        from_async_fn(|batch: Vec<String>| async move {
            // Mock render cost: 0.5ms per update
            tokio::time::sleep(Duration::from_micros(batch.len() as u64 * 500)).await;
            print!("{}", batch.concat());
            Ok::<(), anyhow::Error>(())
        }),
    )?;

    let start_time = Instant::now();

    for burst in 0..20u64 {
        let heavy = burst < 10;
        let updates = if heavy { 120 } else { 5 };

        for i in 0..updates {
            let priority = if i % 10 == 0 { Priority::High } else { Priority::Low };
            scheduler.enqueue(".".to_string(), priority);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        let metrics = scheduler.metrics();
        println!(
            "\n[ADAPTIVE] Interval: {:?} | Processing: {:.1}ms | Batch: {:.1} | Dropped: {}",
            scheduler.current_interval(),
            metrics.average_processing_time,
            metrics.average_batch_size,
            metrics.dropped_updates
        );
    }

    while scheduler.flush().await > 0 {}

    let metrics = scheduler.metrics();
    println!("\n=== Statistics ===");
    println!("Time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Updates: {}", metrics.total_updates);
    println!("Batches: {}", metrics.batches_processed);
    println!("Backpressure events: {}", metrics.backpressure_events);

    Ok(())
}
