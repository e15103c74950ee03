use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use streamline_batch::BatchScheduler;
use streamline_sse::{StreamConnection, Unsubscribe};
use streamline_types::Priority;

/// Poll cadence while a batch started elsewhere is still in flight
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Why the tail loop should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// The server sent `done`
    Completed,
    /// The connection reached `Closed` without one (retries exhausted, bad config)
    Closed,
}

/// Route a connection's events into the scheduler and the log
///
/// Tokens are queued at normal priority; everything else is logged. The
/// first of `done` / `close` is reported on `finished`.
pub fn attach(
    connection: &StreamConnection,
    scheduler: &BatchScheduler<String>,
    finished: UnboundedSender<Finished>,
) -> Vec<Unsubscribe> {
    let tokens = scheduler.clone();
    let done = finished.clone();

    vec![
        connection.on_token(move |token| tokens.enqueue(token.to_display_string(), Priority::Normal)),
        connection.on_metadata(|metadata| {
            tracing::info!(
                model = metadata.model.as_deref().unwrap_or("unknown"),
                "Stream metadata received"
            );
        }),
        connection.on_progress(|progress| {
            tracing::debug!("Progress {:.0}%", progress.progress * 100.0);
        }),
        connection.on_message(|message| tracing::debug!("Unnamed event: {}", message)),
        connection.on_error(|error| tracing::warn!("Stream error: {}", error)),
        connection.on_reconnecting(|info| {
            tracing::info!(
                "Reconnecting in {}ms (attempt {}/{})",
                info.interval_ms,
                info.attempt,
                info.max_attempts
            );
        }),
        connection.on_max_reconnect_attempts(|info| {
            tracing::error!("Gave up after {} reconnect attempts", info.attempts);
        }),
        connection.on_done(move |_| {
            let _ = done.send(Finished::Completed);
        }),
        connection.on_close(move |_| {
            let _ = finished.send(Finished::Closed);
        }),
    ]
}

/// Flush until nothing is queued and no batch is in flight
///
/// `flush` yields zero while a timer-driven batch is running, so the queue
/// is polled again until that batch finishes.
pub async fn drain<T: Send + 'static>(scheduler: &BatchScheduler<T>) {
    loop {
        scheduler.flush().await;
        if scheduler.is_empty() && !scheduler.is_processing() {
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
