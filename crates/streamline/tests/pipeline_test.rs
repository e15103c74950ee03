use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamline::prelude::*;
use streamline::{SseFrame, SseStream, Transport};

/// Replays a fixed generation once
struct Replay;

#[async_trait]
impl Transport for Replay {
    async fn open(&self, _config: &ConnectionConfig) -> Result<SseStream, StreamError> {
        let frames = vec![
            SseFrame::new("metadata", r#"{"model":"gpt-4o"}"#),
            SseFrame::new("token", r#"{"content":"Stream"}"#),
            SseFrame::new("token", r#"{"content":"ing "}"#),
            SseFrame::new("progress", r#"{"progress":0.5}"#),
            SseFrame::new("token", r#"{"content":"works"}"#),
            SseFrame::new("done", "{}"),
        ];
        Ok(Box::pin(stream::iter(frames.into_iter().map(Ok::<_, StreamError>))))
    }
}

#[tokio::test(start_paused = true)]
async fn test_connection_feeds_scheduler() {
    let rendered = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let sink = Arc::clone(&rendered);
    let scheduler = BatchScheduler::new(
        SchedulerConfig::default(),
        from_fn(move |batch: Vec<String>| {
            sink.lock().unwrap().push(batch);
            Ok(())
        }),
    )
    .unwrap();

    let connection = StreamConnection::with_transport(
        ConnectionConfig::new("http://test.local/stream"),
        Arc::new(Replay),
    );

    let tokens = scheduler.clone();
    let _tokens = connection.on_token(move |token| {
        tokens.enqueue(token.to_display_string(), Priority::Normal);
    });
    let progress = scheduler.clone();
    let _progress = connection.on_progress(move |p| {
        progress.enqueue(format!("[{:.0}%]", p.progress * 100.0), Priority::Low);
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(
        *rendered.lock().unwrap(),
        vec![vec![
            "Stream".to_string(),
            "ing ".to_string(),
            "works".to_string(),
            "[50%]".to_string(),
        ]]
    );
    assert_eq!(scheduler.metrics().total_updates, 4);
}
