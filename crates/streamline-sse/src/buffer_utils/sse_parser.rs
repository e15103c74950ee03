use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

use streamline_types::StreamError;

use super::buffering::CircularLineBuffer;

/// Frames decoded from a server-sent event stream
pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send>>;

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field; `None` for unnamed messages
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn unnamed(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Event name with the protocol default applied
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental field parser: feed lines, get a frame on each blank line
///
/// Unlike browser event sources, a frame that names an event but carries no
/// `data:` line is still dispatched, so bare `event: heartbeat` frames count.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (terminator already stripped)
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse::<u64>() {
                    self.retry = Some(retry);
                }
            }
            other => tracing::trace!("Ignoring unknown SSE field: {}", other),
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take();
        let retry = self.retry.take();

        if event.is_none() && data.is_none() {
            return None;
        }

        Some(SseFrame {
            event: event.filter(|name| !name.is_empty()),
            data: data.unwrap_or_default(),
            // Last event id persists across frames, like the protocol's lastEventId
            id: self.id.clone(),
            retry,
        })
    }
}

/// Generic SSE stream parser using circular buffer
///
/// Turns any byte-chunk stream into dispatched frames. A trailing frame
/// without its terminating blank line is discarded at end of stream.
pub fn parse_sse_stream<S, B, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(byte_stream);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut parser = SseFrameParser::new();

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref());

                    // Process all complete lines in buffer
                    while let Some(line_result) = buffer.next_line() {
                        match line_result {
                            Ok(line) => {
                                if let Some(frame) = parser.push_line(&line) {
                                    yield Ok(frame);
                                }
                            }
                            Err(e) => tracing::warn!("Skipping undecodable SSE line: {}", e),
                        }
                    }
                }
                Err(e) => {
                    yield Err(StreamError::transport(format!("Stream error: {}", e)));
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn feed(parser: &mut SseFrameParser, text: &str) -> Vec<SseFrame> {
        text.split('\n').filter_map(|line| parser.push_line(line)).collect()
    }

    #[test]
    fn test_named_event() {
        let mut parser = SseFrameParser::new();
        let frames = feed(&mut parser, "event: token\ndata: {\"content\":\"hi\"}\n\n");

        assert_eq!(frames, vec![SseFrame::new("token", r#"{"content":"hi"}"#)]);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut parser = SseFrameParser::new();
        let frames = feed(&mut parser, ": keep-alive\ndata: one\ndata:two\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, None);
        assert_eq!(frames[0].event_name(), "message");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn test_bare_event_dispatches() {
        let mut parser = SseFrameParser::new();
        let frames = feed(&mut parser, "event: heartbeat\n\n\n");

        assert_eq!(frames, vec![SseFrame::new("heartbeat", "")]);
    }

    #[test]
    fn test_id_persists_and_retry_parsed() {
        let mut parser = SseFrameParser::new();
        let frames = feed(&mut parser, "id: 7\nretry: 2500\ndata: a\n\ndata: b\n\n");

        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].retry, Some(2500));
        assert_eq!(frames[1].id.as_deref(), Some("7"));
        assert_eq!(frames[1].retry, None);
    }

    #[tokio::test]
    async fn test_stream_split_across_chunks() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"event: tok".to_vec()),
            Ok(b"en\r\ndata: hel".to_vec()),
            Ok(b"lo\r\n\r\nevent: done\ndata: {}\n\ndata: dangling".to_vec()),
        ];

        let frames: Vec<_> = parse_sse_stream(stream::iter(chunks)).collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &SseFrame::new("token", "hello"));
        assert_eq!(frames[1].as_ref().unwrap(), &SseFrame::new("done", "{}"));
    }

    #[tokio::test]
    async fn test_stream_error_terminates() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: a\n\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: b\n\n".to_vec()),
        ];

        let frames: Vec<_> = parse_sse_stream(stream::iter(chunks)).collect().await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(StreamError::Transport { .. })));
    }
}
