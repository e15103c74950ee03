use serde_json::Value;

use streamline_types::{Completion, Progress, ServerError, StreamingMetadata, Token};

use crate::buffer_utils::SseFrame;

/// Typed view of one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Token(Token),
    Metadata(StreamingMetadata),
    Progress(Progress),
    /// Server-reported failure; handled like a transport error
    Error(ServerError),
    Done(Completion),
    Heartbeat,
    /// Unnamed frame (or one explicitly named `message`)
    Message(String),
}

/// Decode a frame according to its event name
///
/// Returns `None` when the frame is dropped: `metadata` that is not JSON,
/// malformed `progress` payloads and event names this pipeline does not know.
/// Every other kind always yields a value, falling back when the payload
/// does not parse.
pub fn decode_frame(frame: &SseFrame) -> Option<ServerEvent> {
    match frame.event_name() {
        "token" => Some(ServerEvent::Token(decode_token(&frame.data))),
        "metadata" => match serde_json::from_str::<StreamingMetadata>(&frame.data) {
            Ok(metadata) => Some(ServerEvent::Metadata(metadata)),
            Err(e) => {
                tracing::warn!("Dropping malformed metadata event: {}", e);
                None
            }
        },
        "progress" => match serde_json::from_str::<Progress>(&frame.data) {
            Ok(progress) => Some(ServerEvent::Progress(progress)),
            Err(e) => {
                tracing::warn!("Dropping malformed progress event: {}", e);
                None
            }
        },
        "error" => Some(ServerEvent::Error(decode_server_error(&frame.data))),
        "done" => Some(ServerEvent::Done(decode_completion(&frame.data))),
        "heartbeat" => Some(ServerEvent::Heartbeat),
        "message" => Some(ServerEvent::Message(frame.data.clone())),
        other => {
            tracing::debug!("Ignoring unsupported event type: {}", other);
            None
        }
    }
}

/// `{"content": ...}` yields the content, other JSON is kept whole, and
/// anything unparseable is passed through as raw text
pub fn decode_token(data: &str) -> Token {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(mut object)) => match object.remove("content") {
            Some(Value::String(content)) => Token::Text(content),
            Some(content) => Token::Structured(content),
            None => Token::Structured(Value::Object(object)),
        },
        Ok(Value::String(text)) => Token::Text(text),
        Ok(other) => Token::Structured(other),
        Err(e) => {
            tracing::debug!("Token payload is not JSON, passing raw text through: {}", e);
            Token::Text(data.to_string())
        }
    }
}

pub fn decode_server_error(data: &str) -> ServerError {
    serde_json::from_str::<ServerError>(data).unwrap_or_else(|e| {
        tracing::warn!("Malformed error event, using raw payload: {}", e);
        ServerError::new(data)
    })
}

pub fn decode_completion(data: &str) -> Completion {
    serde_json::from_str::<Completion>(data).unwrap_or_else(|e| {
        tracing::warn!("Malformed done event, emitting empty completion: {}", e);
        Completion::default()
    })
}
