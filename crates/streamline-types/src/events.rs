use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded `token` event
///
/// Payloads with a string `content` (or a bare JSON string) are `Text`.
/// Anything else that parses keeps its JSON shape; malformed JSON becomes
/// `Text` holding the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    Text(String),
    Structured(Value),
}

impl Token {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Text(text) => Some(text),
            Token::Structured(Value::String(text)) => Some(text),
            Token::Structured(_) => None,
        }
    }

    /// Render for display: text as-is, structured values as compact JSON
    pub fn to_display_string(&self) -> String {
        match self {
            Token::Text(text) => text.clone(),
            Token::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for Token {
    fn from(text: &str) -> Self {
        Token::Text(text.to_string())
    }
}

impl From<String> for Token {
    fn from(text: String) -> Self {
        Token::Text(text)
    }
}

/// Descriptive data about the in-flight generation
///
/// Passed through verbatim. Any valid JSON decodes: unknown fields, and
/// known fields whose value does not fit the typed slot, are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct StreamingMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for StreamingMetadata {
    fn from(value: Value) -> Self {
        let mut extra = match value {
            Value::Object(fields) => fields,
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        Self {
            model: take_field(&mut extra, "model"),
            temperature: take_field(&mut extra, "temperature"),
            max_tokens: take_field(&mut extra, "maxTokens"),
            tools: take_field(&mut extra, "tools"),
            estimated_duration: take_field(&mut extra, "estimatedDuration"),
            token_count: take_field(&mut extra, "tokenCount"),
            extra,
        }
    }
}

/// Moves `key` out of `fields` only when it converts to `T`
fn take_field<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let typed = T::deserialize(fields.get(key)?).ok()?;
    fields.remove(key);
    Some(typed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated: Option<f64>,
}

/// Error reported by the server inside the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }
}

/// Payload of the `done` event; empty when the server sent nothing usable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Completion {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Emitted each time a reconnect is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectInfo {
    /// One-based attempt number
    pub attempt: u32,
    pub interval_ms: u64,
    pub max_attempts: u32,
}

/// Emitted when a connection comes back after at least one reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectedInfo {
    pub reconnect_count: u64,
}

/// Emitted once when reconnection gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExhaustedInfo {
    pub attempts: u32,
}
