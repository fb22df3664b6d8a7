use serde_json::Value;
use thiserror::Error;

use super::Message;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Reasons an inbound body is rejected before anything is sent upstream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Request body must be valid JSON")]
    MalformedJson,
    #[error("Messages array is required and must not be empty")]
    MissingMessages,
    #[error("Each message must have role and content fields")]
    InvalidMessage,
    #[error("Prompt is required and must be a string")]
    InvalidPrompt,
    #[error("{field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

impl ShapeError {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeError::InvalidMessage => "Invalid message format",
            _ => "Invalid request",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        ChatRequest {
            messages,
            model: None,
            stream: false,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn from_json(body: &[u8]) -> Result<Self, ShapeError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ShapeError::MalformedJson)?;

        let items = match value.get("messages") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Err(ShapeError::MissingMessages),
        };
        let messages = items
            .iter()
            .map(message_from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let stream = match value.get("stream") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(invalid_field("stream", "a boolean")),
        };
        let temperature = match value.get("temperature") {
            None | Some(Value::Null) => DEFAULT_TEMPERATURE,
            Some(v) => v.as_f64().ok_or(invalid_field("temperature", "a number"))?,
        };
        let max_tokens = match value.get("max_tokens") {
            None | Some(Value::Null) => DEFAULT_MAX_TOKENS,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(invalid_field("max_tokens", "a non-negative integer"))?,
        };

        Ok(ChatRequest {
            messages,
            model: optional_model(&value)?,
            stream,
            temperature,
            max_tokens,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: Option<String>,
}

impl GenerateRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, ShapeError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ShapeError::MalformedJson)?;
        let prompt = value
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|prompt| !prompt.is_empty())
            .ok_or(ShapeError::InvalidPrompt)?;
        Ok(GenerateRequest {
            prompt: prompt.to_string(),
            model: optional_model(&value)?,
        })
    }

    /// A generate call is a one-turn chat from the user.
    pub fn into_chat_request(self) -> ChatRequest {
        ChatRequest::new(vec![Message::user(self.prompt)]).with_model(self.model)
    }
}

fn message_from_value(value: &Value) -> Result<Message, ShapeError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    };
    let (Some(role), Some(content)) = (field("role"), field("content")) else {
        return Err(ShapeError::InvalidMessage);
    };
    let mut message = Message::new(role, content);
    if let Some(object) = value.as_object() {
        message.extra = object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "role" | "content"))
            .map(|(key, field)| (key.clone(), field.clone()))
            .collect();
    }
    Ok(message)
}

// An empty model name falls back to the configured default.
fn optional_model(value: &Value) -> Result<Option<String>, ShapeError> {
    match value.get("model") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(model)) if model.is_empty() => Ok(None),
        Some(Value::String(model)) => Ok(Some(model.clone())),
        Some(_) => Err(invalid_field("model", "a string")),
    }
}

fn invalid_field(field: &'static str, expected: &'static str) -> ShapeError {
    ShapeError::InvalidField { field, expected }
}
