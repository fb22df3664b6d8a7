use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod chat_request;
pub mod response;

/// One conversation turn. Order within a conversation is significant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
    /// Backend-specific fields such as `images`, forwarded as given.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}
