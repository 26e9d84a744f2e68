//! Wire types for the relay's `/v1/messages` surface.
//!
//! Notes:
//! - Message `content` may be the Anthropic shorthand string or an array of
//!   typed blocks. Both are accepted via `#[serde(untagged)]`.
//! - Only `text` blocks carry meaning for the relay; other block types are
//!   kept so a passthrough body can be validated without rejecting them.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Stop reason reported when the backend gives none (always the case for the
/// CLI subprocess).
pub const DEFAULT_STOP_REASON: &str = "end_turn";

/// A message in an inbound chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Content,
}

/// Either a string shorthand or a content block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    String(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Lossy plain-text representation (non-text blocks are dropped).
    pub fn to_plaintext(&self) -> String {
        match self {
            Content::String(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Other => None,
                })
                .collect(),
        }
    }
}

/// A content block within `messages[].content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Images, tool calls and anything newer. Not interpreted by the relay.
    #[serde(other)]
    Other,
}

/// Parsed request body for `POST /v1/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Any JSON number; validating it is left to the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Number>,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.messages.is_empty() {
            return Err(RelayError::MalformedRequest(
                "`messages` must be a non-empty array".to_string(),
            ));
        }
        Ok(())
    }
}

/// A text block in a completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Success body returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    pub content: Vec<TextBlock>,
    pub stop_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub mode: &'static str,
    pub has_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}
