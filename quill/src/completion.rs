//! Chat completion request and response types.
//!
//! These structs define the wire contract with the engine: requests
//! serialize to JSON with fixed snake_case keys in declaration order, and
//! responses deserialize with every field optional — a missing field is a
//! documented default, never a parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation role of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation. Ordering within a message slice is the
/// conversation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options for a completion call.
///
/// Serializes with the engine's fixed key names; `stop_sequences` renders
/// as `stop`, as a JSON array even when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    #[serde(rename = "stop")]
    pub stop_sequences: Vec<String>,
    pub confidence_threshold: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 512,
            stop_sequences: Vec::new(),
            confidence_threshold: 0.0,
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Result of a completion call.
///
/// Numeric fields absent from the engine response default to zero,
/// `confidence` to 1.0 and `needs_cloud_handoff` to false.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub text: String,

    /// Engine-defined tool invocations, passed through as generic records
    /// without semantic interpretation.
    #[serde(default)]
    pub function_calls: Option<Vec<Map<String, Value>>>,

    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub time_to_first_token_ms: f64,

    #[serde(default)]
    pub total_time_ms: f64,

    #[serde(default)]
    pub prefill_tokens_per_second: f64,

    #[serde(default)]
    pub decode_tokens_per_second: f64,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default, rename = "cloud_handoff")]
    pub needs_cloud_handoff: bool,
}
