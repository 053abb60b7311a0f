//! Speech transcription request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options for a transcription call.
///
/// `language` is omitted from the wire payload when unset; the translate
/// flag uses the engine's `translate` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "translate")]
    pub translate_to_english: bool,
}

/// Result of a transcription call.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResult {
    #[serde(default)]
    pub text: String,

    /// Engine-defined timing segments, passed through as generic records.
    #[serde(default)]
    pub segments: Option<Vec<Map<String, Value>>>,

    #[serde(default)]
    pub total_time_ms: f64,
}
