use serde::{Deserialize, Serialize};

pub const DEFAULT_SENTINEL: &str = "end_of_stream";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are powerful AI assistant in providing accurate answers always. \
Be Concise in providing answers based on context.";

/// Streaming completion and typing animation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// In-band token that ends a completion stream.
    pub sentinel: String,
    /// Delay between typed characters in milliseconds. Zero types instantly.
    pub typing_interval_ms: u64,
    /// System prompt sent with every summarization request.
    pub system_prompt: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            typing_interval_ms: 30,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
