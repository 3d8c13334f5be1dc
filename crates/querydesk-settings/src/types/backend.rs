use serde::{Deserialize, Serialize};

/// Where and how to reach the inference backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for single-shot calls, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum silence on a completion stream before it is abandoned.
    pub stream_idle_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8340/api/cortex".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 90,
        }
    }
}
