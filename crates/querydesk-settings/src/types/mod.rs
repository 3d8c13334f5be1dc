//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the fields it overrides.

mod backend;
mod stream;
mod ui;

pub use backend::*;
pub use stream::*;
pub use ui::*;

use serde::{Deserialize, Serialize};

const MAX_TYPING_INTERVAL_MS: u64 = 1_000;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root settings type.
///
/// ```json
/// {
///   "backend": { "baseUrl": "http://10.0.0.5:8340/api/cortex" },
///   "stream": { "typingIntervalMs": 15 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerydeskSettings {
    pub backend: BackendSettings,
    pub stream: StreamSettings,
    pub ui: UiSettings,
    pub logging: LoggingSettings,
}

impl QuerydeskSettings {
    /// Correct out-of-range values in place, warning about each correction.
    pub fn validate(&mut self) {
        let trimmed = self.backend.base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            let fallback = BackendSettings::default().base_url;
            tracing::warn!(fallback = %fallback, "empty backend base URL, using default");
            self.backend.base_url = fallback;
        } else {
            self.backend.base_url = trimmed;
        }

        if self.backend.stream_idle_timeout_secs == 0 {
            tracing::warn!("stream idle timeout of 0s, using default");
            self.backend.stream_idle_timeout_secs = BackendSettings::default().stream_idle_timeout_secs;
        }

        if self.stream.sentinel.is_empty() {
            tracing::warn!("empty stream sentinel, using {DEFAULT_SENTINEL}");
            self.stream.sentinel = DEFAULT_SENTINEL.to_string();
        }

        if self.stream.typing_interval_ms > MAX_TYPING_INTERVAL_MS {
            tracing::warn!(
                "typing interval {}ms too slow, clamped to {MAX_TYPING_INTERVAL_MS}ms",
                self.stream.typing_interval_ms
            );
            self.stream.typing_interval_ms = MAX_TYPING_INTERVAL_MS;
        }

        if self.ui.chart_point_limit == 0 {
            tracing::warn!("chart point limit of 0, using default");
            self.ui.chart_point_limit = UiSettings::default().chart_point_limit;
        }

        let level = self.logging.level.to_ascii_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.logging.level = level;
        } else {
            tracing::warn!(level = %self.logging.level, "unknown log level, using warn");
            self.logging.level = "warn".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = QuerydeskSettings::default();
        assert_eq!(s.stream.sentinel, "end_of_stream");
        assert_eq!(s.stream.typing_interval_ms, 30);
        assert_eq!(s.ui.chart_point_limit, 50);
        assert_eq!(s.ui.suggested_prompts.len(), 3);
        assert_eq!(s.backend.stream_idle_timeout_secs, 90);
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(QuerydeskSettings::default()).unwrap();
        assert!(json["backend"].get("baseUrl").is_some());
        assert!(json["stream"].get("typingIntervalMs").is_some());
        assert!(json["ui"].get("chartPointLimit").is_some());
    }

    #[test]
    fn partial_json_overrides() {
        let json = serde_json::json!({"stream": {"typingIntervalMs": 5}});
        let s: QuerydeskSettings = serde_json::from_value(json).unwrap();
        assert_eq!(s.stream.typing_interval_ms, 5);
        assert_eq!(s.stream.sentinel, "end_of_stream");
        assert_eq!(s.ui.chart_point_limit, 50);
    }

    #[test]
    fn validate_trims_base_url() {
        let mut s = QuerydeskSettings::default();
        s.backend.base_url = " http://host:1/api/ ".into();
        s.validate();
        assert_eq!(s.backend.base_url, "http://host:1/api");
    }

    #[test]
    fn validate_restores_empty_values() {
        let mut s = QuerydeskSettings::default();
        s.backend.base_url = String::new();
        s.stream.sentinel = String::new();
        s.ui.chart_point_limit = 0;
        s.backend.stream_idle_timeout_secs = 0;
        s.validate();
        assert_eq!(s.backend.base_url, BackendSettings::default().base_url);
        assert_eq!(s.stream.sentinel, DEFAULT_SENTINEL);
        assert_eq!(s.ui.chart_point_limit, 50);
        assert_eq!(s.backend.stream_idle_timeout_secs, 90);
    }

    #[test]
    fn validate_clamps_typing_interval_and_level() {
        let mut s = QuerydeskSettings::default();
        s.stream.typing_interval_ms = 60_000;
        s.logging.level = "LOUD".into();
        s.validate();
        assert_eq!(s.stream.typing_interval_ms, MAX_TYPING_INTERVAL_MS);
        assert_eq!(s.logging.level, "warn");
    }
}
