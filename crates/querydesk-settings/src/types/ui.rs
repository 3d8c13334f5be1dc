use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Front-end presentation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiSettings {
    /// Prompts offered for one-keystroke submission.
    pub suggested_prompts: Vec<String>,
    /// Maximum number of rows plotted in a chart.
    pub chart_point_limit: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            suggested_prompts: vec![
                "what is the worst measure for h0544?".to_string(),
                "Which measure for contract H0544 has shown the greatest increase from prior year to current year?".to_string(),
                "What is Hedis?".to_string(),
            ],
            chart_point_limit: 50,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"querydesk_client": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
