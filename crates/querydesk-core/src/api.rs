//! Request and response bodies exchanged with the inference backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::stringify;

pub const ANALYST_DETAILS_PATH: &str = "/analyst-details";
pub const SEARCH_DETAILS_PATH: &str = "/search-details";
pub const TEXT_TO_SQL_PATH: &str = "/text-to-sql";
pub const RUN_SQL_PATH: &str = "/run-sql";
pub const STREAM_COMPLETE_PATH: &str = "/stream-complete";

/// Substituted when a text-to-SQL answer carries no text.
pub const NO_VALID_RESPONSE: &str = "No valid response received.";
/// Substituted when SQL execution returns no data at all.
pub const NO_RESULTS: &str = "No results returned.";
/// Substituted when a completion stream carries no text before its end.
pub const NO_SUMMARY: &str = "No summary was returned.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToSqlRequest {
    pub natural_language_prompt: String,
    pub selected_models: Vec<String>,
    pub selected_search_services: Vec<String>,
}

/// Raw text-to-SQL answer. Every field is optional on the wire; legacy field
/// names are accepted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToSqlResponse {
    #[serde(default, alias = "response")]
    pub response_text: Option<String>,
    #[serde(default, alias = "type")]
    pub response_kind: Option<String>,
    #[serde(default, alias = "prompt")]
    pub prompt_echo: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Sql,
    Text,
}

impl ResponseKind {
    /// Anything other than `sql` is treated as text.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("sql") {
            Self::Sql
        } else {
            Self::Text
        }
    }
}

/// A text-to-SQL answer with fallbacks applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlAnswer {
    pub text: String,
    pub kind: ResponseKind,
    pub prompt_echo: String,
    /// True when the response text was missing and the fallback was used.
    pub substituted: bool,
}

impl TextToSqlResponse {
    pub fn into_answer(self, prompt: &str) -> SqlAnswer {
        let prompt_echo = self
            .prompt_echo
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| prompt.to_string());

        match self.response_text.filter(|t| !t.trim().is_empty()) {
            Some(text) => SqlAnswer {
                text,
                kind: self
                    .response_kind
                    .as_deref()
                    .map_or(ResponseKind::Text, ResponseKind::parse),
                prompt_echo,
                substituted: false,
            },
            None => SqlAnswer {
                text: NO_VALID_RESPONSE.to_string(),
                kind: ResponseKind::Text,
                prompt_echo,
                substituted: true,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSqlRequest {
    pub sql_text: String,
    pub prompt_echo: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub system_prompt: String,
    pub prior_result: Value,
    pub prompt_echo: String,
}

/// Identifier lists from the catalog endpoints. Anything but an array yields
/// an empty list.
pub fn decode_identifiers(body: &Value) -> Vec<String> {
    match body {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => stringify(other),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
