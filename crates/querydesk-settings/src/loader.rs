//! Layered settings loading: defaults, then the user file, then environment.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::QuerydeskSettings;

pub const ENV_BASE_URL: &str = "QUERYDESK_BASE_URL";
pub const ENV_TYPING_INTERVAL_MS: &str = "QUERYDESK_TYPING_INTERVAL_MS";
pub const ENV_SENTINEL: &str = "QUERYDESK_SENTINEL";
pub const ENV_LOG_LEVEL: &str = "QUERYDESK_LOG_LEVEL";

/// `~/.querydesk/settings.json`.
pub fn settings_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".querydesk")
        .join("settings.json")
}

/// Load from the default path with environment overrides.
pub fn load_settings() -> Result<QuerydeskSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`. A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<QuerydeskSettings> {
    let defaults = serde_json::to_value(QuerydeskSettings::default()).map_err(|source| {
        SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let merged = match std::fs::read_to_string(path) {
        Ok(raw) => {
            let user: Value = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!(?path, "loaded user settings");
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut settings: QuerydeskSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate();
    Ok(settings)
}

/// Apply `QUERYDESK_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(settings: &mut QuerydeskSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BASE_URL) {
        settings.backend.base_url = url;
    }
    if let Some(raw) = lookup(ENV_TYPING_INTERVAL_MS) {
        settings.stream.typing_interval_ms =
            raw.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                key: ENV_TYPING_INTERVAL_MS,
                value: raw.clone(),
            })?;
    }
    if let Some(sentinel) = lookup(ENV_SENTINEL) {
        settings.stream.sentinel = sentinel;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        settings.logging.level = level;
    }
    Ok(())
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
