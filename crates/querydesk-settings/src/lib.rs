//! # querydesk-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`QuerydeskSettings::default()`]
//! 2. **User file**: `~/.querydesk/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `QUERYDESK_*` overrides (highest priority)
//!
//! The result is validated once; out-of-range values are corrected with a
//! warning rather than rejected.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
