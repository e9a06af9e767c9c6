//! # enface-settings
//!
//! Configuration for the Enface authentication broker, loaded from three
//! layers (in priority order):
//! 1. **Compiled defaults**: [`BrokerSettings::default()`]
//! 2. **Settings file**: a JSON file deep-merged over the defaults
//! 3. **Environment variables**: `ENFACE_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = enface_settings::load_settings_from_path(std::path::Path::new("enface.json")).unwrap();
//! let key = settings.secret_key().unwrap();
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from_path};
pub use types::{BrokerSettings, ServerSettings, HEALTH_PATH};
