//! Settings types with compiled defaults.

use base64::Engine as _;
use enface_core::cipher::{self, KEY_LEN};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Route reserved for the liveness probe.
pub const HEALTH_PATH: &str = "/health";

/// HTTP transport settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Route that accepts handshake commands. Also appended to the callback URL.
    pub path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            path: "/enfaceauth".into(),
        }
    }
}

/// Everything the broker needs at construction.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// Opaque project identifier echoed to the widget.
    pub project_id: String,
    /// Base64 of the 256-bit token key.
    pub secret_code: String,
    /// Free-form string passed through to the widget.
    pub fields: String,
    /// Base URL the verification server calls back to.
    pub callback_url: String,
    /// Maximum handshake lifetime in seconds.
    pub ttl_secs: u64,
    /// Verbose broker logging.
    pub debug: bool,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    pub server: ServerSettings,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            secret_code: String::new(),
            fields: String::new(),
            callback_url: String::new(),
            ttl_secs: enface_core::AUTHORIZATION_TIME_FRAME.as_secs(),
            debug: false,
            log_json: false,
            server: ServerSettings::default(),
        }
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("project_id", &self.project_id)
            .field("secret_code", &"[REDACTED]")
            .field("fields", &self.fields)
            .field("callback_url", &self.callback_url)
            .field("ttl_secs", &self.ttl_secs)
            .field("debug", &self.debug)
            .field("log_json", &self.log_json)
            .field("server", &self.server)
            .finish()
    }
}

impl BrokerSettings {
    /// Decode [`Self::secret_code`] into the token key.
    pub fn secret_key(&self) -> Result<[u8; KEY_LEN]> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.secret_code.trim())
            .map_err(|e| SettingsError::Secret(format!("is not base64: {e}")))?;
        cipher::key_from_bytes(&bytes).map_err(|e| SettingsError::Secret(format!("has an {e}")))
    }

    /// Check everything the broker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(SettingsError::InvalidValue("projectId is required".into()));
        }
        if self.callback_url.is_empty() {
            return Err(SettingsError::InvalidValue("callbackUrl is required".into()));
        }
        if self.ttl_secs == 0 {
            return Err(SettingsError::InvalidValue("ttlSecs must be positive".into()));
        }
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::Route(format!(
                "must start with '/': {}",
                self.server.path
            )));
        }
        if self.server.path == HEALTH_PATH {
            return Err(SettingsError::Route(format!("collides with {HEALTH_PATH}")));
        }
        self.secret_key().map(|_| ())
    }

    /// Callback URL with one trailing slash removed.
    pub fn normalized_callback_url(&self) -> &str {
        self.callback_url.strip_suffix('/').unwrap_or(&self.callback_url)
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }
}
