//! Combined configuration for a [`Turnstile`](crate::Turnstile).

use std::path::Path;

use serde::{Deserialize, Serialize};
use turnstile_admission::AdmissionConfig;
use turnstile_presence::PresenceConfig;

use crate::ConfigError;

/// Everything a [`Turnstile`](crate::Turnstile) can be tuned with.
///
/// Loads from JSON. Missing sections and fields take their defaults;
/// unknown fields are rejected so typos don't silently fall back.
///
/// ```json
/// {
///   "admission": { "prefetch": 20, "eviction_timeout_ms": 15000 },
///   "presence": { "max_concurrent_identities": 500 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurnstileConfig {
    pub admission: AdmissionConfig,
    pub presence: PresenceConfig,
}

impl TurnstileConfig {
    /// Parses a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Validates both sections. See [`AdmissionConfig::validated`] and
    /// [`PresenceConfig::validated`].
    pub fn validated(self) -> Self {
        Self {
            admission: self.admission.validated(),
            presence: self.presence.validated(),
        }
    }
}
