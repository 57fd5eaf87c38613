//! Warden Config - The explicit configuration value of a gateway core.
//!
//! There is no settings singleton: a [`CoreConfig`] is constructed at
//! startup (programmatically or from TOML), validated once, and handed
//! into the gateway builder. Tests instantiate independent cores with
//! independent configs.
//!
//! Every field defaults to a safe production value, so an empty document
//! is a working configuration.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid config field {field}: {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The document could not be read or parsed.
    #[error("config load error: {0}")]
    Load(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Hard cap on the configurable override token TTL, in seconds.
pub const OVERRIDE_TTL_MAX_SECS: u64 = 900;

/// The gateway core's configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Refuse to start without an externally provided Ed25519 signing key.
    pub require_production_keys: bool,
    /// Path to the gateway signing key file (32 raw bytes). When absent
    /// and production keys are not required, a key is generated.
    pub signing_key_path: Option<String>,
    /// Default connector timeout in seconds.
    pub default_connector_timeout_seconds: u64,
    /// Maximum connector request body size in bytes.
    pub max_request_bytes: usize,
    /// Maximum connector response size kept in bytes.
    pub max_response_bytes: usize,
    /// Default webhook/http allow-list used when a tool declares none.
    pub global_allowed_webhook_domains: Vec<String>,
    /// Override token lifetime in seconds (max 900).
    pub override_token_ttl_seconds: u64,
    /// How long a pending approval stays open, in seconds.
    pub approval_expiry_seconds: u64,
    /// Permit plain-http connector targets.
    pub allow_http_in_connectors: bool,
    /// How long a request id stays deduplicated, in seconds.
    pub idempotency_window_seconds: u64,
    /// Capability token issuers: issuer id to hex-encoded Ed25519 public
    /// key.
    pub issuers: BTreeMap<String, String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            require_production_keys: false,
            signing_key_path: None,
            default_connector_timeout_seconds: 30,
            max_request_bytes: 1_048_576,
            max_response_bytes: 1_048_576,
            global_allowed_webhook_domains: Vec::new(),
            override_token_ttl_seconds: 300,
            approval_expiry_seconds: 86_400,
            allow_http_in_connectors: false,
            idempotency_window_seconds: 86_400,
            issuers: BTreeMap::new(),
        }
    }
}

impl CoreConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] on parse failure or
    /// [`ConfigError::Validation`] for out-of-range fields.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] on I/O or parse failure, or a
    /// validation error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Validate field ranges and cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.override_token_ttl_seconds == 0
            || self.override_token_ttl_seconds > OVERRIDE_TTL_MAX_SECS
        {
            return Err(invalid(
                "override_token_ttl_seconds",
                format!("must be between 1 and {OVERRIDE_TTL_MAX_SECS}"),
            ));
        }

        if self.approval_expiry_seconds == 0 {
            return Err(invalid("approval_expiry_seconds", "must be at least 1"));
        }

        if self.default_connector_timeout_seconds == 0 {
            return Err(invalid(
                "default_connector_timeout_seconds",
                "must be at least 1",
            ));
        }

        if self.max_request_bytes == 0 || self.max_response_bytes == 0 {
            return Err(invalid(
                "max_request_bytes/max_response_bytes",
                "size limits must be at least 1 byte",
            ));
        }

        if self.require_production_keys && self.signing_key_path.is_none() {
            return Err(invalid(
                "signing_key_path",
                "required when require_production_keys is set",
            ));
        }

        for (issuer, key_hex) in &self.issuers {
            let looks_like_key =
                key_hex.len() == 64 && key_hex.chars().all(|c| c.is_ascii_hexdigit());
            if !looks_like_key {
                return Err(invalid(
                    &format!("issuers.{issuer}"),
                    "expected a 64-character hex Ed25519 public key",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}
