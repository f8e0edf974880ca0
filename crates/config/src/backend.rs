//! Challenge backend settings.
//!
//! Every validation backend is configured the same way: a credential, a
//! record TTL with a backend-specific floor, a propagation timeout, a
//! polling interval and an HTTP timeout. Each value can be set
//! independently through prefixed environment variables:
//!
//! ```text
//! ARVANCLOUD_API_KEY=...
//! ARVANCLOUD_TTL=600
//! ARVANCLOUD_PROPAGATION_TIMEOUT=120
//! ARVANCLOUD_POLLING_INTERVAL=2
//! ARVANCLOUD_HTTP_TIMEOUT=30
//! ```
//!
//! Durations are whole seconds.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ConfigError;

/// Per-backend default values and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendDefaults {
    /// Lowest TTL the backend accepts
    pub min_ttl: u32,
    /// TTL used when none is configured
    pub ttl: u32,
    /// Maximum time to wait for propagation
    pub propagation_timeout: Duration,
    /// Interval between propagation checks
    pub polling_interval: Duration,
    /// Timeout for a single backend API request
    pub http_timeout: Duration,
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            min_ttl: 0,
            ttl: 120,
            propagation_timeout: Duration::from_secs(60),
            polling_interval: Duration::from_secs(2),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Raw environment values, all optional
#[derive(Debug, Default, Deserialize)]
struct BackendEnv {
    api_key: Option<String>,
    ttl: Option<u32>,
    propagation_timeout: Option<u64>,
    polling_interval: Option<u64>,
    http_timeout: Option<u64>,
}

/// Resolved backend settings
#[derive(Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// API credential
    pub credential: String,
    /// Record TTL in seconds
    pub ttl: u32,
    /// Maximum time to wait for propagation
    pub propagation_timeout: Duration,
    /// Interval between propagation checks
    pub polling_interval: Duration,
    /// Timeout for a single backend API request
    pub http_timeout: Duration,
}

impl BackendSettings {
    /// Settings with the given credential and the backend defaults
    pub fn with_defaults(credential: impl Into<String>, defaults: &BackendDefaults) -> Self {
        Self {
            credential: credential.into(),
            ttl: defaults.ttl,
            propagation_timeout: defaults.propagation_timeout,
            polling_interval: defaults.polling_interval,
            http_timeout: defaults.http_timeout,
        }
    }

    /// Load settings from `<prefix>`-prefixed variables.
    ///
    /// `vars` is usually `std::env::vars()`. Missing optional values fall
    /// back to `defaults`; the result is validated before it is returned.
    pub fn from_vars<I>(
        backend: &str,
        prefix: &str,
        vars: I,
        defaults: &BackendDefaults,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: BackendEnv = envy::prefixed(prefix)
            .from_iter(vars)
            .map_err(|e| ConfigError::Environment {
                backend: backend.to_string(),
                message: e.to_string(),
            })?;

        let credential = env
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                backend: backend.to_string(),
                variable: format!("{}API_KEY", prefix),
            })?;

        let settings = Self {
            credential,
            ttl: env.ttl.unwrap_or(defaults.ttl),
            propagation_timeout: env
                .propagation_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.propagation_timeout),
            polling_interval: env
                .polling_interval
                .map(Duration::from_secs)
                .unwrap_or(defaults.polling_interval),
            http_timeout: env
                .http_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        };

        settings.validate(backend, defaults.min_ttl)?;

        debug!(
            backend = %backend,
            ttl = settings.ttl,
            propagation_timeout_secs = settings.propagation_timeout.as_secs(),
            polling_interval_secs = settings.polling_interval.as_secs(),
            "Loaded challenge backend settings"
        );

        Ok(settings)
    }

    /// Check the settings against the backend's limits
    pub fn validate(&self, backend: &str, min_ttl: u32) -> Result<(), ConfigError> {
        if self.credential.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                backend: backend.to_string(),
                variable: "API key".to_string(),
            });
        }

        if self.ttl < min_ttl {
            return Err(ConfigError::TtlBelowMinimum {
                backend: backend.to_string(),
                ttl: self.ttl,
                min_ttl,
            });
        }

        if self.polling_interval.is_zero() || self.polling_interval >= self.propagation_timeout {
            return Err(ConfigError::InvalidPolling {
                backend: backend.to_string(),
                timeout: self.propagation_timeout,
                interval: self.polling_interval,
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("credential", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("propagation_timeout", &self.propagation_timeout)
            .field("polling_interval", &self.polling_interval)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}
