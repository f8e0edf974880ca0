//! Configuration error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building or validating configuration.
///
/// All of these are detected at startup, before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Backend credential not provided
    #[error("{backend}: credentials missing (set {variable})")]
    MissingCredential { backend: String, variable: String },

    /// Record TTL below the backend's floor
    #[error("{backend}: invalid TTL, TTL ({ttl}) must be greater than or equal to {min_ttl}")]
    TtlBelowMinimum {
        backend: String,
        ttl: u32,
        min_ttl: u32,
    },

    /// Polling bounds that would never produce a check
    #[error(
        "{backend}: polling interval ({interval:?}) must be positive and shorter than the propagation timeout ({timeout:?})"
    )]
    InvalidPolling {
        backend: String,
        timeout: Duration,
        interval: Duration,
    },

    /// Environment variables could not be deserialized
    #[error("{backend}: invalid environment configuration: {message}")]
    Environment { backend: String, message: String },

    /// Invalid domain or CSR selection
    #[error("{0}")]
    Selection(String),

    /// Malformed domain name
    #[error("Invalid domain name '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    /// Account email not provided
    #[error("An account email is required (--email or CERTSMITH_EMAIL)")]
    MissingEmail,

    /// Invalid ACME directory URL
    #[error("Invalid ACME server URL '{url}': {message}")]
    InvalidServer { url: String, message: String },

    /// Invalid challenge configuration
    #[error("{0}")]
    Challenge(String),
}
