//! Challenge provider contract
//!
//! Every domain-validation backend (a DNS API, a web root on disk, ...)
//! implements [`ChallengeProvider`] once. The orchestrator only ever talks to
//! backends through this trait, so adding a backend never touches the
//! renewal logic.

use std::fmt;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certsmith_common::challenge_fqdn;
use certsmith_config::ConfigError;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors returned by challenge providers
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid provider configuration, raised at construction
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// Authentication failed with the backend
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Record creation failed
    #[error("Failed to create TXT record for '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    /// Record lookup failed
    #[error("Failed to find TXT record '{record_name}' in '{domain}': {message}")]
    RecordLookup {
        domain: String,
        record_name: String,
        message: String,
    },

    /// Record deletion failed
    #[error("Failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Challenge token outside the base64url alphabet
    #[error("Invalid challenge token '{0}'")]
    InvalidToken(String),

    /// Local file operation failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Challenge mechanism a provider satisfies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    /// TXT record at `_acme-challenge.<domain>`
    Dns01,
    /// File at `/.well-known/acme-challenge/<token>`
    Http01,
}

impl ChallengeKind {
    /// ACME identifier of the mechanism
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Dns01 => "dns-01",
            ChallengeKind::Http01 => "http-01",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single pending authorization challenge
///
/// Created by the ACME client for each authorization and discarded once the
/// authorization resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDescriptor {
    /// Domain being validated
    pub domain: String,
    /// Challenge token
    pub token: String,
    /// Key authorization (token + account key thumbprint)
    pub key_authorization: String,
    /// Challenge mechanism
    pub kind: ChallengeKind,
    /// Authority URL used to mark the challenge ready
    pub url: String,
}

/// Capability every validation backend implements
///
/// Implementations must be safe to call concurrently for different domains:
/// an order covering several domains presents and polls all of them at the
/// same time.
#[async_trait]
pub trait ChallengeProvider: Send + Sync + Debug {
    /// Registry name of the backend (e.g. "arvancloud")
    fn name(&self) -> &'static str;

    /// Challenge mechanism this backend satisfies
    fn kind(&self) -> ChallengeKind;

    /// Publish the proof of control for `domain`.
    ///
    /// Calling this again with the same inputs overwrites the previous state
    /// and is not an error. Backend failures are returned, never panicked.
    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> ProviderResult<()>;

    /// Remove the state created by the matching [`present`](Self::present).
    ///
    /// State that is already gone counts as cleaned up.
    async fn clean_up(&self, domain: &str, token: &str, key_auth: &str) -> ProviderResult<()>;

    /// `(max_wait, poll_interval)` for the propagation check
    ///
    /// Always `0 < poll_interval < max_wait`.
    fn timeout(&self) -> (Duration, Duration);
}

/// DNS-01 record for a domain: `(fqdn, txt_value)`
///
/// The TXT value is the unpadded base64url SHA-256 digest of the key
/// authorization.
pub fn dns01_record(domain: &str, key_auth: &str) -> (String, String) {
    let digest = Sha256::digest(key_auth.as_bytes());
    (challenge_fqdn(domain), URL_SAFE_NO_PAD.encode(digest))
}
