//! ACME error types

use std::io;
use std::time::Duration;
use thiserror::Error;

use super::provider::{ChallengeKind, ProviderError};

/// Errors that can occur while obtaining a certificate
#[derive(Debug, Error)]
pub enum AcmeError {
    /// No registered account is stored for this email
    #[error("Account {email} is not registered. Register an account before renewing")]
    AccountNotRegistered { email: String },

    /// Failed to load the stored account
    #[error("Failed to load ACME account: {0}")]
    Account(String),

    /// Failed to create certificate order
    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    /// The authority did not offer the provider's challenge type
    #[error("No {kind} challenge available for domain '{domain}'")]
    NoChallenge { domain: String, kind: ChallengeKind },

    /// Provider failed to publish the challenge response
    #[error("[{domain}] {kind}: error presenting token: {source}")]
    Present {
        domain: String,
        kind: ChallengeKind,
        #[source]
        source: ProviderError,
    },

    /// Challenge state never became visible
    #[error("[{domain}] propagation: time limit exceeded after {elapsed:?}")]
    PropagationTimeout { domain: String, elapsed: Duration },

    /// The authority rejected the challenge
    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    /// Certificate finalization failed
    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    /// ACME protocol error from instant-acme
    #[error("ACME protocol error: {0}")]
    Protocol(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Certificate parsing error
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors specific to certificate storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize/deserialize data
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File for a domain not found
    #[error("File not found for domain {domain}: {path}")]
    NotFound { domain: String, path: String },

    /// PEM bundle could not be parsed
    #[error("Invalid certificate file {path}: {message}")]
    InvalidCertificate { path: String, message: String },
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
