//! Renewal error types

use thiserror::Error;

use super::hook::HookError;
use crate::acme::{AcmeError, StorageError};

/// Fatal errors of a renewal run
///
/// Every variant names the domain (or the CSR file) it concerns.
#[derive(Debug, Error)]
pub enum RenewError {
    /// The stored bundle starts with a CA certificate instead of a leaf
    #[error("[{domain}] Certificate bundle starts with a CA certificate")]
    CaCertificate { domain: String },

    /// The stored certificate could not be read
    #[error("Error while loading the certificate for domain {domain}: {source}")]
    CertificateLoad {
        domain: String,
        #[source]
        source: StorageError,
    },

    /// The stored private key could not be read
    #[error("Error while loading the private key for domain {domain}: {source}")]
    KeyLoad {
        domain: String,
        #[source]
        source: StorageError,
    },

    /// The stored private key is not a usable PEM key
    #[error("[{domain}] Failed to parse the private key: {message}")]
    KeyParse { domain: String, message: String },

    /// The CSR file could not be read or parsed
    #[error("Failed to load CSR {path}: {message}")]
    Csr { path: String, message: String },

    /// No domain was requested
    #[error("No domains requested")]
    NoDomains,

    /// The authority did not issue a certificate
    #[error("[{domain}] {source}")]
    Issuance {
        domain: String,
        #[source]
        source: AcmeError,
    },

    /// The issued certificate could not be stored
    #[error("[{domain}] Failed to store certificate: {source}")]
    Storage {
        domain: String,
        #[source]
        source: StorageError,
    },

    /// The renew hook failed
    #[error("[{domain}] Renew hook failed: {source}")]
    Hook {
        domain: String,
        #[source]
        source: HookError,
    },
}
