//! Certificate and account storage
//!
//! Certificates, keys and metadata live in separate files so web servers can
//! use them directly.
//!
//! # Directory Structure
//!
//! ```text
//! <path>/
//! ├── accounts/
//! │   └── acme-v02.api.letsencrypt.org/
//! │       └── admin@example.com/
//! │           └── account.json      # ACME account credentials
//! └── certificates/
//!     ├── example.com.crt           # Leaf certificate (plus chain when bundled)
//!     ├── example.com.key           # Private key
//!     ├── example.com.issuer.crt    # Issuer chain
//!     └── example.com.json          # Certificate metadata
//! ```
//!
//! A wildcard `*` in a domain is stored as `_`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use certsmith_common::sanitized_domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::certificate::{CertificateRecord, CertificateResource};
use super::error::StorageError;

/// Certificate file extension
pub const CERT_EXT: &str = ".crt";
/// Private key file extension
pub const KEY_EXT: &str = ".key";
/// Issuer chain file extension
pub const ISSUER_EXT: &str = ".issuer.crt";
/// Metadata file extension
pub const META_EXT: &str = ".json";

const ACCOUNTS_DIR: &str = "accounts";
const CERTIFICATES_DIR: &str = "certificates";
const ACCOUNT_FILE: &str = "account.json";

/// Certificate metadata stored alongside the certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMeta {
    /// Primary domain
    pub domain: String,
    /// Domains covered by this certificate
    pub domains: Vec<String>,
    /// When the certificate expires
    pub expires: DateTime<Utc>,
    /// When the certificate was stored
    pub issued: DateTime<Utc>,
}

/// Certificate storage manager
///
/// Uses a filesystem layout with restrictive permissions.
#[derive(Debug)]
pub struct CertificateStorage {
    base_path: PathBuf,
}

impl CertificateStorage {
    /// Open the storage at `base_path`
    ///
    /// Creates the directory structure if it doesn't exist and sets
    /// restrictive permissions (0700 on Unix).
    pub fn new(base_path: &Path) -> Result<Self, StorageError> {
        let certificates_path = base_path.join(CERTIFICATES_DIR);
        let accounts_path = base_path.join(ACCOUNTS_DIR);
        fs::create_dir_all(&certificates_path)?;
        fs::create_dir_all(&accounts_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_path, perms.clone())?;
            fs::set_permissions(&certificates_path, perms.clone())?;
            fs::set_permissions(&accounts_path, perms)?;
        }

        debug!(storage_path = %base_path.display(), "Opened certificate storage");

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Path of the credentials file for `email` at the server `server_dir`
    pub fn account_path(&self, server_dir: &str, email: &str) -> PathBuf {
        self.base_path
            .join(ACCOUNTS_DIR)
            .join(server_dir)
            .join(email)
            .join(ACCOUNT_FILE)
    }

    /// Load raw credentials JSON (for `instant_acme::AccountCredentials`)
    pub fn load_account_credentials(
        &self,
        server_dir: &str,
        email: &str,
    ) -> Result<Option<String>, StorageError> {
        let path = self.account_path(server_dir, email);

        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!(email = %email, "Loaded ACME account credentials");
                Ok(Some(content))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(email = %email, "No stored ACME account found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Certificate Operations
    // =========================================================================

    /// Path of a domain's file with the given extension
    pub fn file_path(&self, domain: &str, ext: &str) -> PathBuf {
        self.base_path
            .join(CERTIFICATES_DIR)
            .join(format!("{}{}", sanitized_domain(domain), ext))
    }

    /// Whether a domain's file exists
    pub fn exists(&self, domain: &str, ext: &str) -> bool {
        self.file_path(domain, ext).exists()
    }

    /// Read a domain's file
    pub fn read_file(&self, domain: &str, ext: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.file_path(domain, ext);

        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound {
                domain: domain.to_string(),
                path: path.display().to_string(),
            },
            _ => StorageError::Io(e),
        })
    }

    /// Read and parse every certificate of a domain's PEM bundle
    ///
    /// The result is never empty.
    pub fn read_certificate(
        &self,
        domain: &str,
        ext: &str,
    ) -> Result<Vec<CertificateRecord>, StorageError> {
        let content = self.read_file(domain, ext)?;
        let path = self.file_path(domain, ext);

        let records = CertificateRecord::parse_bundle(&content).map_err(|e| {
            StorageError::InvalidCertificate {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        if records.is_empty() {
            return Err(StorageError::InvalidCertificate {
                path: path.display().to_string(),
                message: "no certificate found".to_string(),
            });
        }

        trace!(domain = %domain, count = records.len(), "Loaded certificate bundle");
        Ok(records)
    }

    /// Read the metadata of a stored certificate
    pub fn read_meta(&self, domain: &str) -> Result<CertificateMeta, StorageError> {
        let content = self.read_file(domain, META_EXT)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Persist an issued certificate
    ///
    /// The private key is written with 0600 permissions on Unix. Resources
    /// issued for an external CSR carry no key and leave any stored key
    /// untouched.
    pub fn save_resource(&self, resource: &CertificateResource) -> Result<(), StorageError> {
        let domain = resource.domain.as_str();

        fs::write(
            self.file_path(domain, CERT_EXT),
            &resource.certificate_pem,
        )?;
        fs::write(self.file_path(domain, ISSUER_EXT), &resource.issuer_pem)?;

        if let Some(key_pem) = &resource.private_key_pem {
            let key_path = self.file_path(domain, KEY_EXT);
            fs::write(&key_path, key_pem)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
            }
        }

        let meta = CertificateMeta {
            domain: domain.to_string(),
            domains: resource.domains.clone(),
            expires: resource.expires,
            issued: Utc::now(),
        };
        let meta_content = serde_json::to_string_pretty(&meta)?;
        fs::write(self.file_path(domain, META_EXT), meta_content)?;

        info!(
            domain = %domain,
            expires = %resource.expires,
            "Saved certificate to storage"
        );

        Ok(())
    }
}
