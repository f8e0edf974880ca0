//! Renewal workflow
//!
//! One run renews at most one certificate:
//!
//! 1. Load the stored certificate of the primary domain
//! 2. Decide whether it needs renewal; stop here if not
//! 3. Resolve the domains (and the reused key for a domain list)
//! 4. Issue, store, then run the hook exactly once
//!
//! Every failure ends the run. A skipped renewal has no side effects.

use std::path::Path;
use std::sync::Arc;

use certsmith_common::merge_domains;
use certsmith_config::{DomainSelection, RenewOptions};
use chrono::Utc;
use rcgen::KeyPair;
use tracing::info;

use super::decision::needs_renewal;
use super::error::RenewError;
use super::hook::{HookMetadata, RenewalHook};
use crate::acme::{
    CertificateObtainer, CertificateRecord, CertificateResource, CertificateStorage, CsrRequest,
    ObtainRequest, StorageError, CERT_EXT, KEY_EXT,
};

/// How a renewal run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The certificate has enough time left
    Skipped { domain: String },
    /// A new certificate was stored and the hook ran
    Renewed(HookMetadata),
}

/// Drives a single renewal from decision to notification
pub struct Renewer {
    obtainer: Arc<dyn CertificateObtainer>,
    storage: Arc<CertificateStorage>,
    hook: Arc<dyn RenewalHook>,
    account_email: String,
    options: RenewOptions,
}

impl Renewer {
    pub fn new(
        obtainer: Arc<dyn CertificateObtainer>,
        storage: Arc<CertificateStorage>,
        hook: Arc<dyn RenewalHook>,
        account_email: impl Into<String>,
        options: RenewOptions,
    ) -> Self {
        Self {
            obtainer,
            storage,
            hook,
            account_email: account_email.into(),
            options,
        }
    }

    /// Renew for a validated selection
    pub async fn renew(&self, selection: &DomainSelection) -> Result<RenewOutcome, RenewError> {
        match selection {
            DomainSelection::Domains(domains) => self.renew_for_domains(domains).await,
            DomainSelection::Csr(path) => {
                let csr = load_csr(path)?;
                self.renew_for_csr(&csr).await
            }
        }
    }

    /// Renew the certificate stored for the first of `domains`
    ///
    /// Domains already covered by the stored certificate are kept, in their
    /// order, and `domains` only adds to them.
    pub async fn renew_for_domains(&self, domains: &[String]) -> Result<RenewOutcome, RenewError> {
        let domain = domains.first().ok_or(RenewError::NoDomains)?;

        let cert = self.load_leaf(domain)?;
        if !needs_renewal(&cert, domain, self.options.days)? {
            return Ok(RenewOutcome::Skipped {
                domain: domain.clone(),
            });
        }
        log_time_left(domain, &cert);

        let private_key = if self.options.reuse_key {
            Some(self.load_key(domain)?)
        } else {
            None
        };

        let request = ObtainRequest {
            domains: merge_domains(&cert.domains, domains),
            bundle: self.options.bundle,
            private_key,
            must_staple: self.options.must_staple,
        };

        let resource = self
            .obtainer
            .obtain(request)
            .await
            .map_err(|source| RenewError::Issuance {
                domain: domain.clone(),
                source,
            })?;

        self.complete(domain, resource).await
    }

    /// Renew the certificate for an external CSR
    ///
    /// The CSR's common name is the primary domain and its domains are used
    /// as is. The stored private key is never touched.
    pub async fn renew_for_csr(&self, csr: &CsrRequest) -> Result<RenewOutcome, RenewError> {
        let domain = &csr.common_name;

        let cert = self.load_leaf(domain)?;
        if !needs_renewal(&cert, domain, self.options.days)? {
            return Ok(RenewOutcome::Skipped {
                domain: domain.clone(),
            });
        }
        log_time_left(domain, &cert);

        let resource = self
            .obtainer
            .obtain_for_csr(csr, self.options.bundle)
            .await
            .map_err(|source| RenewError::Issuance {
                domain: domain.clone(),
                source,
            })?;

        self.complete(domain, resource).await
    }

    /// First certificate of the stored bundle
    fn load_leaf(&self, domain: &str) -> Result<CertificateRecord, RenewError> {
        let load_error = |source| RenewError::CertificateLoad {
            domain: domain.to_string(),
            source,
        };

        self.storage
            .read_certificate(domain, CERT_EXT)
            .map_err(load_error)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                load_error(StorageError::InvalidCertificate {
                    path: self.storage.file_path(domain, CERT_EXT).display().to_string(),
                    message: "no certificate found".to_string(),
                })
            })
    }

    fn load_key(&self, domain: &str) -> Result<KeyPair, RenewError> {
        let key_parse = |message: String| RenewError::KeyParse {
            domain: domain.to_string(),
            message,
        };

        let bytes = self
            .storage
            .read_file(domain, KEY_EXT)
            .map_err(|source| RenewError::KeyLoad {
                domain: domain.to_string(),
                source,
            })?;
        let pem = String::from_utf8(bytes).map_err(|e| key_parse(e.to_string()))?;

        KeyPair::from_pem(&pem).map_err(|e| key_parse(e.to_string()))
    }

    /// Store the certificate under `domain` and notify the hook
    async fn complete(
        &self,
        domain: &str,
        mut resource: CertificateResource,
    ) -> Result<RenewOutcome, RenewError> {
        resource.domain = domain.to_string();

        self.storage
            .save_resource(&resource)
            .map_err(|source| RenewError::Storage {
                domain: domain.to_string(),
                source,
            })?;

        let metadata = HookMetadata::new(
            self.account_email.clone(),
            domain,
            self.storage.file_path(domain, CERT_EXT),
            self.storage.file_path(domain, KEY_EXT),
        );

        self.hook
            .on_renewed(metadata.clone())
            .await
            .map_err(|source| RenewError::Hook {
                domain: domain.to_string(),
                source,
            })?;

        info!(domain = %domain, expires = %resource.expires, "Certificate renewed");
        Ok(RenewOutcome::Renewed(metadata))
    }
}

impl std::fmt::Debug for Renewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renewer")
            .field("storage", &self.storage)
            .field("account_email", &self.account_email)
            .field("options", &self.options)
            .finish()
    }
}

/// Read a CSR file in PEM or DER form
pub fn load_csr(path: &Path) -> Result<CsrRequest, RenewError> {
    let csr_error = |message: String| RenewError::Csr {
        path: path.display().to_string(),
        message,
    };

    let data = std::fs::read(path).map_err(|e| csr_error(e.to_string()))?;
    CsrRequest::parse(&data).map_err(|e| csr_error(e.to_string()))
}

fn log_time_left(domain: &str, cert: &CertificateRecord) {
    let hours = (cert.not_after - Utc::now()).num_hours();
    info!(domain = %domain, hours_remaining = hours, "Trying renewal with {} hours remaining", hours);
}
