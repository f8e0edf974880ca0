//! Renewal run configuration.
//!
//! Everything here is validated at startup so that invalid combinations
//! abort before any network call is attempted.

use std::net::IpAddr;
use std::path::PathBuf;

use certsmith_common::normalize_domain;
use tracing::debug;
use url::Url;

use crate::errors::ConfigError;

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Default number of remaining days below which a certificate is renewed
pub const DEFAULT_RENEW_DAYS: i32 = 30;

/// Options controlling a single renewal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewOptions {
    /// Renew when this many days or fewer remain; negative forces renewal
    pub days: i32,
    /// Reuse the stored private key instead of generating a new one
    pub reuse_key: bool,
    /// Append the issuer chain to the stored certificate
    pub bundle: bool,
    /// Request the OCSP must-staple extension
    pub must_staple: bool,
    /// Command run after a successful renewal
    pub renew_hook: Option<String>,
}

impl Default for RenewOptions {
    fn default() -> Self {
        Self {
            days: DEFAULT_RENEW_DAYS,
            reuse_key: false,
            bundle: true,
            must_staple: false,
            renew_hook: None,
        }
    }
}

/// What the certificate is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainSelection {
    /// Explicit domain list; the first entry is the primary domain
    Domains(Vec<String>),
    /// Existing certificate signing request file
    Csr(PathBuf),
}

impl DomainSelection {
    /// Build the selection from the raw CLI inputs.
    ///
    /// Exactly one of `domains` or `csr` must be supplied.
    pub fn from_inputs(domains: Vec<String>, csr: Option<PathBuf>) -> Result<Self, ConfigError> {
        let csr = csr.filter(|path| !path.as_os_str().is_empty());

        match (domains.is_empty(), csr) {
            (false, Some(_)) => Err(ConfigError::Selection(
                "Please specify either --domains/-d or --csr/-c, but not both".to_string(),
            )),
            (true, None) => Err(ConfigError::Selection(
                "Please specify --domains/-d (or --csr/-c if you already have a CSR)".to_string(),
            )),
            (true, Some(path)) => {
                debug!(csr = %path.display(), "Using existing CSR");
                Ok(Self::Csr(path))
            }
            (false, None) => {
                for domain in &domains {
                    validate_domain(domain)?;
                }
                debug!(domains = ?domains, "Using explicit domain list");
                Ok(Self::Domains(domains))
            }
        }
    }
}

/// Reject names that can never be valid certificate identifiers
pub fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if domain.trim().is_empty() {
        return Err(invalid("empty domain"));
    }

    if domain.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    if normalize_domain(domain).contains('*') {
        return Err(invalid("wildcard is only allowed as the leftmost label"));
    }

    Ok(())
}

/// ACME account and storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSettings {
    /// Registered account email
    pub email: String,
    /// ACME directory URL
    pub server: Url,
    /// Root of the certificate and account storage
    pub path: PathBuf,
}

impl AccountSettings {
    /// Validate and build account settings
    pub fn new(email: Option<String>, server: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let email = email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::MissingEmail)?;

        let server = Url::parse(server).map_err(|e| ConfigError::InvalidServer {
            url: server.to_string(),
            message: e.to_string(),
        })?;

        if !matches!(server.scheme(), "https" | "http") {
            return Err(ConfigError::InvalidServer {
                url: server.to_string(),
                message: "scheme must be http or https".to_string(),
            });
        }

        Ok(Self {
            email,
            server,
            path,
        })
    }

    /// Directory naming the server below `accounts/`: `host` or `host_port`
    pub fn server_dir(&self) -> String {
        let host = self.server.host_str().unwrap_or_default();
        match self.server.port() {
            Some(port) => format!("{}_{}", host, port),
            None => host.to_string(),
        }
    }
}

/// How domain control is proven
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSettings {
    /// DNS-01 through a named provider
    Dns {
        /// Registry name of the provider (e.g. "arvancloud")
        provider: String,
        /// Resolvers used for propagation checks (empty = system defaults)
        resolvers: Vec<IpAddr>,
        /// Skip the propagation check entirely
        disable_propagation_check: bool,
    },
    /// HTTP-01 by writing tokens below a web root
    Http {
        /// Directory served at the domain's HTTP root
        webroot: PathBuf,
        /// Skip the HTTP self check entirely
        disable_propagation_check: bool,
    },
}

impl ChallengeSettings {
    /// Build challenge settings; exactly one mechanism must be selected
    pub fn from_inputs(
        dns: Option<String>,
        webroot: Option<PathBuf>,
        resolvers: Vec<IpAddr>,
        disable_propagation_check: bool,
    ) -> Result<Self, ConfigError> {
        match (dns, webroot) {
            (Some(_), Some(_)) => Err(ConfigError::Challenge(
                "Please specify either --dns or --http-webroot, but not both".to_string(),
            )),
            (None, None) => Err(ConfigError::Challenge(
                "No challenge selected: specify --dns <provider> or --http-webroot <dir>"
                    .to_string(),
            )),
            (Some(provider), None) => Ok(Self::Dns {
                provider: provider.trim().to_lowercase(),
                resolvers,
                disable_propagation_check,
            }),
            (None, Some(webroot)) => Ok(Self::Http {
                webroot,
                disable_propagation_check,
            }),
        }
    }
}
