//! Challenge propagation checks
//!
//! After a provider has published a challenge, the orchestrator polls a
//! [`PropagationCheck`] until the published state is externally visible, so
//! the authority is only asked to validate once it can succeed.

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use reqwest::Client;
use tracing::trace;

use super::provider::{dns01_record, ChallengeDescriptor, ProviderError};
use super::providers::webroot::ACME_CHALLENGE_PREFIX;

/// Observes whether a presented challenge is visible to the authority
#[async_trait]
pub trait PropagationCheck: Send + Sync + Debug {
    /// `Ok(true)` once the challenge response can be observed
    ///
    /// Errors are treated as "not yet visible" by the caller.
    async fn is_visible(&self, challenge: &ChallengeDescriptor) -> Result<bool, ProviderError>;
}

/// Skips propagation checks entirely
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheck;

#[async_trait]
impl PropagationCheck for NoCheck {
    async fn is_visible(&self, _challenge: &ChallengeDescriptor) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Looks up the `_acme-challenge` TXT record
#[derive(Debug)]
pub struct DnsTxtCheck {
    resolver: TokioResolver,
}

impl DnsTxtCheck {
    /// Create a checker querying `nameservers` (empty = default resolvers)
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let resolver_config = if nameservers.is_empty() {
            ResolverConfig::default()
        } else {
            let mut resolver_config = ResolverConfig::new();
            for ip in nameservers {
                resolver_config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(*ip, 53),
                    Protocol::Udp,
                ));
            }
            resolver_config
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        opts.cache_size = 0; // every poll must see fresh answers

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { resolver }
    }
}

#[async_trait]
impl PropagationCheck for DnsTxtCheck {
    async fn is_visible(&self, challenge: &ChallengeDescriptor) -> Result<bool, ProviderError> {
        let (fqdn, expected) = dns01_record(&challenge.domain, &challenge.key_authorization);

        match self.resolver.txt_lookup(fqdn.as_str()).await {
            Ok(records) => {
                for record in records.iter() {
                    // A TXT record may be split into several strings
                    let value: String = record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect();

                    trace!(
                        record = %fqdn,
                        found_value = %value,
                        expected_value = %expected,
                        "Checking TXT record"
                    );

                    if value == expected {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Err(e) => {
                // NXDOMAIN or an empty answer is expected while propagating
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("no records found")
                    || err_str.contains("nxdomain")
                    || err_str.contains("record not found")
                {
                    Ok(false)
                } else {
                    Err(ProviderError::ApiRequest(format!(
                        "DNS lookup failed for '{}': {}",
                        fqdn, e
                    )))
                }
            }
        }
    }
}

/// Fetches `http://<domain>/.well-known/acme-challenge/<token>`
#[derive(Debug, Clone)]
pub struct HttpTokenCheck {
    client: Client,
}

impl HttpTokenCheck {
    /// Create a checker with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::ApiRequest(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    /// URL the authority fetches for this challenge
    pub fn challenge_url(challenge: &ChallengeDescriptor) -> String {
        format!(
            "http://{}{}{}",
            challenge.domain, ACME_CHALLENGE_PREFIX, challenge.token
        )
    }
}

#[async_trait]
impl PropagationCheck for HttpTokenCheck {
    async fn is_visible(&self, challenge: &ChallengeDescriptor) -> Result<bool, ProviderError> {
        let url = Self::challenge_url(challenge);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            trace!(url = %url, status = %response.status(), "Challenge token not served yet");
            return Ok(false);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ApiRequest(format!("GET {} failed: {}", url, e)))?;

        Ok(body.trim() == challenge.key_authorization)
    }
}
