//! ArvanCloud DNS-01 provider
//!
//! Publishes the challenge as a TXT record in the ArvanCloud-managed zone of
//! the domain.
//!
//! The API works on names relative to the zone and deletes by an opaque id
//! that is only known to the API. Clean-up therefore searches for the record
//! by name *and* value first, so a concurrent renewal using the same name is
//! never touched, and then deletes the match by id.
//!
//! # Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ARVANCLOUD_API_KEY` | required |
//! | `ARVANCLOUD_TTL` | 600 (minimum 600) |
//! | `ARVANCLOUD_PROPAGATION_TIMEOUT` | 120 |
//! | `ARVANCLOUD_POLLING_INTERVAL` | 2 |
//! | `ARVANCLOUD_HTTP_TIMEOUT` | 30 |

mod client;

pub use client::{ArvanCloudClient, DnsRecord, IpFilterMode, DEFAULT_BASE_URL};

use std::time::Duration;

use async_trait::async_trait;
use certsmith_common::{normalize_domain, relative_record_name};
use certsmith_config::{BackendDefaults, BackendSettings};
use tracing::{debug, info};

use crate::acme::provider::{
    dns01_record, ChallengeKind, ChallengeProvider, ProviderError, ProviderResult,
};

/// Registry name
pub const NAME: &str = "arvancloud";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ARVANCLOUD_";

/// Lowest TTL ArvanCloud accepts for TXT records
pub const MIN_TTL: u32 = 600;

/// Default settings
pub const DEFAULTS: BackendDefaults = BackendDefaults {
    min_ttl: MIN_TTL,
    ttl: MIN_TTL,
    propagation_timeout: Duration::from_secs(120),
    polling_interval: Duration::from_secs(2),
    http_timeout: Duration::from_secs(30),
};

/// ArvanCloud DNS provider
#[derive(Debug)]
pub struct ArvanCloudProvider {
    settings: BackendSettings,
    client: ArvanCloudClient,
}

impl ArvanCloudProvider {
    /// Create a provider from explicit settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing credential, a TTL below
    /// [`MIN_TTL`], or polling bounds that are out of order.
    pub fn new(settings: BackendSettings) -> ProviderResult<Self> {
        settings.validate(NAME, MIN_TTL)?;

        let client = ArvanCloudClient::new(&settings.credential, settings.http_timeout)?;

        Ok(Self { settings, client })
    }

    /// Create a provider from `ARVANCLOUD_*` variables
    pub fn from_vars<I>(vars: I) -> ProviderResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings = BackendSettings::from_vars(NAME, ENV_PREFIX, vars, &DEFAULTS)?;
        Self::new(settings)
    }

    /// Use a different API endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.client = self.client.with_base_url(base_url);
        self
    }

    /// Resolved settings
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }
}

/// Zone and zone-relative record name for a challenge
fn record_location(domain: &str, key_auth: &str) -> (String, String, String, String) {
    let zone = normalize_domain(domain).to_string();
    let (fqdn, value) = dns01_record(domain, key_auth);
    let name = relative_record_name(&fqdn, &zone);
    (zone, fqdn, name, value)
}

#[async_trait]
impl ChallengeProvider for ArvanCloudProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> ProviderResult<()> {
        let (zone, fqdn, name, value) = record_location(domain, key_auth);

        if self.client.find_txt_record(&zone, &name, &value).await?.is_some() {
            debug!(domain = %domain, fqdn = %fqdn, "TXT record already present");
            return Ok(());
        }

        let record = DnsRecord::txt(&name, &value, self.settings.ttl);
        self.client
            .create_record(&zone, &record)
            .await
            .map_err(|e| match e {
                ProviderError::RecordCreation { message, .. } => ProviderError::RecordCreation {
                    record_name: fqdn.clone(),
                    message: format!("domain name={}: {}", domain, message),
                },
                other => other,
            })?;

        info!(domain = %domain, fqdn = %fqdn, "Created ArvanCloud TXT record");
        Ok(())
    }

    async fn clean_up(&self, domain: &str, _token: &str, key_auth: &str) -> ProviderResult<()> {
        let (zone, fqdn, name, value) = record_location(domain, key_auth);

        let Some(record) = self.client.find_txt_record(&zone, &name, &value).await? else {
            debug!(domain = %domain, fqdn = %fqdn, "TXT record already removed");
            return Ok(());
        };

        let Some(record_id) = record.id else {
            return Err(ProviderError::RecordDeletion {
                record_id: String::new(),
                message: format!("record '{}' has no id", record.name),
            });
        };

        if self.client.delete_record(&zone, &record_id).await? {
            info!(domain = %domain, record_id = %record_id, "Deleted ArvanCloud TXT record");
        } else {
            debug!(domain = %domain, record_id = %record_id, "TXT record already deleted");
        }

        Ok(())
    }

    fn timeout(&self) -> (Duration, Duration) {
        (
            self.settings.propagation_timeout,
            self.settings.polling_interval,
        )
    }
}
