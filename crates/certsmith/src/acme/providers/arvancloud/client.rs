//! ArvanCloud CDN DNS API client
//!
//! Only the three calls needed for DNS-01 are implemented: create a record,
//! search the TXT records of a domain, and delete a record by id.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::acme::provider::{ProviderError, ProviderResult};

/// ArvanCloud API base URL
pub const DEFAULT_BASE_URL: &str = "https://napi.arvancloud.com/cdn/4.0";

/// A DNS record as exchanged with the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Opaque record id, assigned by ArvanCloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    /// Type-specific value; TXT records use `{"text": "..."}`
    pub value: Value,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_https: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_filter_mode: Option<IpFilterMode>,
}

impl DnsRecord {
    /// New TXT record
    pub fn txt(name: &str, text: &str, ttl: u32) -> Self {
        Self {
            id: None,
            record_type: "txt".to_string(),
            value: serde_json::json!({ "text": text }),
            name: name.to_string(),
            ttl: Some(ttl),
            upstream_https: Some("default".to_string()),
            ip_filter_mode: Some(IpFilterMode::default()),
        }
    }

    /// Whether this is the TXT record `name` holding `text`
    pub fn is_txt(&self, name: &str, text: &str) -> bool {
        self.record_type.eq_ignore_ascii_case("txt")
            && self.name == name
            && self.value.get("text").and_then(Value::as_str) == Some(text)
    }
}

/// Load-balancing mode attached to every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpFilterMode {
    pub count: String,
    pub order: String,
    pub geo_filter: String,
}

impl Default for IpFilterMode {
    fn default() -> Self {
        Self {
            count: "single".to_string(),
            order: "none".to_string(),
            geo_filter: "none".to_string(),
        }
    }
}

/// Upper bound on followed result pages, guards against link cycles
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

/// Thin ArvanCloud API client
#[derive(Debug, Clone)]
pub struct ArvanCloudClient {
    http: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl ArvanCloudClient {
    /// Create a client with the given credential and request timeout
    pub fn new(api_key: &str, timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::ApiRequest(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        })
    }

    /// Point the client at another API endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self, domain: &str) -> String {
        format!("{}/domains/{}/dns-records", self.base_url, domain)
    }

    fn map_send_error(&self, e: reqwest::Error, action: &str) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::ApiRequest(format!("Failed to {}: {}", action, e))
        }
    }

    /// Create a record in `domain`
    pub async fn create_record(&self, domain: &str, record: &DnsRecord) -> ProviderResult<()> {
        debug!(domain = %domain, record_name = %record.name, "Creating DNS record");

        let response = self
            .http
            .post(self.records_url(domain))
            .header("Authorization", &self.api_key)
            .json(record)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "create record"))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Authentication(
                "Invalid ArvanCloud API key".to_string(),
            ));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RecordCreation {
                record_name: record.name.clone(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        Ok(())
    }

    /// Find the TXT record `name` with value `text` in `domain`
    ///
    /// Search results are paginated; every page is read until a match is
    /// found or the API reports no further page. Returns `None` when no
    /// record matches.
    pub async fn find_txt_record(
        &self,
        domain: &str,
        name: &str,
        text: &str,
    ) -> ProviderResult<Option<DnsRecord>> {
        let search = name.replace('_', "");

        let mut request = self
            .http
            .get(self.records_url(domain))
            .query(&[("search", search.as_str())]);

        for page in 1..=MAX_PAGES {
            let records = self.search_page(request, domain, name).await?;

            trace!(
                domain = %domain,
                record_name = %name,
                page,
                candidates = records.data.len(),
                "Searched DNS records"
            );

            if let Some(record) = records.data.into_iter().find(|r| r.is_txt(name, text)) {
                return Ok(Some(record));
            }

            match records.links.and_then(|links| links.next) {
                Some(next) if !next.is_empty() => request = self.http.get(next),
                _ => return Ok(None),
            }
        }

        Err(ProviderError::RecordLookup {
            domain: domain.to_string(),
            record_name: name.to_string(),
            message: format!("Search results exceed {} pages", MAX_PAGES),
        })
    }

    async fn search_page(
        &self,
        request: reqwest::RequestBuilder,
        domain: &str,
        name: &str,
    ) -> ProviderResult<ApiResponse<Vec<DnsRecord>>> {
        let lookup_error = |message: String| ProviderError::RecordLookup {
            domain: domain.to_string(),
            record_name: name.to_string(),
            message,
        };

        let response = request
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "search records"))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Authentication(
                "Invalid ArvanCloud API key".to_string(),
            ));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_error(format!("HTTP {} - {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| lookup_error(format!("Failed to parse response: {}", e)))
    }

    /// Delete a record by id
    ///
    /// Returns `false` if the record did not exist.
    pub async fn delete_record(&self, domain: &str, record_id: &str) -> ProviderResult<bool> {
        debug!(domain = %domain, record_id = %record_id, "Deleting DNS record");

        let response = self
            .http
            .delete(format!("{}/{}", self.records_url(domain), record_id))
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "delete record"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RecordDeletion {
                record_id: record_id.to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        Ok(true)
    }
}
