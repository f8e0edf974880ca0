//! ACME client wrapper around instant-acme
//!
//! Implements [`CertificateObtainer`] against a real authority:
//! - Loading the registered account from storage
//! - Ordering a certificate and collecting one challenge per authorization
//! - Driving the [`ChallengeOrchestrator`] and notifying the authority
//! - Finalizing with a CSR and downloading the chain

use std::time::Duration;

use async_trait::async_trait;
use certsmith_config::AccountSettings;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewOrder, Order,
    OrderStatus,
};
use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};
use tracing::{debug, error, info, trace, warn};

use super::certificate::{CertificateObtainer, CertificateResource, CsrRequest, ObtainRequest};
use super::challenge::ChallengeOrchestrator;
use super::error::AcmeError;
use super::provider::{ChallengeDescriptor, ChallengeKind};
use super::storage::CertificateStorage;

/// Timeout for the authority to validate all challenges
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for the certificate to be issued after finalization
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(60);

/// TLS feature extension (RFC 7633)
const TLS_FEATURE_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 24];
/// `SEQUENCE { INTEGER 5 }`: status_request
const MUST_STAPLE_VALUE: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x05];

/// ACME client for certificate issuance
pub struct AcmeClient {
    account: Account,
    email: String,
    orchestrator: ChallengeOrchestrator,
}

impl AcmeClient {
    /// Load the registered account for `settings` from storage
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::AccountNotRegistered`] if no credentials are
    /// stored for the account. Registration is not performed here.
    pub async fn from_storage(
        storage: &CertificateStorage,
        settings: &AccountSettings,
        orchestrator: ChallengeOrchestrator,
    ) -> Result<Self, AcmeError> {
        let creds_json = storage
            .load_account_credentials(&settings.server_dir(), &settings.email)?
            .ok_or_else(|| AcmeError::AccountNotRegistered {
                email: settings.email.clone(),
            })?;

        let credentials: AccountCredentials = serde_json::from_str(&creds_json)
            .map_err(|e| AcmeError::Account(format!("Failed to deserialize credentials: {}", e)))?;

        let account = Account::builder()
            .map_err(|e| AcmeError::Account(e.to_string()))?
            .from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::Account(e.to_string()))?;

        info!(
            email = %settings.email,
            server = %settings.server,
            provider = %orchestrator.provider_name(),
            "ACME account loaded"
        );

        Ok(Self {
            account,
            email: settings.email.clone(),
            orchestrator,
        })
    }

    /// Run one order to completion and return the PEM chain
    async fn issue(&self, domains: &[String], csr_der: &[u8]) -> Result<String, AcmeError> {
        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|domain| Identifier::Dns(domain.clone()))
            .collect();

        info!(domains = ?domains, kind = %self.orchestrator.kind(), "Creating certificate order");

        let mut order = self
            .account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let challenges = self.collect_challenges(&mut order).await?;

        let validated = self.validate(&mut order, &challenges).await;

        let failures = self.orchestrator.clean_up_all(&challenges).await;
        if !failures.is_empty() {
            warn!(
                count = failures.len(),
                "Challenges left behind after validation"
            );
        }

        validated?;
        self.finalize(&mut order, csr_der).await
    }

    /// One descriptor per pending authorization, for the provider's mechanism
    async fn collect_challenges(
        &self,
        order: &mut Order,
    ) -> Result<Vec<ChallengeDescriptor>, AcmeError> {
        let kind = self.orchestrator.kind();
        let challenge_type = challenge_type(kind);

        let mut authorizations = order.authorizations();
        let mut challenges = Vec::new();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| {
                AcmeError::OrderCreation(format!("Failed to get authorization: {}", e))
            })?;

            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };

            debug!(domain = %domain, status = ?authz.status, "Processing authorization");

            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %domain, "Authorization already valid");
                continue;
            }

            let challenge = authz
                .challenge(challenge_type.clone())
                .ok_or_else(|| AcmeError::NoChallenge {
                    domain: domain.clone(),
                    kind,
                })?;

            let key_authorization = challenge.key_authorization();

            challenges.push(ChallengeDescriptor {
                domain,
                token: challenge.token.clone(),
                key_authorization: key_authorization.as_str().to_string(),
                kind,
                url: challenge.url.clone(),
            });
        }

        Ok(challenges)
    }

    async fn validate(
        &self,
        order: &mut Order,
        challenges: &[ChallengeDescriptor],
    ) -> Result<(), AcmeError> {
        self.orchestrator.prepare(challenges).await?;
        set_ready(order, challenges).await?;
        wait_for_order_ready(order).await
    }

    /// Submit the CSR and download the issued chain
    async fn finalize(&self, order: &mut Order, csr_der: &[u8]) -> Result<String, AcmeError> {
        info!("Finalizing certificate order");

        order
            .finalize_csr(csr_der)
            .await
            .map_err(|e| AcmeError::Finalization(format!("Failed to finalize order: {}", e)))?;

        let deadline = tokio::time::Instant::now() + FINALIZE_TIMEOUT;
        loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| AcmeError::Finalization(format!("Failed to refresh order: {}", e)))?;

            match state.status {
                OrderStatus::Valid => {
                    let chain = order.certificate().await.map_err(|e| {
                        AcmeError::Finalization(format!("Failed to get certificate: {}", e))
                    })?;
                    return chain.ok_or_else(|| {
                        AcmeError::Finalization("No certificate in response".to_string())
                    });
                }
                OrderStatus::Invalid => {
                    return Err(AcmeError::Finalization("Order became invalid".to_string()));
                }
                _ => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::Timeout(
                            "Timed out waiting for certificate".to_string(),
                        ));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[async_trait]
impl CertificateObtainer for AcmeClient {
    async fn obtain(&self, request: ObtainRequest) -> Result<CertificateResource, AcmeError> {
        let Some(domain) = request.domains.first().cloned() else {
            return Err(AcmeError::OrderCreation("No domains requested".to_string()));
        };

        let key = match request.private_key {
            Some(key) => {
                debug!(domain = %domain, "Reusing private key");
                key
            }
            None => KeyPair::generate()
                .map_err(|e| AcmeError::Finalization(format!("Failed to generate key: {}", e)))?,
        };

        let csr = build_csr(&request.domains, &key, request.must_staple)?;
        let chain = self.issue(&request.domains, &csr).await?;

        let resource = CertificateResource::from_chain(
            &domain,
            request.domains,
            &chain,
            Some(key.serialize_pem()),
            request.bundle,
        )?;

        info!(domain = %domain, expires = %resource.expires, "Certificate issued successfully");
        Ok(resource)
    }

    async fn obtain_for_csr(
        &self,
        csr: &CsrRequest,
        bundle: bool,
    ) -> Result<CertificateResource, AcmeError> {
        let chain = self.issue(&csr.domains, &csr.der).await?;

        let resource = CertificateResource::from_chain(
            &csr.common_name,
            csr.domains.clone(),
            &chain,
            None,
            bundle,
        )?;

        info!(
            domain = %csr.common_name,
            expires = %resource.expires,
            "Certificate issued successfully"
        );
        Ok(resource)
    }
}

impl std::fmt::Debug for AcmeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeClient")
            .field("email", &self.email)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

fn challenge_type(kind: ChallengeKind) -> ChallengeType {
    match kind {
        ChallengeKind::Dns01 => ChallengeType::Dns01,
        ChallengeKind::Http01 => ChallengeType::Http01,
    }
}

/// Tell the authority every presented challenge can be validated
async fn set_ready(order: &mut Order, challenges: &[ChallengeDescriptor]) -> Result<(), AcmeError> {
    let mut authorizations = order.authorizations();

    while let Some(result) = authorizations.next().await {
        let mut authz = result.map_err(|e| AcmeError::Protocol(e.to_string()))?;

        let Some(descriptor) = challenges
            .iter()
            .find(|d| authz.challenges.iter().any(|c| c.url == d.url))
        else {
            continue;
        };

        let Some(mut challenge) = authz.challenge(challenge_type(descriptor.kind)) else {
            continue;
        };

        challenge
            .set_ready()
            .await
            .map_err(|e| AcmeError::ChallengeValidation {
                domain: descriptor.domain.clone(),
                message: e.to_string(),
            })?;

        debug!(domain = %descriptor.domain, "Challenge marked ready");
    }

    Ok(())
}

/// Poll the order until the authority has validated every authorization
async fn wait_for_order_ready(order: &mut Order) -> Result<(), AcmeError> {
    let deadline = tokio::time::Instant::now() + CHALLENGE_TIMEOUT;

    loop {
        let state = order
            .refresh()
            .await
            .map_err(|e| AcmeError::Protocol(format!("Failed to refresh order: {}", e)))?;

        match state.status {
            OrderStatus::Ready | OrderStatus::Valid => {
                info!("Order is ready for finalization");
                return Ok(());
            }
            OrderStatus::Invalid => {
                let (domain, message) = invalid_authorization(order)
                    .await
                    .unwrap_or_else(|| ("unknown".to_string(), "order became invalid".to_string()));
                error!(domain = %domain, message = %message, "Challenge validation failed");
                return Err(AcmeError::ChallengeValidation { domain, message });
            }
            OrderStatus::Pending | OrderStatus::Processing => {
                if tokio::time::Instant::now() > deadline {
                    return Err(AcmeError::Timeout(
                        "Timed out waiting for order to become ready".to_string(),
                    ));
                }
                trace!(status = ?state.status, "Order not ready yet, waiting...");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Domain and reason of the first rejected authorization
async fn invalid_authorization(order: &mut Order) -> Option<(String, String)> {
    let mut authorizations = order.authorizations();

    while let Some(Ok(authz)) = authorizations.next().await {
        if authz.status != AuthorizationStatus::Invalid {
            continue;
        }

        let identifier = authz.identifier();
        let domain = match &identifier.identifier {
            Identifier::Dns(domain) => domain.clone(),
            _ => continue,
        };

        let message = authz
            .challenges
            .iter()
            .find_map(|c| c.error.as_ref())
            .map(|problem| problem.to_string())
            .unwrap_or_else(|| "authorization is invalid".to_string());

        return Some((domain, message));
    }

    None
}

/// DER CSR for `domains`; the first domain becomes the subject CN
pub(crate) fn build_csr(
    domains: &[String],
    key: &KeyPair,
    must_staple: bool,
) -> Result<Vec<u8>, AcmeError> {
    let mut params = CertificateParams::new(domains.to_vec())
        .map_err(|e| AcmeError::Finalization(format!("Failed to create CSR params: {}", e)))?;

    let mut dn = DistinguishedName::new();
    if let Some(primary) = domains.first() {
        dn.push(DnType::CommonName, primary.as_str());
    }
    params.distinguished_name = dn;

    if must_staple {
        params.custom_extensions.push(CustomExtension::from_oid_content(
            TLS_FEATURE_OID,
            MUST_STAPLE_VALUE.to_vec(),
        ));
    }

    let csr = params
        .serialize_request(key)
        .map_err(|e| AcmeError::Finalization(format!("Failed to serialize CSR: {}", e)))?;

    Ok(csr.der().to_vec())
}
