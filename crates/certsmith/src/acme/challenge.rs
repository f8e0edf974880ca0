//! Challenge orchestration
//!
//! Drives a [`ChallengeProvider`] through the authorizations of one order:
//!
//! 1. Present every challenge
//! 2. Poll each challenge until it is visible or the provider's time budget
//!    runs out
//! 3. Clean up every challenge once the authority has decided
//!
//! All authorizations of an order are handled concurrently, so a slowly
//! propagating domain never holds back the others.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::error::AcmeError;
use super::propagation::{DnsTxtCheck, HttpTokenCheck, NoCheck, PropagationCheck};
use super::provider::{ChallengeDescriptor, ChallengeKind, ChallengeProvider, ProviderError};

/// Timeout of a single HTTP-01 self check request
const HTTP_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A clean-up call that failed
///
/// Clean-up failures never fail an issuance; they are reported so the
/// caller can surface them.
#[derive(Debug)]
pub struct CleanUpFailure {
    pub domain: String,
    pub error: ProviderError,
}

/// Drives one provider through challenge presentation, polling and clean-up
#[derive(Debug, Clone)]
pub struct ChallengeOrchestrator {
    provider: Arc<dyn ChallengeProvider>,
    check: Arc<dyn PropagationCheck>,
}

impl ChallengeOrchestrator {
    /// Create an orchestrator with an explicit propagation check
    pub fn new(provider: Arc<dyn ChallengeProvider>, check: Arc<dyn PropagationCheck>) -> Self {
        Self { provider, check }
    }

    /// Create an orchestrator with the check matching the provider's mechanism
    ///
    /// DNS-01 queries `resolvers` (empty = defaults) for the TXT record;
    /// HTTP-01 fetches the token over plain HTTP. With `disable_check` the
    /// challenge is assumed visible as soon as it is presented.
    pub fn with_default_check(
        provider: Arc<dyn ChallengeProvider>,
        resolvers: &[IpAddr],
        disable_check: bool,
    ) -> Result<Self, ProviderError> {
        let check: Arc<dyn PropagationCheck> = if disable_check {
            Arc::new(NoCheck)
        } else {
            match provider.kind() {
                ChallengeKind::Dns01 => Arc::new(DnsTxtCheck::new(resolvers)),
                ChallengeKind::Http01 => Arc::new(HttpTokenCheck::new(HTTP_CHECK_TIMEOUT)?),
            }
        };

        Ok(Self::new(provider, check))
    }

    /// Challenge mechanism of the underlying provider
    pub fn kind(&self) -> ChallengeKind {
        self.provider.kind()
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Present all challenges and wait until each one is visible
    ///
    /// On error some challenges may already be published; the caller must
    /// still run [`clean_up_all`](Self::clean_up_all).
    pub async fn prepare(&self, challenges: &[ChallengeDescriptor]) -> Result<(), AcmeError> {
        self.present_all(challenges).await?;
        self.wait_all(challenges).await
    }

    /// Present every challenge concurrently
    pub async fn present_all(&self, challenges: &[ChallengeDescriptor]) -> Result<(), AcmeError> {
        let results = join_all(challenges.iter().map(|challenge| self.present(challenge))).await;
        results.into_iter().collect()
    }

    async fn present(&self, challenge: &ChallengeDescriptor) -> Result<(), AcmeError> {
        info!(
            domain = %challenge.domain,
            provider = %self.provider.name(),
            kind = %challenge.kind,
            "Presenting challenge"
        );

        self.provider
            .present(
                &challenge.domain,
                &challenge.token,
                &challenge.key_authorization,
            )
            .await
            .map_err(|source| AcmeError::Present {
                domain: challenge.domain.clone(),
                kind: challenge.kind,
                source,
            })
    }

    /// Wait for every challenge concurrently
    pub async fn wait_all(&self, challenges: &[ChallengeDescriptor]) -> Result<(), AcmeError> {
        let results = join_all(
            challenges
                .iter()
                .map(|challenge| self.wait_for_propagation(challenge)),
        )
        .await;
        results.into_iter().collect()
    }

    /// Poll until the challenge is visible or the provider's budget runs out
    pub async fn wait_for_propagation(
        &self,
        challenge: &ChallengeDescriptor,
    ) -> Result<(), AcmeError> {
        let (max_wait, poll_interval) = self.provider.timeout();
        let start = Instant::now();

        debug!(
            domain = %challenge.domain,
            timeout_secs = max_wait.as_secs(),
            interval_ms = poll_interval.as_millis() as u64,
            "Waiting for challenge propagation"
        );

        loop {
            match self.check.is_visible(challenge).await {
                Ok(true) => {
                    debug!(
                        domain = %challenge.domain,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Challenge propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    trace!(domain = %challenge.domain, "Challenge not yet visible");
                }
                Err(e) => {
                    warn!(domain = %challenge.domain, error = %e, "Propagation check failed");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Err(AcmeError::PropagationTimeout {
                    domain: challenge.domain.clone(),
                    elapsed,
                });
            }

            tokio::time::sleep(poll_interval.min(max_wait - elapsed)).await;
        }
    }

    /// Clean up every challenge concurrently
    ///
    /// Failures are logged and returned, never raised.
    pub async fn clean_up_all(&self, challenges: &[ChallengeDescriptor]) -> Vec<CleanUpFailure> {
        let results = join_all(challenges.iter().map(|challenge| async move {
            self.provider
                .clean_up(
                    &challenge.domain,
                    &challenge.token,
                    &challenge.key_authorization,
                )
                .await
                .map_err(|error| CleanUpFailure {
                    domain: challenge.domain.clone(),
                    error,
                })
        }))
        .await;

        let failures: Vec<CleanUpFailure> = results.into_iter().filter_map(Result::err).collect();

        for failure in &failures {
            warn!(
                domain = %failure.domain,
                provider = %self.provider.name(),
                error = %failure.error,
                "Failed to clean up challenge"
            );
        }

        if failures.is_empty() && !challenges.is_empty() {
            debug!(count = challenges.len(), "Cleaned up all challenges");
        }

        failures
    }
}
