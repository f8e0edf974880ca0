//! Certsmith Library
//!
//! ACME certificate renewal with pluggable domain-validation backends.
//!
//! This library provides the components behind the `certsmith` binary:
//!
//! - **Challenge providers**: one [`ChallengeProvider`] per DNS API or web
//!   root, selected by name through [`ProviderRegistry`]
//! - **Challenge orchestration**: concurrent presentation, propagation
//!   polling and clean-up of every authorization of an order
//! - **Issuance**: an `instant-acme` backed [`AcmeClient`]
//! - **Renewal**: the expiry decision, domain reconciliation, storage and
//!   post-renewal hooks driven by [`Renewer`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certsmith::{AcmeClient, CertificateStorage, ChallengeOrchestrator, CommandHook, Renewer};
//!
//! let orchestrator = ChallengeOrchestrator::with_default_check(provider, &[], false)?;
//! let client = AcmeClient::from_storage(&storage, &account, orchestrator).await?;
//! let renewer = Renewer::new(Arc::new(client), storage, hook, account.email, options);
//! renewer.renew(&selection).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod renew;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Challenge providers
pub use acme::providers::{ArvanCloudProvider, ProviderRegistry, WebrootProvider};
pub use acme::{ChallengeDescriptor, ChallengeKind, ChallengeProvider, ProviderError};

// Challenge orchestration
pub use acme::{ChallengeOrchestrator, DnsTxtCheck, HttpTokenCheck, NoCheck, PropagationCheck};

// Issuance and storage
pub use acme::{
    AcmeClient, AcmeError, CertificateObtainer, CertificateRecord, CertificateResource,
    CertificateStorage, CsrRequest, ObtainRequest, StorageError,
};

// Renewal
pub use renew::{
    needs_renewal, CommandHook, HookMetadata, RenewError, RenewOutcome, RenewalHook, Renewer,
};
