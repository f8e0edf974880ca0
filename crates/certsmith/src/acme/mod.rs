//! ACME certificate issuance
//!
//! # Architecture
//!
//! - [`ChallengeProvider`] - Capability every validation backend implements
//! - [`providers`] - ArvanCloud DNS-01, webroot HTTP-01 and the name registry
//! - [`PropagationCheck`] - Observes whether a presented challenge is visible
//! - [`ChallengeOrchestrator`] - Presents, polls and cleans up all challenges
//!   of an order concurrently
//! - [`AcmeClient`] - Wrapper around `instant-acme` implementing
//!   [`CertificateObtainer`]
//! - [`CertificateStorage`] - Certificates, keys and account credentials on disk
//!
//! # Challenge Flow
//!
//! 1. [`AcmeClient`] creates a new order with the ACME server
//! 2. For each pending authorization it builds a [`ChallengeDescriptor`]
//! 3. [`ChallengeOrchestrator`] presents every descriptor through the provider
//!    and polls until each one is visible or the provider's budget runs out
//! 4. The client marks the challenges ready and waits for the order
//! 5. The orchestrator cleans up; failures are logged, never fatal
//! 6. The client finalizes with a CSR and downloads the chain

mod certificate;
mod challenge;
mod client;
mod error;
mod propagation;
mod provider;
pub mod providers;
mod storage;

pub use certificate::{
    CertificateObtainer, CertificateRecord, CertificateResource, CsrRequest, ObtainRequest,
};
pub use challenge::{ChallengeOrchestrator, CleanUpFailure};
pub use client::AcmeClient;
pub use error::{AcmeError, StorageError};
pub use propagation::{DnsTxtCheck, HttpTokenCheck, NoCheck, PropagationCheck};
pub use provider::{
    dns01_record, ChallengeDescriptor, ChallengeKind, ChallengeProvider, ProviderError,
    ProviderResult,
};
pub use providers::{ArvanCloudProvider, ProviderRegistry, WebrootProvider};
pub use storage::{
    CertificateMeta, CertificateStorage, CERT_EXT, ISSUER_EXT, KEY_EXT, META_EXT,
};
