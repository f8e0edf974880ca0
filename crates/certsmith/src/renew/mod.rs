//! Certificate renewal
//!
//! - [`decision`] - Whether a held certificate must be reissued
//! - [`Renewer`] - Decision, domain reconciliation, issuance, storage and
//!   notification for one certificate
//! - [`RenewalHook`] - Notification after a successful renewal

pub mod decision;
mod error;
mod hook;
mod workflow;

pub use decision::{days_left, needs_renewal, needs_renewal_at};
pub use error::RenewError;
pub use hook::{
    CommandHook, HookError, HookMetadata, RenewalHook, DEFAULT_HOOK_TIMEOUT, ENV_ACCOUNT_EMAIL,
    ENV_CERT_DOMAIN, ENV_CERT_KEY_PATH, ENV_CERT_PATH,
};
pub use workflow::{load_csr, RenewOutcome, Renewer};
