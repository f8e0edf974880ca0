//! Configuration for the certsmith certificate renewer.
//!
//! Configuration comes from two places:
//!
//! - **Command line**: account, storage path, domain or CSR selection,
//!   challenge mechanism and renewal options. The binary parses the flags
//!   and hands the raw values to the constructors in [`renew`], which
//!   validate them before any network activity.
//! - **Environment**: challenge backend credentials and timing, loaded
//!   through [`BackendSettings::from_vars`] with a backend-specific prefix.

pub mod backend;
pub mod errors;
pub mod renew;

pub use backend::{BackendDefaults, BackendSettings};
pub use errors::ConfigError;
pub use renew::{
    validate_domain, AccountSettings, ChallengeSettings, DomainSelection, RenewOptions,
    DEFAULT_RENEW_DAYS, LETSENCRYPT_PRODUCTION, LETSENCRYPT_STAGING,
};
