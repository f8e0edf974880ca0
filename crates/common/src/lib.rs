//! Common utilities for certsmith.
//!
//! Domain-name helpers shared by the configuration layer and the renewal
//! engine:
//!
//! - **Reconciliation**: merging a requested domain list into the domain set
//!   of a previously issued certificate
//! - **Challenge names**: building `_acme-challenge` record names and
//!   converting between absolute and relative DNS names
//! - **Storage names**: file-system safe names for certificate files

pub mod domains;

pub use domains::{
    challenge_fqdn, merge_domains, normalize_domain, relative_record_name, sanitized_domain,
    to_fqdn, un_fqdn, ACME_CHALLENGE_LABEL,
};
