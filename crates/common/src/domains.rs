//! Domain-name helpers.
//!
//! # Reconciliation
//!
//! The first name of a certificate is commonly used by server configuration
//! as its primary name. A renewal keeps every previously covered name in its
//! original position and only appends names that were not covered yet:
//!
//! ```
//! use certsmith_common::merge_domains;
//!
//! let prev = vec!["a.com".to_string()];
//! let next = vec!["a.com".to_string(), "b.com".to_string()];
//! assert_eq!(merge_domains(&prev, &next), vec!["a.com", "b.com"]);
//! ```

use tracing::trace;

/// Label prepended to a domain for DNS-01 challenge records
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Merge the requested domains into a previously issued domain set.
///
/// The result starts as a copy of `prev`; each entry of `next` is appended,
/// in order, unless an identical (case-sensitive) entry is already present.
/// Nothing is removed and `prev` is never reordered.
pub fn merge_domains(prev: &[String], next: &[String]) -> Vec<String> {
    let mut merged = prev.to_vec();

    for domain in next {
        if !merged.iter().any(|existing| existing == domain) {
            trace!(domain = %domain, "Adding domain to certificate domain set");
            merged.push(domain.clone());
        }
    }

    merged
}

/// Strip a wildcard prefix (`*.example.com` -> `example.com`)
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Append the root dot if missing
pub fn to_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Remove the root dot if present
pub fn un_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Fully-qualified DNS-01 challenge record name for a domain
///
/// `example.com` and `*.example.com` both map to
/// `_acme-challenge.example.com.`
pub fn challenge_fqdn(domain: &str) -> String {
    to_fqdn(&format!("{}.{}", ACME_CHALLENGE_LABEL, normalize_domain(domain)))
}

/// Record name relative to a managed zone
///
/// Strips the trailing root dot, then everything from the first occurrence
/// of `.<zone>` onwards. A name that does not contain the zone is returned
/// unchanged (minus the root dot).
pub fn relative_record_name(fqdn: &str, zone: &str) -> String {
    let name = un_fqdn(fqdn);
    let suffix = format!(".{}", un_fqdn(zone));

    match name.find(&suffix) {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// File-system safe form of a domain, used for certificate file names
pub fn sanitized_domain(domain: &str) -> String {
    domain.replace('*', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_adds_new_domains() {
        let merged = merge_domains(&domains(&["a.com"]), &domains(&["a.com", "b.com"]));
        assert_eq!(merged, domains(&["a.com", "b.com"]));
    }

    #[test]
    fn test_merge_keeps_previous_order() {
        let merged = merge_domains(
            &domains(&["www.a.com", "a.com"]),
            &domains(&["a.com", "c.com", "www.a.com", "b.com"]),
        );
        assert_eq!(merged, domains(&["www.a.com", "a.com", "c.com", "b.com"]));
    }

    #[test]
    fn test_merge_never_drops_previous_domains() {
        let merged = merge_domains(&domains(&["a.com", "b.com"]), &domains(&["a.com"]));
        assert_eq!(merged, domains(&["a.com", "b.com"]));
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let merged = merge_domains(&domains(&["a.com"]), &domains(&["A.com"]));
        assert_eq!(merged, domains(&["a.com", "A.com"]));
    }

    #[test]
    fn test_merge_deduplicates_next() {
        let merged = merge_domains(&domains(&["a.com"]), &domains(&["b.com", "b.com"]));
        assert_eq!(merged, domains(&["a.com", "b.com"]));
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("example.com"), "example.com");
        assert_eq!(normalize_domain("*.example.com"), "example.com");
        assert_eq!(normalize_domain("*.sub.example.com"), "sub.example.com");
    }

    #[test]
    fn test_fqdn_conversion() {
        assert_eq!(to_fqdn("example.com"), "example.com.");
        assert_eq!(to_fqdn("example.com."), "example.com.");
        assert_eq!(un_fqdn("example.com."), "example.com");
        assert_eq!(un_fqdn("example.com"), "example.com");
    }

    #[test]
    fn test_challenge_fqdn() {
        assert_eq!(challenge_fqdn("example.com"), "_acme-challenge.example.com.");
        assert_eq!(challenge_fqdn("*.example.com"), "_acme-challenge.example.com.");
        assert_eq!(
            challenge_fqdn("sub.example.com"),
            "_acme-challenge.sub.example.com."
        );
    }

    #[test]
    fn test_relative_record_name() {
        assert_eq!(
            relative_record_name("_acme-challenge.example.com.", "example.com"),
            "_acme-challenge"
        );
        assert_eq!(
            relative_record_name("_acme-challenge.sub.example.com.", "sub.example.com"),
            "_acme-challenge"
        );
        assert_eq!(
            relative_record_name("_acme-challenge.sub.example.com.", "example.com"),
            "_acme-challenge.sub"
        );
        assert_eq!(
            relative_record_name("_acme-challenge.other.org.", "example.com"),
            "_acme-challenge.other.org"
        );
    }

    #[test]
    fn test_sanitized_domain() {
        assert_eq!(sanitized_domain("*.example.com"), "_.example.com");
        assert_eq!(sanitized_domain("example.com"), "example.com");
    }

    fn domain_list() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-d]\\.(com|org)", 1..8)
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(prev in domain_list(), next in domain_list()) {
            let once = merge_domains(&prev, &next);
            let twice = merge_domains(&once, &next);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_merge_preserves_prev_prefix(prev in domain_list(), next in domain_list()) {
            let merged = merge_domains(&prev, &next);
            prop_assert_eq!(&merged[..prev.len()], &prev[..]);
        }

        #[test]
        fn prop_merge_length(prev in domain_list(), next in domain_list()) {
            let merged = merge_domains(&prev, &next);

            let mut added: Vec<&String> = Vec::new();
            for domain in &next {
                if !prev.contains(domain) && !added.contains(&domain) {
                    added.push(domain);
                }
            }

            prop_assert_eq!(merged.len(), prev.len() + added.len());
        }

        #[test]
        fn prop_merge_covers_every_input(prev in domain_list(), next in domain_list()) {
            let merged = merge_domains(&prev, &next);
            for domain in prev.iter().chain(next.iter()) {
                prop_assert!(merged.contains(domain));
            }
        }
    }
}
