//! Renewal decision policy

use chrono::{DateTime, Utc};
use tracing::info;

use super::error::RenewError;
use crate::acme::CertificateRecord;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days left until `not_after`, rounded down
pub fn days_left(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Decide whether `cert` must be reissued now
///
/// See [`needs_renewal_at`].
pub fn needs_renewal(
    cert: &CertificateRecord,
    domain: &str,
    days: i32,
) -> Result<bool, RenewError> {
    needs_renewal_at(cert, domain, days, Utc::now())
}

/// Decide whether `cert` must be reissued at `now`
///
/// A negative `days` always renews. Otherwise the certificate is renewed
/// once `days` or fewer whole days are left.
///
/// # Errors
///
/// A CA certificate is never a valid leaf and yields
/// [`RenewError::CaCertificate`].
pub fn needs_renewal_at(
    cert: &CertificateRecord,
    domain: &str,
    days: i32,
    now: DateTime<Utc>,
) -> Result<bool, RenewError> {
    if cert.is_ca {
        return Err(RenewError::CaCertificate {
            domain: domain.to_string(),
        });
    }

    if days < 0 {
        info!(domain = %domain, "Renewal forced");
        return Ok(true);
    }

    let days_left = days_left(cert.not_after, now);
    if days_left > i64::from(days) {
        info!(
            domain = %domain,
            days_left,
            renew_days = days,
            "The certificate expires in {} days, the number of days defined to perform the renewal is {}: no renewal",
            days_left,
            days
        );
        return Ok(false);
    }

    Ok(true)
}
