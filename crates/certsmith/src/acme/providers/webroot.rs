//! HTTP-01 provider writing challenge files below a web root
//!
//! The web server already serving the domain must expose
//! `<webroot>/.well-known/acme-challenge/` at
//! `http://<domain>/.well-known/acme-challenge/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::acme::provider::{ChallengeKind, ChallengeProvider, ProviderError, ProviderResult};

/// Registry name
pub const NAME: &str = "webroot";

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Default time to wait for the token to be served
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Default interval between self checks
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Webroot HTTP-01 provider
#[derive(Debug, Clone)]
pub struct WebrootProvider {
    webroot: PathBuf,
    max_wait: Duration,
    poll_interval: Duration,
}

impl WebrootProvider {
    /// Create a provider writing below `webroot`
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        Self {
            webroot: webroot.into(),
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the self-check bounds
    ///
    /// Bounds that violate `0 < poll_interval < max_wait` are ignored.
    pub fn with_timeout(mut self, max_wait: Duration, poll_interval: Duration) -> Self {
        if !poll_interval.is_zero() && poll_interval < max_wait {
            self.max_wait = max_wait;
            self.poll_interval = poll_interval;
        }
        self
    }

    /// Path of the file serving `token`
    ///
    /// Tokens are restricted to the base64url alphabet, so the path never
    /// leaves the challenge directory.
    pub fn challenge_path(&self, token: &str) -> ProviderResult<PathBuf> {
        if !is_valid_token(token) {
            return Err(ProviderError::InvalidToken(token.to_string()));
        }

        Ok(self
            .webroot
            .join(ACME_CHALLENGE_PREFIX.trim_matches('/'))
            .join(token))
    }

    fn io_error(path: &Path, source: std::io::Error) -> ProviderError {
        ProviderError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[async_trait]
impl ChallengeProvider for WebrootProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Http01
    }

    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> ProviderResult<()> {
        let path = self.challenge_path(token)?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Self::io_error(dir, e))?;
        }

        tokio::fs::write(&path, key_auth.as_bytes())
            .await
            .map_err(|e| Self::io_error(&path, e))?;

        info!(domain = %domain, path = %path.display(), "Wrote HTTP-01 challenge file");
        Ok(())
    }

    async fn clean_up(&self, domain: &str, token: &str, _key_auth: &str) -> ProviderResult<()> {
        let path = self.challenge_path(token)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(domain = %domain, path = %path.display(), "Removed HTTP-01 challenge file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(domain = %domain, path = %path.display(), "Challenge file already removed");
                Ok(())
            }
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn timeout(&self) -> (Duration, Duration) {
        (self.max_wait, self.poll_interval)
    }
}
