//! Post-renewal notification
//!
//! After a successful renewal the [`RenewalHook`] receives a
//! [`HookMetadata`]. The command hook exposes it to an external program as
//! environment variables:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `CERTSMITH_ACCOUNT_EMAIL` | account email |
//! | `CERTSMITH_CERT_DOMAIN` | primary domain |
//! | `CERTSMITH_CERT_PATH` | path of the `.crt` file |
//! | `CERTSMITH_CERT_KEY_PATH` | path of the `.key` file |

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const ENV_ACCOUNT_EMAIL: &str = "CERTSMITH_ACCOUNT_EMAIL";
pub const ENV_CERT_DOMAIN: &str = "CERTSMITH_CERT_DOMAIN";
pub const ENV_CERT_PATH: &str = "CERTSMITH_CERT_PATH";
pub const ENV_CERT_KEY_PATH: &str = "CERTSMITH_CERT_KEY_PATH";

/// Time a hook command may run before it is killed
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised by a renewal hook
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: String },
}

/// Facts about a completed renewal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookMetadata {
    pub account_email: String,
    pub domain: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl HookMetadata {
    pub fn new(
        account_email: impl Into<String>,
        domain: impl Into<String>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            account_email: account_email.into(),
            domain: domain.into(),
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Environment entries in their fixed order
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_ACCOUNT_EMAIL, self.account_email.clone()),
            (ENV_CERT_DOMAIN, self.domain.clone()),
            (ENV_CERT_PATH, path_string(&self.cert_path)),
            (ENV_CERT_KEY_PATH, path_string(&self.key_path)),
        ]
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// Notified once per successful renewal
#[async_trait]
pub trait RenewalHook: Send + Sync {
    async fn on_renewed(&self, metadata: HookMetadata) -> Result<(), HookError>;
}

/// Runs an external command with the metadata as environment
///
/// The command line is split on whitespace and executed without a shell.
/// An empty command does nothing.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: Option<String>,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandHook {
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        Self {
            program: parts.next(),
            args: parts.collect(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether running the hook does nothing
    pub fn is_noop(&self) -> bool {
        self.program.is_none()
    }

    fn command_line(&self) -> String {
        let mut line = self.program.clone().unwrap_or_default();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[async_trait]
impl RenewalHook for CommandHook {
    async fn on_renewed(&self, metadata: HookMetadata) -> Result<(), HookError> {
        let Some(program) = &self.program else {
            debug!(domain = %metadata.domain, "No renew hook configured");
            return Ok(());
        };
        let command = self.command_line();

        info!(domain = %metadata.domain, command = %command, "Running renew hook");

        let child = Command::new(program)
            .args(&self.args)
            .envs(metadata.to_env())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(HookError::Spawn { command, source }),
            Err(_) => {
                return Err(HookError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(domain = %metadata.domain, output = %stdout.trim_end(), "Renew hook output");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(domain = %metadata.domain, output = %stderr.trim_end(), "Renew hook error output");
        }

        if !output.status.success() {
            return Err(HookError::Failed {
                command,
                status: output.status.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> HookMetadata {
        HookMetadata::new(
            "admin@example.com",
            "example.com",
            "/var/lib/certsmith/certificates/example.com.crt",
            "/var/lib/certsmith/certificates/example.com.key",
        )
    }

    #[test]
    fn test_env_order() {
        let keys: Vec<&str> = metadata().to_env().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "CERTSMITH_ACCOUNT_EMAIL",
                "CERTSMITH_CERT_DOMAIN",
                "CERTSMITH_CERT_PATH",
                "CERTSMITH_CERT_KEY_PATH"
            ]
        );
        assert_eq!(metadata().to_env()[1].1, "example.com");
    }

    #[test]
    fn test_command_splitting() {
        let hook = CommandHook::new("  systemctl   reload nginx ");
        assert!(!hook.is_noop());
        assert_eq!(hook.command_line(), "systemctl reload nginx");

        assert!(CommandHook::new("").is_noop());
        assert!(CommandHook::new("   ").is_noop());
    }

    #[tokio::test]
    async fn test_empty_command_is_noop() {
        CommandHook::new("").on_renewed(metadata()).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("hook.sh");
        let out = dir.path().join("out");
        std::fs::write(
            &script,
            "echo \"$CERTSMITH_ACCOUNT_EMAIL $CERTSMITH_CERT_DOMAIN $CERTSMITH_CERT_PATH $CERTSMITH_CERT_KEY_PATH\" > \"$1\"\n",
        )
        .unwrap();

        let hook = CommandHook::new(&format!("sh {} {}", script.display(), out.display()));
        hook.on_renewed(metadata()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(out).unwrap().trim(),
            "admin@example.com example.com \
             /var/lib/certsmith/certificates/example.com.crt \
             /var/lib/certsmith/certificates/example.com.key"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let err = CommandHook::new("sh -c false")
            .on_renewed(metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let err = CommandHook::new("sleep 5")
            .with_timeout(Duration::from_millis(100))
            .on_renewed(metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = CommandHook::new("certsmith-hook-that-does-not-exist")
            .on_renewed(metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Spawn { .. }));
    }
}
