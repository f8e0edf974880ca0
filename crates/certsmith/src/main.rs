//! Certsmith - Main entry point
//!
//! Renews ACME certificates through DNS-01 or HTTP-01 challenges.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use certsmith::acme::providers::EnvVars;
use certsmith::{
    AcmeClient, CertificateStorage, ChallengeOrchestrator, CommandHook, ProviderError,
    ProviderRegistry, RenewOutcome, Renewer, WebrootProvider,
};
use certsmith_config::{
    AccountSettings, ChallengeSettings, DomainSelection, RenewOptions, DEFAULT_RENEW_DAYS,
    LETSENCRYPT_PRODUCTION,
};

/// Certsmith - ACME certificate renewal
#[derive(Parser, Debug)]
#[command(name = "certsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Domains to process; the first one is the primary domain
    #[arg(short = 'd', long = "domains", global = true, value_delimiter = ',')]
    domains: Vec<String>,

    /// Existing certificate signing request (PEM or DER)
    #[arg(short = 'c', long = "csr", global = true)]
    csr: Option<PathBuf>,

    /// Email of the registered ACME account
    #[arg(short = 'm', long = "email", env = "CERTSMITH_EMAIL", global = true)]
    email: Option<String>,

    /// ACME directory URL
    #[arg(
        short = 's',
        long = "server",
        env = "CERTSMITH_SERVER",
        default_value = LETSENCRYPT_PRODUCTION,
        global = true
    )]
    server: String,

    /// Directory holding certificates and accounts
    #[arg(long = "path", env = "CERTSMITH_PATH", default_value = ".certsmith", global = true)]
    path: PathBuf,

    /// Solve DNS-01 challenges with the named provider
    #[arg(long = "dns", global = true)]
    dns: Option<String>,

    /// Solve HTTP-01 challenges by writing below this web root
    #[arg(long = "http-webroot", global = true)]
    http_webroot: Option<PathBuf>,

    /// Resolvers for the DNS-01 propagation check
    #[arg(long = "dns-resolvers", value_delimiter = ',', global = true)]
    dns_resolvers: Vec<IpAddr>,

    /// Skip the propagation check (DNS TXT lookup or HTTP self check)
    #[arg(long = "dns-disable-cp", global = true)]
    dns_disable_cp: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Renew a certificate
    Renew(RenewArgs),
}

#[derive(Args, Debug)]
struct RenewArgs {
    /// Renew when this many days or fewer are left; negative forces renewal
    #[arg(long = "days", default_value_t = DEFAULT_RENEW_DAYS, allow_negative_numbers = true)]
    days: i32,

    /// Reuse the current private key for the new certificate
    #[arg(long = "reuse-key")]
    reuse_key: bool,

    /// Store only the leaf certificate in the .crt file
    #[arg(long = "no-bundle")]
    no_bundle: bool,

    /// Request the OCSP must-staple extension (generated CSRs only)
    #[arg(long = "must-staple")]
    must_staple: bool,

    /// Command run only after a certificate was actually renewed
    #[arg(long = "renew-hook")]
    renew_hook: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Renew(args) => renew(cli.global, args),
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

/// Validate the invocation, then run one renewal
fn renew(global: GlobalArgs, args: RenewArgs) -> Result<()> {
    // Everything below is validated before any network activity
    let selection = DomainSelection::from_inputs(global.domains, global.csr)?;
    let account = AccountSettings::new(global.email, &global.server, global.path)?;
    let challenge = ChallengeSettings::from_inputs(
        global.dns,
        global.http_webroot,
        global.dns_resolvers,
        global.dns_disable_cp,
    )?;
    let options = RenewOptions {
        days: args.days,
        reuse_key: args.reuse_key,
        bundle: !args.no_bundle,
        must_staple: args.must_staple,
        renew_hook: args.renew_hook,
    };

    let orchestrator =
        build_orchestrator(&challenge).context("Failed to set up the challenge provider")?;
    let storage = Arc::new(
        CertificateStorage::new(&account.path).context("Failed to open certificate storage")?,
    );
    let hook = Arc::new(CommandHook::new(
        options.renew_hook.as_deref().unwrap_or_default(),
    ));

    let runtime = tokio::runtime::Runtime::new()?;

    let outcome = runtime.block_on(async {
        let client = AcmeClient::from_storage(&storage, &account, orchestrator)
            .await
            .context("Failed to load the ACME account")?;

        let renewer = Renewer::new(
            Arc::new(client),
            storage.clone(),
            hook,
            account.email.clone(),
            options,
        );

        renewer.renew(&selection).await.map_err(anyhow::Error::from)
    })?;

    match outcome {
        RenewOutcome::Skipped { domain } => {
            info!(domain = %domain, "No renewal needed");
        }
        RenewOutcome::Renewed(metadata) => {
            info!(
                domain = %metadata.domain,
                certificate = %metadata.cert_path.display(),
                "Renewal complete"
            );
        }
    }

    Ok(())
}

fn build_orchestrator(challenge: &ChallengeSettings) -> Result<ChallengeOrchestrator, ProviderError> {
    match challenge {
        ChallengeSettings::Dns {
            provider,
            resolvers,
            disable_propagation_check,
        } => {
            let vars: EnvVars = std::env::vars().collect();
            let provider = ProviderRegistry::with_builtin().create(provider, &vars)?;
            ChallengeOrchestrator::with_default_check(
                provider,
                resolvers,
                *disable_propagation_check,
            )
        }
        ChallengeSettings::Http {
            webroot,
            disable_propagation_check,
        } => ChallengeOrchestrator::with_default_check(
            Arc::new(WebrootProvider::new(webroot)),
            &[],
            *disable_propagation_check,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsmith::ChallengeKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_renew() {
        let cli = Cli::try_parse_from([
            "certsmith",
            "-d",
            "example.com",
            "--domains",
            "www.example.com",
            "-m",
            "admin@example.com",
            "--dns",
            "arvancloud",
            "renew",
            "--days",
            "-1",
            "--reuse-key",
            "--no-bundle",
        ])
        .unwrap();

        assert_eq!(cli.global.domains, vec!["example.com", "www.example.com"]);
        assert_eq!(cli.global.server, LETSENCRYPT_PRODUCTION);
        let Commands::Renew(args) = cli.command;
        assert_eq!(args.days, -1);
        assert!(args.reuse_key);
        assert!(args.no_bundle);
        assert!(!args.must_staple);
    }

    #[test]
    fn test_both_domains_and_csr_rejected_before_network() {
        let cli = Cli::try_parse_from([
            "certsmith",
            "-d",
            "example.com",
            "-c",
            "/nonexistent/req.csr",
            "-m",
            "admin@example.com",
            "--http-webroot",
            "/nonexistent/www",
            "renew",
        ])
        .unwrap();

        let Commands::Renew(args) = cli.command;
        let err = renew(cli.global, args).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_webroot_self_check_can_be_disabled() {
        let cli = Cli::try_parse_from([
            "certsmith",
            "-d",
            "example.com",
            "--http-webroot",
            "/srv/www",
            "--dns-disable-cp",
            "renew",
        ])
        .unwrap();

        let challenge = ChallengeSettings::from_inputs(
            cli.global.dns,
            cli.global.http_webroot,
            cli.global.dns_resolvers,
            cli.global.dns_disable_cp,
        )
        .unwrap();
        let orchestrator = build_orchestrator(&challenge).unwrap();

        assert_eq!(orchestrator.kind(), ChallengeKind::Http01);
        assert!(format!("{:?}", orchestrator).contains("NoCheck"));
    }

    #[test]
    fn test_webroot_self_check_enabled_by_default() {
        let challenge =
            ChallengeSettings::from_inputs(None, Some(PathBuf::from("/srv/www")), vec![], false)
                .unwrap();
        let orchestrator = build_orchestrator(&challenge).unwrap();

        let debug = format!("{:?}", orchestrator);
        assert!(debug.contains("HttpTokenCheck"));
        assert!(!debug.contains("NoCheck"));
    }
}
