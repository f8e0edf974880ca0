//! Challenge provider implementations
//!
//! Available providers:
//! - [`ArvanCloudProvider`] - ArvanCloud DNS API (dns-01)
//! - [`WebrootProvider`] - files below a web server root (http-01)
//!
//! DNS providers are selected by name through [`ProviderRegistry`], which is
//! resolved once at startup. Each entry maps the name to a constructor that
//! reads the provider's prefixed environment variables.

pub mod arvancloud;
pub mod webroot;

pub use arvancloud::ArvanCloudProvider;
pub use webroot::WebrootProvider;

use std::collections::BTreeMap;
use std::sync::Arc;

use certsmith_config::ConfigError;
use tracing::debug;

use super::provider::{ChallengeProvider, ProviderError, ProviderResult};

/// Environment snapshot handed to provider constructors
pub type EnvVars = Vec<(String, String)>;

/// Builds a provider from environment variables
pub type ProviderConstructor = fn(&EnvVars) -> ProviderResult<Arc<dyn ChallengeProvider>>;

/// Name -> constructor map of the DNS providers
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: BTreeMap<&'static str, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in DNS provider
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(arvancloud::NAME, create_arvancloud);
        registry
    }

    /// Add or replace a provider constructor
    pub fn register(&mut self, name: &'static str, constructor: ProviderConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    /// Construct the provider registered under `name`
    pub fn create(&self, name: &str, vars: &EnvVars) -> ProviderResult<Arc<dyn ChallengeProvider>> {
        let constructor = self.constructors.get(name).ok_or_else(|| {
            ProviderError::Configuration(ConfigError::Challenge(format!(
                "Unrecognized DNS provider: {} (available: {})",
                name,
                self.names().join(", ")
            )))
        })?;

        let provider = constructor(vars)?;
        debug!(provider = %provider.name(), kind = %provider.kind(), "Created challenge provider");
        Ok(provider)
    }
}

fn create_arvancloud(vars: &EnvVars) -> ProviderResult<Arc<dyn ChallengeProvider>> {
    let provider = ArvanCloudProvider::from_vars(vars.iter().cloned())?;
    Ok(Arc::new(provider))
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
