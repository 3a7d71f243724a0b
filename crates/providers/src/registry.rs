//! Provider registry.
//!
//! Constructs and holds all configured LLM client instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars), and
//! instantiates the adapter for each configured provider.

use std::collections::HashMap;
use std::sync::Arc;

use rlm_domain::config::{LlmConfig, LlmStartupPolicy, ProviderKind};
use rlm_domain::error::{Error, Result};

use crate::client::LmClient;
use crate::openai_compat::OpenAiCompatClient;

/// Holds all instantiated LM clients and the `root`/`sub` role assignments.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LmClient>>,
    roles: HashMap<String, String>,
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub error: String,
}

impl ProviderRegistry {
    /// Build the registry from the harness's [`LlmConfig`]. Auth
    /// credentials are resolved eagerly (env vars are read here).
    /// Providers that fail to initialize are logged and skipped rather
    /// than aborting startup, unless `startup_policy` is `require_one`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LmClient>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result = match pc.kind {
                ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai => {
                    OpenAiCompatClient::from_config(pc).map(|c| Arc::new(c) as Arc<dyn LmClient>)
                }
            };

            match result {
                Ok(client) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LM provider");
                    providers.insert(pc.id.clone(), client);
                }
                Err(e) => {
                    tracing::warn!(provider_id = %pc.id, error = %e, "failed to initialize LM provider, skipping");
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if providers.is_empty()
            && !config.providers.is_empty()
            && config.startup_policy == LlmStartupPolicy::RequireOne
        {
            return Err(Error::Config(
                "all configured LLM providers failed to initialize (startup_policy = require_one)"
                    .into(),
            ));
        }

        Ok(Self {
            providers,
            roles: config.roles.clone(),
            init_errors,
        })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LmClient>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a role (`"root"` or `"sub"`) to its client and model name.
    /// The role config stores `"provider_id/model_name"`.
    pub fn resolve_role(&self, role: &str) -> Option<(Arc<dyn LmClient>, String)> {
        let spec = self.roles.get(role)?;
        let (provider_id, model) = spec.split_once('/')?;
        let client = self.providers.get(provider_id)?.clone();
        Some((client, model.to_string()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_empty_registry() {
        let config = LlmConfig::default();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_role_splits_provider_and_model() {
        let mut config = LlmConfig::default();
        config.roles.insert("root".into(), "openai/gpt-4o".into());
        let registry = ProviderRegistry::from_config(&config).unwrap();
        // No provider registered under "openai", so resolution fails cleanly.
        assert!(registry.resolve_role("root").is_none());
        assert!(registry.resolve_role("missing").is_none());
    }
}
