use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `[llm]` config section: the provider list plus a role→model map
/// resolving `root`/`sub` (spec.md §6.4) to concrete provider/model pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Startup policy for provider initialization.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Model roles, keyed by role name (`"root"`, `"sub"`). Value format:
    /// `"provider_id/model_name"`.
    #[serde(default)]
    pub roles: HashMap<String, String>,
    /// Registered LLM providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            startup_policy: LlmStartupPolicy::AllowNone,
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

/// Controls how the harness handles provider initialization at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// The harness boots even if no providers initialize; `completion`
    /// fails lazily when it needs one that is unavailable.
    #[default]
    AllowNone,
    /// Abort startup if no providers successfully initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    AzureOpenai,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var holding the credential, read from the ambient environment
    /// at call time (spec.md §6.4) — never stored in the config file.
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_default_has_empty_providers() {
        let config = LlmConfig::default();
        assert!(config.providers.is_empty());
        assert!(config.roles.is_empty());
    }

    #[test]
    fn provider_config_deserializes() {
        let json = r#"{
            "id": "openai",
            "kind": "openai_compat",
            "base_url": "https://api.openai.com/v1",
            "auth": { "env": "OPENAI_API_KEY" },
            "default_model": "gpt-4o"
        }"#;
        let provider: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(provider.kind, ProviderKind::OpenaiCompat);
        assert_eq!(provider.auth.env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(provider.auth.mode, AuthMode::ApiKey);
    }
}
