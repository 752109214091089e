//! Provider connection settings.

use serde::{Deserialize, Serialize};

use codeask_core::ProviderError;

/// Everything needed to construct a provider client.
///
/// Fields a provider does not use are ignored by it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: String,
    /// Model name; each provider has its own default.
    pub model: Option<String>,
    /// API base URL; each provider has its own default.
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub azure_endpoint: Option<String>,
    /// Azure deployment name; falls back to `model`.
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
    /// Log request messages and raw responses at debug level.
    pub verbose: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: None,
            base_url: None,
            temperature: 0.3,
            max_tokens: 4000,
            top_p: None,
            top_k: None,
            azure_endpoint: None,
            azure_deployment: None,
            azure_api_version: None,
            verbose: false,
        }
    }
}

impl ProviderSettings {
    /// Create settings with `api_key` and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The API key, or a configuration error naming `provider` when empty.
    pub(crate) fn require_api_key(&self, provider: &str) -> Result<&str, ProviderError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ProviderError::configuration(format!(
                "{provider}: no API key configured"
            )));
        }
        Ok(key)
    }

    /// Model name or `default`.
    pub(crate) fn model_or(&self, default: &str) -> String {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// Base URL or `default`, without a trailing slash.
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("azure_endpoint", &self.azure_endpoint)
            .field("azure_deployment", &self.azure_deployment)
            .field("azure_api_version", &self.azure_api_version)
            .field("verbose", &self.verbose)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ProviderSettings::new("key");
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.max_tokens, 4000);
        assert_eq!(settings.model_or("m"), "m");
        assert_eq!(settings.base_url_or("https://x/v1/"), "https://x/v1");
    }

    #[test]
    fn test_missing_api_key() {
        let settings = ProviderSettings::new("  ");
        assert!(matches!(
            settings.require_api_key("openai"),
            Err(ProviderError::Configuration { .. })
        ));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let settings = ProviderSettings::new("sk-secret");
        assert!(!format!("{settings:?}").contains("sk-secret"));
    }
}
