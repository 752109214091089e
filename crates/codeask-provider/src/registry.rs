//! Provider lookup by name.

use std::collections::BTreeMap;

use tracing::debug;

use codeask_core::{AiClient, ProviderError};

use crate::anthropic::AnthropicClient;
use crate::azure::AzureOpenAiClient;
use crate::gemini::GeminiClient;
use crate::openai::OpenAiClient;
use crate::settings::ProviderSettings;

/// Builds a client from settings.
pub type ProviderConstructor = fn(&ProviderSettings) -> Result<Box<dyn AiClient>, ProviderError>;

/// Table of provider constructors keyed by lowercase provider id.
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Create a registry with the built-in providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("openai", openai);
        registry.register("anthropic", anthropic);
        registry.register("azure", azure);
        registry.register("gemini", gemini);
        registry
    }

    /// Register (or replace) a provider.
    pub fn register(&mut self, name: impl AsRef<str>, constructor: ProviderConstructor) {
        let name = name.as_ref().trim().to_ascii_lowercase();
        debug!(provider = %name, "registered provider");
        self.constructors.insert(name, constructor);
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors
            .contains_key(&name.trim().to_ascii_lowercase())
    }

    /// Registered provider ids in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Construct the provider registered under `name` (case-insensitive).
    pub fn create(
        &self,
        name: &str,
        settings: &ProviderSettings,
    ) -> Result<Box<dyn AiClient>, ProviderError> {
        let key = name.trim().to_ascii_lowercase();
        let constructor = self.constructors.get(&key).ok_or_else(|| {
            ProviderError::configuration(format!(
                "unsupported provider '{name}', supported: {}",
                self.names().join(", ")
            ))
        })?;
        constructor(settings)
    }
}

fn openai(settings: &ProviderSettings) -> Result<Box<dyn AiClient>, ProviderError> {
    Ok(Box::new(OpenAiClient::new(settings)?))
}

fn anthropic(settings: &ProviderSettings) -> Result<Box<dyn AiClient>, ProviderError> {
    Ok(Box::new(AnthropicClient::new(settings)?))
}

fn azure(settings: &ProviderSettings) -> Result<Box<dyn AiClient>, ProviderError> {
    Ok(Box::new(AzureOpenAiClient::new(settings)?))
}

fn gemini(settings: &ProviderSettings) -> Result<Box<dyn AiClient>, ProviderError> {
    Ok(Box::new(GeminiClient::new(settings)?))
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Environment variables holding the API key for `provider`, most specific first.
///
/// The generic `API_KEY` is always consulted last.
pub fn api_key_env_vars(provider: &str) -> &'static [&'static str] {
    match provider.trim().to_ascii_lowercase().as_str() {
        "openai" => &["OPENAI_API_KEY", "API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY", "API_KEY"],
        "azure" => &["AZURE_OPENAI_API_KEY", "API_KEY"],
        "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"],
        _ => &["API_KEY"],
    }
}
