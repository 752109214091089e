//! HTTP AI providers for codeask.
//!
//! Every provider implements [`AiClient`] from `codeask-core`, so the
//! analysis engine never knows which backend it is talking to. Providers
//! are created by name through a [`ProviderRegistry`]:
//!
//! ```rust,ignore
//! use codeask_provider::{ProviderRegistry, ProviderSettings};
//!
//! let settings = ProviderSettings::new("sk-...").with_model("gpt-4o-mini");
//! let client = ProviderRegistry::default().create("openai", &settings)?;
//! ```
//!
//! HTTP failures are classified into transient and permanent
//! [`ProviderError`]s so the retry policy can act on them.

mod anthropic;
mod azure;
mod gemini;
mod http;
mod openai;
mod registry;
mod settings;

pub use anthropic::AnthropicClient;
pub use azure::AzureOpenAiClient;
pub use gemini::GeminiClient;
pub use http::classify_status;
pub use openai::OpenAiClient;
pub use registry::{ProviderConstructor, ProviderRegistry, api_key_env_vars};
pub use settings::ProviderSettings;

pub use codeask_core::{AiClient, ChatMessage, ProviderError};
