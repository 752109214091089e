//! Azure OpenAI deployments.

use serde_json::{Value, json};
use tracing::debug;

use codeask_core::{AiClient, BoxFuture, ChatMessage, ProviderError};

use crate::http::HttpClient;
use crate::openai::chat_messages;
use crate::settings::ProviderSettings;

const DEFAULT_API_VERSION: &str = "2023-05-15";

/// Client for an Azure OpenAI chat deployment.
///
/// The deployment fixes the model, so no model name is sent.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: HttpClient,
    api_key: String,
    url: String,
    deployment: String,
    temperature: f64,
    max_tokens: u32,
    top_p: Option<f64>,
    verbose: bool,
}

impl AzureOpenAiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.require_api_key("azure")?.to_string();

        let endpoint = settings
            .azure_endpoint
            .as_deref()
            .or(settings.base_url.as_deref())
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::configuration("azure: an endpoint is required"))?;
        let deployment = settings
            .azure_deployment
            .as_deref()
            .or(settings.model.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ProviderError::configuration("azure: a deployment name is required"))?
            .to_string();
        let api_version = settings
            .azure_api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);

        Ok(Self {
            http: HttpClient::new("azure")?,
            api_key,
            url: format!(
                "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            deployment,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            verbose: settings.verbose,
        })
    }

    /// Deployment requests are sent to.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "messages": chat_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        body
    }
}

impl AiClient for AzureOpenAiClient {
    fn name(&self) -> &str {
        "azure"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let body = self.request_body(messages);
            if self.verbose {
                debug!(provider = "azure", url = %self.url, ?messages, "request");
            }

            let response = self
                .http
                .post_json(&self.url, &[("api-key", self.api_key.as_str())], &body)
                .await?;
            let text = self
                .http
                .extract_text(&response, "/choices/0/message/content")?;

            if self.verbose {
                debug!(provider = "azure", response = %text, "response");
            }
            Ok(text)
        })
    }
}
