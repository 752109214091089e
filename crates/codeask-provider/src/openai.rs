//! OpenAI-compatible chat completions.
//!
//! Also works against any server exposing `/chat/completions` in the same
//! shape (local model servers, proxies) by overriding the base URL.

use serde_json::{Value, json};
use tracing::debug;

use codeask_core::{AiClient, BoxFuture, ChatMessage, ProviderError};

use crate::http::HttpClient;
use crate::settings::ProviderSettings;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Client for the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    api_key: String,
    url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    top_p: Option<f64>,
    verbose: bool,
}

impl OpenAiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.require_api_key("openai")?.to_string();
        Ok(Self {
            http: HttpClient::new("openai")?,
            api_key,
            url: format!("{}/chat/completions", settings.base_url_or(DEFAULT_BASE_URL)),
            model: settings.model_or(DEFAULT_MODEL),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            verbose: settings.verbose,
        })
    }

    /// Model requests are sent for.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.model,
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

/// Messages in the OpenAI wire shape, shared with Azure.
pub(crate) fn chat_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
        .collect()
}

impl AiClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let body = self.request_body(messages);
            if self.verbose {
                debug!(provider = "openai", model = %self.model, ?messages, "request");
            }

            let authorization = format!("Bearer {}", self.api_key);
            let response = self
                .http
                .post_json(&self.url, &[("Authorization", authorization.as_str())], &body)
                .await?;
            let text = self
                .http
                .extract_text(&response, "/choices/0/message/content")?;

            if self.verbose {
                debug!(provider = "openai", response = %text, "response");
            }
            Ok(text)
        })
    }
}
