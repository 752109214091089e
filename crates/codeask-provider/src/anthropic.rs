//! Anthropic messages API.

use serde_json::{Value, json};
use tracing::debug;

use codeask_core::{AiClient, BoxFuture, ChatMessage, ProviderError, Role};

use crate::http::HttpClient;
use crate::settings::ProviderSettings;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: HttpClient,
    api_key: String,
    url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    top_p: Option<f64>,
    top_k: Option<u32>,
    verbose: bool,
}

impl AnthropicClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.require_api_key("anthropic")?.to_string();
        Ok(Self {
            http: HttpClient::new("anthropic")?,
            api_key,
            url: format!("{}/messages", settings.base_url_or(DEFAULT_BASE_URL)),
            model: settings.model_or(DEFAULT_MODEL),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            top_k: settings.top_k,
            verbose: settings.verbose,
        })
    }

    /// Model requests are sent for.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// System messages move to the top-level `system` field.
    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": turns,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(top_k) = self.top_k {
            body["top_k"] = json!(top_k);
        }
        body
    }
}

impl AiClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let body = self.request_body(messages);
            if self.verbose {
                debug!(provider = "anthropic", model = %self.model, ?messages, "request");
            }

            let headers = [("x-api-key", self.api_key.as_str()), ("anthropic-version", API_VERSION)];
            let response = self.http.post_json(&self.url, &headers, &body).await?;
            let text = self.http.extract_text(&response, "/content/0/text")?;

            if self.verbose {
                debug!(provider = "anthropic", response = %text, "response");
            }
            Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_is_lifted() {
        let client = AnthropicClient::new(&ProviderSettings::new("key")).unwrap();
        let body = client.request_body(&[
            ChatMessage::system("be terse"),
            ChatMessage::user("File: a.py"),
        ]);

        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("top_k").is_none());
    }
}
