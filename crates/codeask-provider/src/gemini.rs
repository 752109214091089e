//! Google Gemini `generateContent`.

use serde_json::{Value, json};
use tracing::debug;

use codeask_core::{AiClient, BoxFuture, ChatMessage, ProviderError, Role};

use crate::http::HttpClient;
use crate::settings::ProviderSettings;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";

/// Client for the Gemini generative language API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
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

impl GeminiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.require_api_key("gemini")?.to_string();
        let model = settings.model_or(DEFAULT_MODEL);
        Ok(Self {
            http: HttpClient::new("gemini")?,
            api_key,
            url: format!(
                "{}/models/{model}:generateContent",
                settings.base_url_or(DEFAULT_BASE_URL)
            ),
            model,
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

    /// Gemini has no system role: system text is prepended to the first user turn.
    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut contents: Vec<(&str, String)> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::User { "user" } else { "model" };
                (role, m.content.clone())
            })
            .collect();

        if !system.is_empty() {
            if let Some((_, text)) = contents.first_mut().filter(|(role, _)| *role == "user") {
                *text = format!("{}\n\n{text}", system.join("\n\n"));
            }
        }

        let contents: Vec<Value> = contents
            .into_iter()
            .map(|(role, text)| json!({ "role": role, "parts": [{ "text": text }] }))
            .collect();

        let mut generation = json!({
            "temperature": self.temperature,
            "maxOutputTokens": self.max_tokens,
        });
        if let Some(top_p) = self.top_p {
            generation["topP"] = json!(top_p);
        }
        if let Some(top_k) = self.top_k {
            generation["topK"] = json!(top_k);
        }

        json!({ "contents": contents, "generationConfig": generation })
    }
}

impl AiClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let body = self.request_body(messages);
            if self.verbose {
                debug!(provider = "gemini", model = %self.model, ?messages, "request");
            }

            let response = self
                .http
                .post_json(&self.url, &[("x-goog-api-key", self.api_key.as_str())], &body)
                .await?;
            let text = self
                .http
                .extract_text(&response, "/candidates/0/content/parts/0/text")?;

            if self.verbose {
                debug!(provider = "gemini", response = %text, "response");
            }
            Ok(text)
        })
    }
}
