//! Shared HTTP plumbing and error classification.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use codeask_core::ProviderError;

/// Connection establishment timeout. The whole call is bounded by the
/// analysis engine's request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Map a non-success HTTP status to a classified error.
///
/// 401/403 are permanent authentication failures, 408/429 are transient
/// rate limits, 5xx are transient server errors and every other status is
/// a permanent invalid request.
pub fn classify_status(status: u16, body: &str, provider: &str) -> ProviderError {
    let message = format!("{provider}: {}", error_detail(body));
    match status {
        401 | 403 => ProviderError::Authentication { message },
        408 | 429 => ProviderError::RateLimited { message },
        500..=599 => ProviderError::Server { status, message },
        _ => ProviderError::InvalidRequest {
            message: format!("{message} (HTTP {status})"),
        },
    }
}

/// The provider's own error message if the body carries one, else a body excerpt.
fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
    });

    match message {
        Some(message) => message.to_string(),
        None => body.trim().chars().take(MAX_ERROR_BODY).collect(),
    }
}

/// A reqwest client bound to one provider name.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    inner: reqwest::Client,
    provider: &'static str,
}

impl HttpClient {
    pub(crate) fn new(provider: &'static str) -> Result<Self, ProviderError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::configuration(format!("{provider}: {e}")))?;
        Ok(Self { inner, provider })
    }

    /// POST `body` as JSON and parse the JSON response.
    pub(crate) async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, ProviderError> {
        let mut request = self.inner.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| self.send_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.send_error(e))?;

        if !status.is_success() {
            debug!(provider = self.provider, status = status.as_u16(), "request rejected");
            return Err(classify_status(status.as_u16(), &text, self.provider));
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::malformed(format!("{}: invalid JSON response: {e}", self.provider))
        })
    }

    fn send_error(&self, err: reqwest::Error) -> ProviderError {
        // Only the connect phase carries a reqwest timeout
        if err.is_timeout() {
            ProviderError::network(format!("{}: connect timed out", self.provider))
        } else if err.is_decode() {
            ProviderError::malformed(format!("{}: {err}", self.provider))
        } else {
            ProviderError::network(format!("{}: {err}", self.provider))
        }
    }

    /// Pull a string out of a response by JSON pointer.
    pub(crate) fn extract_text(&self, response: &Value, pointer: &str) -> Result<String, ProviderError> {
        response
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::malformed(format!("{}: response has no {pointer}", self.provider))
            })
    }
}
