//! The AI backend capability the analysis engine is written against.
//!
//! Concrete providers live in `codeask-provider`; the engine only ever sees
//! a `dyn AiClient`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Type alias for boxed futures returned by async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A language-model backend that turns an ordered conversation into text.
///
/// Implementations must classify failures through [`ProviderError`] so the
/// retry policy can tell transient conditions from permanent ones.
pub trait AiClient: Send + Sync {
    /// Provider identifier, used in logs.
    fn name(&self) -> &str;

    /// Issue one completion request.
    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>>;
}

/// Strip reasoning tags and Markdown fences that models like to wrap output in.
pub fn clean_response(raw: &str) -> String {
    raw.replace("<think>", "")
        .replace("</think>", "")
        .replace("```markdown", "")
        .replace("```", "")
        .trim()
        .to_string()
}
