//! AI Service Strategy Pattern
//!
//! Defines one capability set shared by every language-model backend
//! (hosted OpenAI, self-hosted Ollama, ...) so the chat pipeline works with
//! any of them without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_core::provider::{AiService, CompletionOptions};
//!
//! let service = factory.build(&settings)?;
//!
//! if !service.moderate_content(text).await? {
//!     let options = CompletionOptions::default();
//!     let completion = service.create_chat_completion(&messages, &options).await?;
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, Role};
use crate::model::{SettingsUpdate, UserSettings};

/// Model used when the user has not selected one
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for one completion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model override; `None` uses the service's configured model
    #[serde(default)]
    pub model: Option<String>,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Author role reported by the provider
    pub role: Role,

    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,
}

/// Token usage statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model offered by a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Unix timestamp, when the provider reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

/// Strategy trait for language-model backends
///
/// Implement this trait to add support for new providers.
/// The chat pipeline works exclusively through this interface.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Provider name (e.g. "OpenAI", "Ollama")
    fn name(&self) -> &str;

    /// Model used when a request carries no override
    fn model(&self) -> &str;

    /// Returns `true` when the content is flagged and must not be processed
    async fn moderate_content(&self, text: &str) -> Result<bool>;

    /// Generate a completion from messages
    async fn create_chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Chat models available with the configured credentials
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Merge a partial settings update into the service configuration
    fn update_config(&mut self, settings: &SettingsUpdate);

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Builds the AI service selected by a user's settings
///
/// Provider branching lives in the implementation, once, at construction
/// time. Implementations fail with `ProviderConfig` when the selected
/// provider's required credential is absent.
pub trait AiServiceFactory: Send + Sync {
    fn build(&self, settings: &UserSettings) -> Result<Box<dyn AiService>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_options_defaults() {
        let opts = CompletionOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 1000);
        assert!(opts.model.is_none());
    }
}
