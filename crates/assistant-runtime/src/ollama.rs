//! Ollama AI Service
//!
//! Implementation of `AiService` for a self-hosted Ollama server.
//!
//! Ollama has no moderation endpoint. `moderate_content` falls back to a
//! fixed keyword denylist; it is coarse and is not a security boundary.

use assistant_core::{
    error::{AssistantError, Result},
    message::{Message, Role},
    model::{SettingsUpdate, UserSettings},
    provider::{AiService, Completion, CompletionOptions, ModelInfo, TokenUsage},
};
use async_trait::async_trait;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
        images::Image,
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

/// Terms rejected by the keyword moderation fallback
pub const DENYLIST: [&str; 6] = ["hack", "exploit", "crack", "steal", "illegal", "fraud"];

/// Model used when the user has not selected one
pub const DEFAULT_OLLAMA_MODEL: &str = "granite3.2-vision";

/// Ollama server configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Model used when the user has not selected one
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: DEFAULT_OLLAMA_MODEL.into(),
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);
        let model = std::env::var("OLLAMA_MODEL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.into());

        Self { host, port, model }
    }

    /// Override host and port from a user-supplied endpoint such as
    /// `http://gpu-box:11434` (a trailing `/api` is tolerated)
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let invalid = |reason: String| {
            AssistantError::ProviderConfig(format!(
                "Invalid Ollama endpoint '{endpoint}': {reason}"
            ))
        };
        let url = reqwest::Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("no host".into()))?;

        self.host = format!("{}://{}", url.scheme(), host);
        self.port = url.port_or_known_default().unwrap_or(self.port);
        Ok(self)
    }
}

/// Base64 payload of a `data:` URL. Ollama takes inline images only, so
/// remote URLs are dropped.
fn inline_image(image: &str) -> Option<Image> {
    let (_, data) = image.strip_prefix("data:")?.split_once(";base64,")?;
    Some(Image::from_base64(data))
}

/// Case-insensitive denylist check
pub fn keyword_flagged(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DENYLIST.iter().any(|term| lowered.contains(term))
}

/// Ollama-backed AI service
pub struct OllamaService {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaService {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Server defaults overridden by the user's endpoint and model
    ///
    /// Unlike `update_config`, an invalid endpoint is an error here.
    pub fn for_user(base: OllamaConfig, settings: &UserSettings) -> Result<Self> {
        if let Some(endpoint) = &settings.ollama_endpoint {
            base.clone().with_endpoint(endpoint)?;
        }

        let mut service = Self::from_config(base);
        service.update_config(&settings.to_update());
        Ok(service)
    }

    /// Convert messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                let message = ChatMessage::new(role, m.content.clone());
                match m.image.as_deref().and_then(inline_image) {
                    Some(image) => message.with_images(vec![image]),
                    None => message,
                }
            })
            .collect()
    }

    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            role: Role::Assistant,
            content: response.message.content,
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| {
                let prompt = d.prompt_eval_count;
                let completion = d.eval_count;
                let total = prompt.saturating_add(completion);
                TokenUsage {
                    prompt_tokens: u32::try_from(prompt).unwrap_or(u32::MAX),
                    completion_tokens: u32::try_from(completion).unwrap_or(u32::MAX),
                    total_tokens: u32::try_from(total).unwrap_or(u32::MAX),
                }
            }),
        }
    }

    fn build_options(opts: &CompletionOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl AiService for OllamaService {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn moderate_content(&self, text: &str) -> Result<bool> {
        Ok(keyword_flagged(text))
    }

    async fn create_chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let model = options.model.clone().unwrap_or_else(|| self.config.model.clone());
        let request = ChatMessageRequest::new(model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(options));

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(format!("Ollama API error: {e}")))?;

        Ok(Self::convert_completion(response, &model))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(format!("Ollama API error: {e}")))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
                created: None,
                owned_by: None,
            })
            .collect())
    }

    fn update_config(&mut self, settings: &SettingsUpdate) {
        let endpoint = settings.ollama_endpoint.as_deref().filter(|e| !e.trim().is_empty());
        if let Some(endpoint) = endpoint {
            match self.config.clone().with_endpoint(endpoint) {
                Ok(config) => {
                    self.client = Ollama::new(&config.host, config.port);
                    self.config = config;
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid Ollama endpoint"),
            }
        }
        if let Some(model) = settings.ollama_model.as_deref().filter(|m| !m.trim().is_empty()) {
            self.config.model = model.to_string();
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_endpoint_parsing() {
        let config = OllamaConfig::default()
            .with_endpoint("http://gpu-box:8080/api")
            .unwrap();
        assert_eq!(config.host, "http://gpu-box");
        assert_eq!(config.port, 8080);

        assert!(OllamaConfig::default().with_endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn test_keyword_moderation() {
        let service = OllamaService::from_config(OllamaConfig::default());
        assert!(service.moderate_content("How do I EXPLOIT the market?").await.unwrap());
        assert!(!service.moderate_content("What is the RSI of ETH?").await.unwrap());
    }

    #[test]
    fn test_user_settings_override_model() {
        let mut settings = UserSettings::new("u1");
        settings.ollama_model = Some("llama3.2".into());

        let service = OllamaService::for_user(OllamaConfig::default(), &settings).unwrap();
        assert_eq!(service.model(), "llama3.2");
    }

    #[test]
    fn test_user_endpoint_applied_and_validated() {
        let mut settings = UserSettings::new("u1");
        settings.ollama_endpoint = Some("http://gpu-box:8080".into());

        let service = OllamaService::for_user(OllamaConfig::default(), &settings).unwrap();
        assert_eq!(service.config.host, "http://gpu-box");
        assert_eq!(service.config.port, 8080);

        settings.ollama_endpoint = Some("not a url".into());
        let err = OllamaService::for_user(OllamaConfig::default(), &settings).err().unwrap();
        assert!(matches!(err, AssistantError::ProviderConfig(_)));
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
        ];

        let converted = OllamaService::convert_messages(&messages);
        assert_eq!(converted.len(), 2);
    }

    #[test]
    fn test_only_inline_images_are_forwarded() {
        let messages = vec![
            Message::user("remote").with_image("https://charts.example/btc.png"),
            Message::user("inline").with_image("data:image/png;base64,iVBORw0KGgo="),
        ];

        let converted = OllamaService::convert_messages(&messages);
        assert!(converted[0].images.is_none());
        assert_eq!(converted[1].images.as_ref().map(Vec::len), Some(1));
    }
}
