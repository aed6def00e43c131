//! Provider selection
//!
//! The one place that branches on `ProviderKind`; everything downstream
//! only sees `dyn AiService`.

use std::time::Duration;

use assistant_core::{
    error::{AssistantError, Result},
    model::{ProviderKind, UserSettings},
    provider::{AiService, AiServiceFactory},
};

#[cfg(feature = "ollama")]
use crate::ollama::{OllamaConfig, OllamaService};
use crate::openai::{OpenAiConfig, OpenAiService};

/// Server-wide provider configuration
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub openai: OpenAiConfig,
    #[cfg(feature = "ollama")]
    pub ollama: OllamaConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            openai: OpenAiConfig::from_env(),
            #[cfg(feature = "ollama")]
            ollama: OllamaConfig::from_env(),
        }
    }
}

/// Builds the AI service selected by a user's settings
pub struct ProviderFactory {
    config: RuntimeConfig,
    http: reqwest::Client,
}

impl ProviderFactory {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AssistantError::ProviderConfig(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RuntimeConfig::from_env())
    }
}

impl AiServiceFactory for ProviderFactory {
    fn build(&self, settings: &UserSettings) -> Result<Box<dyn AiService>> {
        match settings.ai_provider {
            ProviderKind::OpenAi => Ok(Box::new(OpenAiService::new(
                self.http.clone(),
                self.config.openai.clone(),
                settings,
            )?)),
            #[cfg(feature = "ollama")]
            ProviderKind::Ollama => Ok(Box::new(OllamaService::for_user(
                self.config.ollama.clone(),
                settings,
            )?)),
            #[cfg(not(feature = "ollama"))]
            ProviderKind::Ollama => Err(AssistantError::ProviderConfig(
                "Ollama support is not enabled in this build".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(fallback: Option<&str>) -> ProviderFactory {
        let config = RuntimeConfig {
            openai: OpenAiConfig {
                fallback_api_key: fallback.map(Into::into),
                ..Default::default()
            },
            ..Default::default()
        };
        ProviderFactory::new(config).unwrap()
    }

    #[test]
    fn test_openai_without_any_key_fails_fast() {
        let err = factory(None).build(&UserSettings::new("u1")).err().unwrap();
        assert!(matches!(err, AssistantError::ProviderConfig(_)));
    }

    #[test]
    fn test_openai_uses_user_model() {
        let mut settings = UserSettings::new("u1");
        settings.openai_api_key = Some("sk-user".into());
        settings.openai_model = Some("gpt-4o-mini".into());

        let service = factory(None).build(&settings).unwrap();
        assert_eq!(service.name(), "OpenAI");
        assert_eq!(service.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_server_key_covers_users_without_one() {
        let service = factory(Some("sk-server")).build(&UserSettings::new("u1")).unwrap();
        assert_eq!(service.model(), "gpt-3.5-turbo");
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn test_ollama_selection() {
        let mut settings = UserSettings::new("u1");
        settings.ai_provider = ProviderKind::Ollama;

        let service = factory(None).build(&settings).unwrap();
        assert_eq!(service.name(), "Ollama");
    }
}
