//! Domain Models
//!
//! Persisted records for users, conversation threads, messages, reactions,
//! per-user settings and the chat audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssistantError;
use crate::message::{Message, Role};

/// Title given to threads created without an initial message
pub const DEFAULT_THREAD_TITLE: &str = "New Conversation";

/// Title of the per-user thread that receives in-app alert notifications
pub const ALERTS_THREAD_TITLE: &str = "Price Alerts";

const TITLE_PREVIEW_CHARS: usize = 30;

/// Derive a thread title from the first message of a conversation
pub fn thread_title(initial_message: &str) -> String {
    let trimmed = initial_message.trim();
    if trimmed.is_empty() {
        return DEFAULT_THREAD_TITLE.into();
    }

    let preview: String = trimmed.chars().take(TITLE_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > TITLE_PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

/// An end user, as identified by the external auth provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A conversation container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Category tag of a stored message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    #[default]
    General,
    Analysis,
    Advice,
    Alert,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::General => "general",
            MessageCategory::Analysis => "analysis",
            MessageCategory::Advice => "advice",
            MessageCategory::Alert => "alert",
        }
    }
}

impl std::str::FromStr for MessageCategory {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(MessageCategory::General),
            "analysis" => Ok(MessageCategory::Analysis),
            "advice" => Ok(MessageCategory::Advice),
            "alert" => Ok(MessageCategory::Alert),
            other => Err(AssistantError::Validation(format!("Invalid category '{other}'"))),
        }
    }
}

/// An emoji tag applied by a user to a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// A single persisted turn in a thread
///
/// `user_id` is the acting principal, which is the end user even for
/// assistant-authored messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub category: MessageCategory,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl ThreadMessage {
    /// Provider-facing view of this message
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            image: self.image.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Insert payload for a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub thread_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub image: Option<String>,
    pub category: MessageCategory,
}

impl NewMessage {
    pub fn new(
        thread_id: Uuid,
        user_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            thread_id,
            user_id: user_id.into(),
            role,
            content: content.into(),
            image: None,
            category: MessageCategory::General,
        }
    }

    pub fn user(thread_id: Uuid, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, user_id, Role::User, content)
    }

    pub fn assistant(
        thread_id: Uuid,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(thread_id, user_id, Role::Assistant, content)
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn with_category(mut self, category: MessageCategory) -> Self {
        self.category = category;
        self
    }

    /// Materialize the record with a fresh id and timestamp
    pub fn into_record(self) -> ThreadMessage {
        ThreadMessage {
            id: Uuid::new_v4(),
            thread_id: self.thread_id,
            user_id: self.user_id,
            role: self.role,
            content: self.content,
            image: self.image,
            category: self.category,
            created_at: Utc::now(),
            reactions: Vec::new(),
        }
    }
}

/// Language-model backend selected in user settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted OpenAI API
    #[default]
    OpenAi,
    /// Self-hosted Ollama server
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(AssistantError::ProviderConfig(format!(
                "Unsupported AI provider: {other}"
            ))),
        }
    }
}

/// Per-user credentials and model selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: String,
    pub ai_provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_organization: Option<String>,
    pub openai_project_id: Option<String>,
    pub openai_model: Option<String>,
    pub ollama_endpoint: Option<String>,
    pub ollama_model: Option<String>,
    pub trading_view_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl UserSettings {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Merge a partial update. Empty strings clear a value.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        fn merge(slot: &mut Option<String>, value: Option<&String>) {
            if let Some(value) = value {
                let value = value.trim();
                *slot = (!value.is_empty()).then(|| value.to_string());
            }
        }

        if let Some(provider) = update.ai_provider {
            self.ai_provider = provider;
        }
        merge(&mut self.openai_api_key, update.openai_api_key.as_ref());
        merge(&mut self.openai_organization, update.openai_organization.as_ref());
        merge(&mut self.openai_project_id, update.openai_project_id.as_ref());
        merge(&mut self.openai_model, update.openai_model.as_ref());
        merge(&mut self.ollama_endpoint, update.ollama_endpoint.as_ref());
        merge(&mut self.ollama_model, update.ollama_model.as_ref());
        merge(&mut self.trading_view_api_key, update.trading_view_api_key.as_ref());
        merge(&mut self.telegram_bot_token, update.telegram_bot_token.as_ref());
        if let Some(chat_id) = update.telegram_chat_id {
            self.telegram_chat_id = Some(chat_id);
        }
    }

    /// Every stored value as an update, for replaying onto a fresh service
    pub fn to_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            ai_provider: Some(self.ai_provider),
            openai_api_key: self.openai_api_key.clone(),
            openai_organization: self.openai_organization.clone(),
            openai_project_id: self.openai_project_id.clone(),
            openai_model: self.openai_model.clone(),
            ollama_endpoint: self.ollama_endpoint.clone(),
            ollama_model: self.ollama_model.clone(),
            trading_view_api_key: self.trading_view_api_key.clone(),
            telegram_bot_token: self.telegram_bot_token.clone(),
            telegram_chat_id: self.telegram_chat_id,
        }
    }

    /// Copy with every secret reduced to its last four characters
    pub fn masked(&self) -> Self {
        fn mask(secret: Option<&String>) -> Option<String> {
            secret.map(|s| {
                let skip = s.chars().count().saturating_sub(4);
                let tail: String = s.chars().skip(skip).collect();
                format!("****{tail}")
            })
        }

        Self {
            openai_api_key: mask(self.openai_api_key.as_ref()),
            trading_view_api_key: mask(self.trading_view_api_key.as_ref()),
            telegram_bot_token: mask(self.telegram_bot_token.as_ref()),
            ..self.clone()
        }
    }
}

/// Partial settings update
///
/// Unknown keys are rejected during deserialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub ai_provider: Option<ProviderKind>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_organization: Option<String>,
    #[serde(default)]
    pub openai_project_id: Option<String>,
    #[serde(default)]
    pub openai_model: Option<String>,
    #[serde(default)]
    pub ollama_endpoint: Option<String>,
    #[serde(default)]
    pub ollama_model: Option<String>,
    #[serde(default)]
    pub trading_view_api_key: Option<String>,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<i64>,
}

/// Audit record of one request/response exchange
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLog {
    pub id: Uuid,
    pub user_id: String,
    pub input: String,
    pub output: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl ChatLog {
    pub fn new(
        user_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            input: input.into(),
            output: output.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_title() {
        assert_eq!(thread_title(""), DEFAULT_THREAD_TITLE);
        assert_eq!(thread_title("What is Bitcoin's trend?"), "What is Bitcoin's trend?");
        assert_eq!(
            thread_title("Explain the relative strength index in detail please"),
            "Explain the relative strength ..."
        );
    }

    #[test]
    fn test_settings_apply_and_clear() {
        let mut settings = UserSettings::new("u1");
        settings.apply(&SettingsUpdate {
            openai_api_key: Some("sk-user".into()),
            openai_model: Some("gpt-4o-mini".into()),
            ..Default::default()
        });
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-user"));

        settings.apply(&SettingsUpdate {
            openai_api_key: Some(String::new()),
            ..Default::default()
        });
        assert!(settings.openai_api_key.is_none());
        assert_eq!(settings.openai_model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_settings_update_rejects_unknown_keys() {
        let result: Result<SettingsUpdate, _> =
            serde_json::from_str(r#"{"openaiApiKey":"k","twitterToken":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_update_replays_every_field() {
        let mut settings = UserSettings::new("u1");
        settings.apply(&SettingsUpdate {
            ai_provider: Some(ProviderKind::Ollama),
            openai_api_key: Some("sk-user".into()),
            ollama_endpoint: Some("http://gpu-box:11434".into()),
            telegram_chat_id: Some(42),
            ..Default::default()
        });

        let mut replayed = UserSettings::new("u1");
        replayed.apply(&settings.to_update());

        assert_eq!(replayed, settings);
    }

    #[test]
    fn test_masked_settings() {
        let mut settings = UserSettings::new("u1");
        settings.openai_api_key = Some("sk-abcdef1234".into());
        assert_eq!(settings.masked().openai_api_key.as_deref(), Some("****1234"));
    }
}
