//! Conversation Messages
//!
//! The provider-facing message format and the bounded history window
//! handed to a completion request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(AssistantError::Validation(format!(
                "Invalid role '{other}'. Must be \"user\", \"assistant\", or \"system\""
            ))),
        }
    }
}

/// A single message sent to a language model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Attached image (URL or data URL) for vision-capable models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach an image
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        // ~4 characters per token
        u32::try_from(self.content.len() / 4).unwrap_or(u32::MAX).saturating_add(4)
    }
}

/// Bounded conversation context for one completion request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Build a context from stored history, keeping only the `limit` most
    /// recent entries in chronological order. `preamble` is prepended when
    /// given.
    ///
    /// Only the newest entry keeps its image; earlier turns are sent as
    /// text.
    pub fn from_history<I>(history: I, limit: usize, preamble: Option<&str>) -> Self
    where
        I: IntoIterator<Item = Message>,
    {
        let mut recent: Vec<Message> = history.into_iter().collect();
        recent.sort_by_key(|m| m.timestamp);
        if recent.len() > limit {
            recent.drain(..recent.len() - limit);
        }
        if let Some((_, earlier)) = recent.split_last_mut() {
            for message in earlier {
                message.image = None;
            }
        }

        let mut messages = Vec::with_capacity(recent.len() + 1);
        if let Some(preamble) = preamble {
            messages.push(Message::system(preamble));
        }
        messages.extend(recent);
        Self { messages }
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(role: Role, content: &str, offset: i64) -> Message {
        let mut msg = Message::new(role, content);
        msg.timestamp = Utc::now() + Duration::seconds(offset);
        msg
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let history: Vec<Message> = (0..15)
            .map(|i| at(Role::User, &format!("m{i}"), i))
            .collect();

        let conv = Conversation::from_history(history, 10, None);

        assert_eq!(conv.len(), 10);
        assert_eq!(conv.messages()[0].content, "m5");
        assert_eq!(conv.last().unwrap().content, "m14");
    }

    #[test]
    fn test_preamble_comes_first() {
        let conv = Conversation::from_history(
            vec![at(Role::User, "hi", 0)],
            10,
            Some("You are helpful."),
        );

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[1].role, Role::User);
    }

    #[test]
    fn test_only_latest_turn_keeps_image() {
        let history = vec![
            at(Role::User, "first chart", 0).with_image("https://charts.example/1.png"),
            at(Role::Assistant, "looks bullish", 1),
            at(Role::User, "and this one?", 2).with_image("https://charts.example/2.png"),
        ];

        let conv = Conversation::from_history(history, 10, None);

        assert_eq!(conv.messages()[0].image, None);
        assert_eq!(conv.last().unwrap().image.as_deref(), Some("https://charts.example/2.png"));
    }

    #[test]
    fn test_image_omitted_from_json_when_absent() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("image").is_none());
    }
}
