//! Error Types

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Assistant error types
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Missing or invalid caller identity
    #[error("Unauthorized")]
    Unauthorized,

    /// Referenced thread/message/rule absent or not owned by the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Moderation flagged the content
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// Missing or invalid credentials for the selected provider
    #[error("Provider configuration error: {0}")]
    ProviderConfig(String),

    /// Provider refused the credentials
    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    /// Rate or quota limits hit, after fallback credentials were tried
    #[error("Provider quota exceeded: {0}")]
    ProviderQuotaExceeded(String),

    /// Transient network or service failure
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Any other provider-side failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Malformed input payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AssistantError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::ProviderUnavailable(_) | AssistantError::ProviderQuotaExceeded(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Unauthorized => "Please sign in to continue.".into(),
            AssistantError::NotFound(what) => format!("{what} could not be found."),
            AssistantError::ContentRejected(_) => {
                "Your message was flagged as inappropriate and was not processed.".into()
            }
            AssistantError::ProviderConfig(msg) => format!(
                "The AI service is not configured correctly: {msg}. Please check your settings."
            ),
            AssistantError::ProviderAuth(_) => concat!(
                "There was an issue with the AI service authentication. ",
                "Please check your API key in settings."
            )
            .into(),
            AssistantError::ProviderQuotaExceeded(_) => concat!(
                "The AI service rate limit was exceeded. ",
                "Please try again later or check your API key settings."
            )
            .into(),
            AssistantError::ProviderUnavailable(_) => {
                "The AI service is currently unreachable. Please try again.".into()
            }
            AssistantError::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            AssistantError::Validation(msg) => format!("Invalid request: {msg}"),
            _ => "An error occurred while processing your message.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failures_have_distinct_messages() {
        let auth = AssistantError::ProviderAuth("401".into()).user_message();
        let down = AssistantError::ProviderUnavailable("timeout".into()).user_message();
        let quota = AssistantError::ProviderQuotaExceeded("429".into()).user_message();

        assert!(auth.contains("authentication"));
        assert!(down.contains("unreachable"));
        assert!(quota.contains("rate limit"));
        assert_ne!(auth, down);
        assert_ne!(down, quota);
    }

    #[test]
    fn test_retryable() {
        assert!(AssistantError::ProviderUnavailable("x".into()).is_retryable());
        assert!(!AssistantError::Validation("x".into()).is_retryable());
    }
}
