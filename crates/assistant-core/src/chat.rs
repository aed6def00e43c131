//! Chat Pipeline
//!
//! Turns one inbound user message into a persisted assistant reply:
//! moderate, persist the user turn, assemble the bounded history, request a
//! completion, persist the reply and append an audit entry.
//!
//! Failures while moderating, assembling history or completing are turned
//! into an in-thread apology message before the original error is returned,
//! so the HTTP layer can still pick a status code.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AssistantError, Result};
use crate::message::Conversation;
use crate::model::{thread_title, ChatLog, NewMessage, Thread, ThreadMessage};
use crate::provider::{AiService, CompletionOptions};
use crate::store::ChatStore;

/// Persona handed to the model on the first turn of a thread
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful trading assistant. You help users \
analyze markets, understand trading concepts, and make informed decisions. You do not provide \
specific financial advice or recommendations.";

const ERROR_PREFIX: &str = "I apologize, but I encountered an error: ";

/// Chat pipeline configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// System preamble prepended to a thread's first completion
    pub system_prompt: String,

    /// Number of most recent messages sent as context
    pub history_limit: usize,

    pub temperature: f32,

    /// Output token budget per completion
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            history_limit: 10,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Orchestrates one chat exchange against an AI service and a store
pub struct ChatService {
    ai: Box<dyn AiService>,
    store: Arc<dyn ChatStore>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(ai: Box<dyn AiService>, store: Arc<dyn ChatStore>, config: ChatConfig) -> Self {
        Self { ai, store, config }
    }

    /// Create with default configuration
    pub fn with_defaults(ai: Box<dyn AiService>, store: Arc<dyn ChatStore>) -> Self {
        Self::new(ai, store, ChatConfig::default())
    }

    /// Create a thread titled after its first message
    pub async fn start_thread(&self, user_id: &str, initial_message: &str) -> Result<Thread> {
        self.store.create_thread(user_id, &thread_title(initial_message)).await
    }

    /// Process one user message and return the persisted assistant reply
    ///
    /// When `thread_id` is `None` a thread is created first.
    pub async fn process_message(
        &self,
        user_id: &str,
        content: &str,
        thread_id: Option<Uuid>,
    ) -> Result<ThreadMessage> {
        self.process_message_with_image(user_id, content, None, thread_id).await
    }

    /// Same as `process_message`, with an optional image (URL or data URL)
    /// attached to the user turn
    pub async fn process_message_with_image(
        &self,
        user_id: &str,
        content: &str,
        image: Option<&str>,
        thread_id: Option<Uuid>,
    ) -> Result<ThreadMessage> {
        if content.trim().is_empty() {
            return Err(AssistantError::Validation("Message content is required".into()));
        }

        let thread = match thread_id {
            Some(id) => self
                .store
                .get_thread(id, user_id)
                .await?
                .ok_or_else(|| AssistantError::NotFound("Chat thread".into()))?,
            None => self.start_thread(user_id, content).await?,
        };

        tracing::debug!(
            thread_id = %thread.id,
            provider = self.ai.name(),
            has_image = image.is_some(),
            "Processing chat message"
        );

        // Moderation always precedes the completion request
        match self.ai.moderate_content(content).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(thread_id = %thread.id, "Message rejected by moderation");
                let err = AssistantError::ContentRejected("Message flagged by moderation".into());
                return Err(self.fail(&thread, user_id, err).await);
            }
            Err(e) => return Err(self.fail(&thread, user_id, e).await),
        }

        let turn = NewMessage::user(thread.id, user_id, content)
            .with_image(image.map(str::to_string));
        self.append(turn).await?;

        let conversation = match self.build_context(thread.id).await {
            Ok(conversation) => conversation,
            Err(e) => return Err(self.fail(&thread, user_id, e).await),
        };

        tracing::debug!(
            thread_id = %thread.id,
            messages = conversation.len(),
            est_tokens = conversation.estimate_tokens(),
            "Requesting completion"
        );

        let options = CompletionOptions {
            model: None,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let completion = match self
            .ai
            .create_chat_completion(conversation.messages(), &options)
            .await
        {
            Ok(c) if c.content.trim().is_empty() => {
                let err = AssistantError::Provider("Empty response from AI service".into());
                return Err(self.fail(&thread, user_id, err).await);
            }
            Ok(c) => c,
            Err(e) => return Err(self.fail(&thread, user_id, e).await),
        };

        let reply = self
            .append(NewMessage::new(thread.id, user_id, completion.role, &completion.content))
            .await?;

        let entry = ChatLog::new(user_id, content, &completion.content, &completion.model);
        if let Err(e) = self.store.append_chat_log(entry).await {
            tracing::warn!(error = %e, thread_id = %thread.id, "Failed to write chat log");
        }

        tracing::info!(
            thread_id = %thread.id,
            model = %completion.model,
            tokens = completion.usage.as_ref().map(|u| u.total_tokens),
            "Chat completion stored"
        );
        Ok(reply)
    }

    /// Recent history, with the preamble only when the just-saved user turn
    /// is the whole history
    async fn build_context(&self, thread_id: Uuid) -> Result<Conversation> {
        let history = self
            .store
            .recent_messages(thread_id, self.config.history_limit)
            .await?;
        let preamble = (history.len() <= 1).then_some(self.config.system_prompt.as_str());

        Ok(Conversation::from_history(
            history.iter().map(ThreadMessage::to_message),
            self.config.history_limit,
            preamble,
        ))
    }

    async fn append(&self, message: NewMessage) -> Result<ThreadMessage> {
        let thread_id = message.thread_id;
        let stored = self.store.insert_message(message).await?;
        self.store.touch_thread(thread_id).await?;
        Ok(stored)
    }

    /// Persist the apology message and hand the original error back
    async fn fail(&self, thread: &Thread, user_id: &str, err: AssistantError) -> AssistantError {
        tracing::error!(error = %err, thread_id = %thread.id, "Chat pipeline failed");

        let apology = format!("{ERROR_PREFIX}{}", err.user_message());
        if let Err(e) = self.append(NewMessage::assistant(thread.id, user_id, apology)).await {
            tracing::warn!(error = %e, thread_id = %thread.id, "Failed to store error message");
        }
        err
    }
}
