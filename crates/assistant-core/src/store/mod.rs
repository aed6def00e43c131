//! Persistence
//!
//! Storage traits for the relational state shared by both pipelines.
//! Every write is a single-row insert/update scoped by owner identifiers;
//! the only multi-step operation, the reaction toggle, is one method so
//! implementations can run it atomically.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::alert::{ActiveAlert, AlertRule, NewAlertRule};
use crate::error::Result;
use crate::model::{
    ChatLog, NewMessage, Reaction, SettingsUpdate, Thread, ThreadMessage, User, UserSettings,
};

/// Threads, messages, reactions and the chat audit log
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a thread owned by `user_id`
    async fn create_thread(&self, user_id: &str, title: &str) -> Result<Thread>;

    /// Owner-scoped thread lookup
    async fn get_thread(&self, thread_id: Uuid, user_id: &str) -> Result<Option<Thread>>;

    /// First thread of `user_id` carrying exactly `title`
    async fn find_thread_by_title(&self, user_id: &str, title: &str) -> Result<Option<Thread>>;

    /// Threads of a user, most recently updated first
    async fn list_threads(&self, user_id: &str) -> Result<Vec<Thread>>;

    /// Delete a thread with its messages and reactions. Returns whether a
    /// thread owned by `user_id` existed.
    async fn delete_thread(&self, thread_id: Uuid, user_id: &str) -> Result<bool>;

    /// Bump the thread's `updated_at`
    async fn touch_thread(&self, thread_id: Uuid) -> Result<()>;

    /// Append a message to its thread
    async fn insert_message(&self, message: NewMessage) -> Result<ThreadMessage>;

    /// The `limit` most recent messages of a thread, oldest first
    async fn recent_messages(&self, thread_id: Uuid, limit: usize) -> Result<Vec<ThreadMessage>>;

    /// Every message of a thread with its reactions, oldest first
    async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<ThreadMessage>>;

    /// Toggle `(message, user, emoji)` and return the message's reactions
    /// ordered by creation time.
    ///
    /// Fails with `NotFound` when the message does not exist or its thread
    /// is not owned by `user_id`. The existence check and the mutation are
    /// one logical unit.
    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<Vec<Reaction>>;

    /// Append an audit entry
    async fn append_chat_log(&self, entry: ChatLog) -> Result<()>;
}

/// Users and their settings
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Insert the user or refresh its profile fields
    async fn upsert_user(&self, user: User) -> Result<User>;

    async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>>;

    /// Apply a partial update, creating the settings row when missing
    async fn update_settings(&self, user_id: &str, update: &SettingsUpdate) -> Result<UserSettings>;
}

/// Alert rules
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(&self, user_id: &str, rule: NewAlertRule) -> Result<AlertRule>;

    async fn list_alerts(&self, user_id: &str) -> Result<Vec<AlertRule>>;

    /// Returns whether a rule owned by `user_id` was deleted
    async fn delete_alert(&self, alert_id: Uuid, user_id: &str) -> Result<bool>;

    /// Every active rule with its owner and the owner's settings
    async fn list_active_alerts(&self) -> Result<Vec<ActiveAlert>>;

    /// Clear the active flag. Returns `true` only for the call that
    /// actually changed it.
    async fn deactivate_alert(&self, alert_id: Uuid) -> Result<bool>;
}
