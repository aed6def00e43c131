//! In-memory store (for development/testing)
//!
//! All tables sit behind one `RwLock`, so every trait method observes and
//! mutates a consistent snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, AlertStore, ChatStore};
use crate::alert::{ActiveAlert, AlertRule, NewAlertRule};
use crate::error::{AssistantError, Result};
use crate::model::{
    ChatLog, NewMessage, Reaction, SettingsUpdate, Thread, ThreadMessage, User, UserSettings,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    settings: HashMap<String, UserSettings>,
    threads: HashMap<Uuid, Thread>,
    /// Insertion order is chronological order
    messages: Vec<ThreadMessage>,
    reactions: Vec<Reaction>,
    chat_logs: Vec<ChatLog>,
    alerts: Vec<AlertRule>,
}

impl Tables {
    fn reactions_for(&self, message_id: Uuid) -> Vec<Reaction> {
        let mut reactions: Vec<Reaction> = self
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        reactions.sort_by_key(|r| r.created_at);
        reactions
    }

    fn with_reactions(&self, message: &ThreadMessage) -> ThreadMessage {
        ThreadMessage {
            reactions: self.reactions_for(message.id),
            ..message.clone()
        }
    }
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit log
    pub async fn chat_logs(&self) -> Vec<ChatLog> {
        self.tables.read().await.chat_logs.clone()
    }

    /// Total number of stored messages across all threads
    pub async fn message_count(&self) -> usize {
        self.tables.read().await.messages.len()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_thread(&self, user_id: &str, title: &str) -> Result<Thread> {
        let thread = Thread::new(user_id, title);
        self.tables.write().await.threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: Uuid, user_id: &str) -> Result<Option<Thread>> {
        let tables = self.tables.read().await;
        Ok(tables
            .threads
            .get(&thread_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn find_thread_by_title(&self, user_id: &str, title: &str) -> Result<Option<Thread>> {
        let tables = self.tables.read().await;
        Ok(tables
            .threads
            .values()
            .filter(|t| t.user_id == user_id && t.title == title)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<Thread>> {
        let tables = self.tables.read().await;
        let mut threads: Vec<Thread> = tables
            .threads
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();

        // Sort by updated_at descending
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    async fn delete_thread(&self, thread_id: Uuid, user_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .threads
            .get(&thread_id)
            .is_some_and(|t| t.user_id == user_id);
        if !owned {
            return Ok(false);
        }

        tables.threads.remove(&thread_id);
        let removed: Vec<Uuid> = tables
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .map(|m| m.id)
            .collect();
        tables.messages.retain(|m| m.thread_id != thread_id);
        tables.reactions.retain(|r| !removed.contains(&r.message_id));
        Ok(true)
    }

    async fn touch_thread(&self, thread_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        let thread = tables
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| AssistantError::NotFound("Chat thread".into()))?;
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<ThreadMessage> {
        let mut tables = self.tables.write().await;
        if !tables.threads.contains_key(&message.thread_id) {
            return Err(AssistantError::NotFound("Chat thread".into()));
        }

        let record = message.into_record();
        tables.messages.push(record.clone());
        Ok(record)
    }

    async fn recent_messages(&self, thread_id: Uuid, limit: usize) -> Result<Vec<ThreadMessage>> {
        let tables = self.tables.read().await;
        let in_thread: Vec<&ThreadMessage> = tables
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .collect();
        let skip = in_thread.len().saturating_sub(limit);

        Ok(in_thread.into_iter().skip(skip).cloned().collect())
    }

    async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<ThreadMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .map(|m| tables.with_reactions(m))
            .collect())
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<Vec<Reaction>> {
        let mut tables = self.tables.write().await;

        let accessible = tables
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| tables.threads.get(&m.thread_id))
            .is_some_and(|t| t.user_id == user_id);
        if !accessible {
            return Err(AssistantError::NotFound("Message".into()));
        }

        let existing = tables
            .reactions
            .iter()
            .position(|r| r.message_id == message_id && r.user_id == user_id && r.emoji == emoji);
        match existing {
            Some(index) => {
                tables.reactions.remove(index);
            }
            None => tables.reactions.push(Reaction {
                id: Uuid::new_v4(),
                message_id,
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
                created_at: Utc::now(),
            }),
        }

        Ok(tables.reactions_for(message_id))
    }

    async fn append_chat_log(&self, entry: ChatLog) -> Result<()> {
        self.tables.write().await.chat_logs.push(entry);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .users
            .entry(user.id.clone())
            .and_modify(|existing| {
                if user.email.is_some() {
                    existing.email.clone_from(&user.email);
                }
                if user.name.is_some() {
                    existing.name.clone_from(&user.name);
                }
            })
            .or_insert(user);
        Ok(stored.clone())
    }

    async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        Ok(self.tables.read().await.settings.get(user_id).cloned())
    }

    async fn update_settings(
        &self,
        user_id: &str,
        update: &SettingsUpdate,
    ) -> Result<UserSettings> {
        let mut tables = self.tables.write().await;
        let settings = tables
            .settings
            .entry(user_id.to_string())
            .or_insert_with(|| UserSettings::new(user_id));
        settings.apply(update);
        Ok(settings.clone())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_alert(&self, user_id: &str, rule: NewAlertRule) -> Result<AlertRule> {
        let rule = rule.validate()?.into_rule(user_id);
        self.tables.write().await.alerts.push(rule.clone());
        Ok(rule)
    }

    async fn list_alerts(&self, user_id: &str) -> Result<Vec<AlertRule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_alert(&self, alert_id: Uuid, user_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.alerts.len();
        tables
            .alerts
            .retain(|a| !(a.id == alert_id && a.user_id == user_id));
        Ok(tables.alerts.len() < before)
    }

    async fn list_active_alerts(&self) -> Result<Vec<ActiveAlert>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .iter()
            .filter(|a| a.active)
            .map(|rule| ActiveAlert {
                rule: rule.clone(),
                user: tables
                    .users
                    .get(&rule.user_id)
                    .cloned()
                    .unwrap_or_else(|| User::new(rule.user_id.clone())),
                settings: tables.settings.get(&rule.user_id).cloned(),
            })
            .collect())
    }

    async fn deactivate_alert(&self, alert_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.alerts.iter_mut().find(|a| a.id == alert_id && a.active) {
            Some(rule) => {
                rule.active = false;
                rule.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertChannel, AlertCondition, ConditionKind};
    use crate::message::Role;
    use rust_decimal_macros::dec;

    async fn thread_with_message(store: &MemoryStore) -> (Thread, ThreadMessage) {
        let thread = store.create_thread("alice", "BTC").await.unwrap();
        let message = store
            .insert_message(NewMessage::user(thread.id, "alice", "hello"))
            .await
            .unwrap();
        (thread, message)
    }

    #[tokio::test]
    async fn test_recent_messages_are_bounded_and_chronological() {
        let store = MemoryStore::new();
        let thread = store.create_thread("alice", "t").await.unwrap();
        for i in 0..12 {
            store
                .insert_message(NewMessage::user(thread.id, "alice", format!("m{i}")))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(thread.id, 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[9].content, "m11");
    }

    #[tokio::test]
    async fn test_insert_into_missing_thread_fails() {
        let store = MemoryStore::new();
        let result = store
            .insert_message(NewMessage::assistant(Uuid::new_v4(), "alice", "x"))
            .await;
        assert!(matches!(result, Err(AssistantError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_toggle_reaction_twice_restores_state() {
        let store = MemoryStore::new();
        let (_, message) = thread_with_message(&store).await;

        let on = store.toggle_reaction(message.id, "alice", "🚀").await.unwrap();
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].emoji, "🚀");

        let off = store.toggle_reaction(message.id, "alice", "🚀").await.unwrap();
        assert!(off.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_reaction_requires_thread_owner() {
        let store = MemoryStore::new();
        let (_, message) = thread_with_message(&store).await;

        let result = store.toggle_reaction(message.id, "mallory", "👍").await;
        assert!(matches!(result, Err(AssistantError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_keep_one_reaction_per_triple() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let (_, message) = thread_with_message(&store).await;

        let message_id = message.id;
        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_reaction(message_id, "alice", "🔥").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Three toggles leave exactly one reaction
        let messages = store.list_messages(message.thread_id).await.unwrap();
        assert_eq!(messages[0].reactions.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_thread_cascades() {
        let store = MemoryStore::new();
        let (thread, message) = thread_with_message(&store).await;
        store.toggle_reaction(message.id, "alice", "👍").await.unwrap();

        assert!(!store.delete_thread(thread.id, "bob").await.unwrap());
        assert!(store.delete_thread(thread.id, "alice").await.unwrap());
        assert_eq!(store.message_count().await, 0);
        assert!(store.get_thread(thread.id, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivate_alert_reports_first_change_only() {
        let store = MemoryStore::new();
        let rule = store
            .create_alert(
                "alice",
                NewAlertRule {
                    coin: "btc".into(),
                    condition: AlertCondition::once(ConditionKind::PriceAbove),
                    threshold: dec!(45000),
                    channels: vec![AlertChannel::Chat],
                },
            )
            .await
            .unwrap();

        assert_eq!(store.list_active_alerts().await.unwrap().len(), 1);
        assert!(store.deactivate_alert(rule.id).await.unwrap());
        assert!(!store.deactivate_alert(rule.id).await.unwrap());
        assert!(store.list_active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let store = MemoryStore::new();
        assert!(store.get_settings("alice").await.unwrap().is_none());

        let update = SettingsUpdate {
            openai_model: Some("gpt-4o".into()),
            ..Default::default()
        };
        let settings = store.update_settings("alice", &update).await.unwrap();
        assert_eq!(settings.openai_model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.user_id, "alice");
    }

    #[tokio::test]
    async fn test_list_messages_roles() {
        let store = MemoryStore::new();
        let (thread, _) = thread_with_message(&store).await;
        store
            .insert_message(NewMessage::assistant(thread.id, "alice", "hi"))
            .await
            .unwrap();

        let roles: Vec<Role> = store
            .list_messages(thread.id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }
}
