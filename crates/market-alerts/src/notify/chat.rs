//! In-app chat channel
//!
//! Posts the alert as an assistant message into the user's "Price Alerts"
//! thread, creating the thread on first use.

use std::sync::Arc;

use assistant_core::{
    model::ALERTS_THREAD_TITLE, ActiveAlert, AlertChannel, ChatStore, MessageCategory, NewMessage,
};
use async_trait::async_trait;

use super::{Delivery, NotificationChannel};
use crate::error::Result;
use crate::model::AlertNotification;

pub struct ChatChannel {
    store: Arc<dyn ChatStore>,
}

impl ChatChannel {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn kind(&self) -> AlertChannel {
        AlertChannel::Chat
    }

    async fn send(
        &self,
        alert: &ActiveAlert,
        notification: &AlertNotification,
    ) -> Result<Delivery> {
        let user_id = alert.user.id.as_str();
        let thread = match self.store.find_thread_by_title(user_id, ALERTS_THREAD_TITLE).await? {
            Some(thread) => thread,
            None => self.store.create_thread(user_id, ALERTS_THREAD_TITLE).await?,
        };

        let content = format!("🚨 {}\n\n{}", notification.title, notification.message);
        self.store
            .insert_message(
                NewMessage::assistant(thread.id, user_id, content)
                    .with_category(MessageCategory::Alert),
            )
            .await?;
        self.store.touch_thread(thread.id).await?;
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::{AlertCondition, ConditionKind, MemoryStore, NewAlertRule, Role, User};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_alerts_share_one_thread() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChatChannel::new(store.clone());

        let rule = NewAlertRule {
            coin: "BTC".into(),
            condition: AlertCondition::recurring(ConditionKind::PriceAbove),
            threshold: dec!(45000),
            channels: vec![AlertChannel::Chat],
        }
        .into_rule("u1");
        let active = ActiveAlert {
            rule,
            user: User::new("u1"),
            settings: None,
        };
        let notification = AlertNotification {
            rule_id: active.rule.id,
            user_id: "u1".into(),
            title: "Alert Triggered: BTC".into(),
            message: "BTC has met the condition".into(),
            channels: vec![AlertChannel::Chat],
        };

        channel.send(&active, &notification).await.unwrap();
        channel.send(&active, &notification).await.unwrap();

        let threads = store.list_threads("u1").await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].title, ALERTS_THREAD_TITLE);

        let messages = store.list_messages(threads[0].id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].category, MessageCategory::Alert);
        assert!(messages[0].content.starts_with("🚨 Alert Triggered: BTC"));
    }
}
