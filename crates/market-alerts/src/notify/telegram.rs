//! Telegram channel
//!
//! Each user brings their own bot token and chat id.

use assistant_core::{ActiveAlert, AlertChannel};
use async_trait::async_trait;
use teloxide::{prelude::Requester, types::ChatId, Bot};

use super::{Delivery, NotificationChannel};
use crate::error::{AlertError, Result};
use crate::model::AlertNotification;

/// Telegram notification channel
#[derive(Clone, Debug, Default)]
pub struct TelegramChannel;

impl TelegramChannel {
    pub fn new() -> Self {
        Self
    }

    fn format(notification: &AlertNotification) -> String {
        format!("{}\n\n{}", notification.title, notification.message)
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn kind(&self) -> AlertChannel {
        AlertChannel::Telegram
    }

    async fn send(
        &self,
        alert: &ActiveAlert,
        notification: &AlertNotification,
    ) -> Result<Delivery> {
        let settings = alert.settings.as_ref();
        let Some(token) = settings.and_then(|s| s.telegram_bot_token.as_deref()) else {
            return Ok(Delivery::Skipped("no Telegram bot token".into()));
        };
        let Some(chat_id) = settings.and_then(|s| s.telegram_chat_id) else {
            return Ok(Delivery::Skipped("no Telegram chat id".into()));
        };

        Bot::new(token)
            .send_message(ChatId(chat_id), Self::format(notification))
            .await
            .map_err(|e| AlertError::Delivery {
                channel: AlertChannel::Telegram,
                message: e.to_string(),
            })?;
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::{AlertCondition, ConditionKind, NewAlertRule, User, UserSettings};
    use rust_decimal_macros::dec;

    fn active(settings: Option<UserSettings>) -> ActiveAlert {
        let rule = NewAlertRule {
            coin: "ETH".into(),
            condition: AlertCondition::recurring(ConditionKind::RsiBelow),
            threshold: dec!(30),
            channels: vec![AlertChannel::Telegram],
        }
        .into_rule("u1");
        ActiveAlert {
            rule,
            user: User::new("u1"),
            settings,
        }
    }

    fn notification() -> AlertNotification {
        AlertNotification {
            rule_id: uuid::Uuid::new_v4(),
            user_id: "u1".into(),
            title: "Alert Triggered: ETH".into(),
            message: "ETH has met the condition".into(),
            channels: vec![AlertChannel::Telegram],
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_skipped() {
        let outcome = TelegramChannel::new().send(&active(None), &notification()).await.unwrap();
        assert!(matches!(outcome, Delivery::Skipped(_)));
    }

    #[tokio::test]
    async fn test_missing_chat_id_is_skipped() {
        let mut settings = UserSettings::new("u1");
        settings.telegram_bot_token = Some("123:abc".into());

        let outcome = TelegramChannel::new()
            .send(&active(Some(settings)), &notification())
            .await
            .unwrap();
        assert_eq!(outcome, Delivery::Skipped("no Telegram chat id".into()));
    }

    #[test]
    fn test_message_format() {
        assert_eq!(
            TelegramChannel::format(&notification()),
            "Alert Triggered: ETH\n\nETH has met the condition"
        );
    }
}
