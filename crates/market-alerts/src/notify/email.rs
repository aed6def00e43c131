//! Email channel
//!
//! Sends plain-text alerts over SMTP.

use assistant_core::{ActiveAlert, AlertChannel};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Delivery, NotificationChannel};
use crate::error::{AlertError, Result};
use crate::model::AlertNotification;

/// SMTP settings
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Implicit TLS when `true`, STARTTLS otherwise
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address
    pub from: String,
}

impl EmailConfig {
    /// `None` unless `SMTP_HOST` and `SMTP_FROM` are both set
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let smtp_host = var("SMTP_HOST")?;
        let from = var("SMTP_FROM")?;
        let smtp_port = var("SMTP_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let secure = var("SMTP_SECURE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Some(Self {
            smtp_host,
            smtp_port,
            secure,
            username: var("SMTP_USER"),
            password: var("SMTP_PASS"),
            from,
        })
    }
}

fn delivery_error(message: impl std::fmt::Display) -> AlertError {
    AlertError::Delivery {
        channel: AlertChannel::Email,
        message: message.to_string(),
    }
}

/// Email notification channel
pub struct EmailChannel {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    /// Build the transport once; the connection is opened per send
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AlertError::Config(format!("Invalid SMTP_FROM '{}': {e}", config.from)))?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| AlertError::Config(format!("Invalid SMTP host '{}': {e}", config.smtp_host)))?
        .port(config.smtp_port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }

    fn build_message(&self, to: &str, notification: &AlertNotification) -> Result<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| delivery_error(format!("invalid recipient '{to}': {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&notification.title)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.message.clone())
            .map_err(delivery_error)
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> AlertChannel {
        AlertChannel::Email
    }

    async fn send(
        &self,
        alert: &ActiveAlert,
        notification: &AlertNotification,
    ) -> Result<Delivery> {
        let Some(to) = alert.user.email.as_deref() else {
            return Ok(Delivery::Skipped("user has no email address".into()));
        };

        let message = self.build_message(to, notification)?;
        self.mailer.send(message).await.map_err(delivery_error)?;
        tracing::debug!(rule_id = %notification.rule_id, "Alert email sent");
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::{AlertCondition, ConditionKind, NewAlertRule, User};
    use rust_decimal_macros::dec;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            secure: false,
            username: None,
            password: None,
            from: "Trading Assistant <alerts@example.com>".into(),
        }
    }

    fn notification() -> AlertNotification {
        AlertNotification {
            rule_id: uuid::Uuid::new_v4(),
            user_id: "u1".into(),
            title: "Alert Triggered: BTC".into(),
            message: "BTC has met the condition".into(),
            channels: vec![AlertChannel::Email],
        }
    }

    #[test]
    fn test_invalid_sender_is_config_error() {
        let mut cfg = config();
        cfg.from = "not an address".into();
        assert!(matches!(EmailChannel::new(&cfg), Err(AlertError::Config(_))));
    }

    #[test]
    fn test_message_subject_and_body() {
        let channel = EmailChannel::new(&config()).unwrap();
        let msg = channel.build_message("trader@example.com", &notification()).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();

        assert!(raw.contains("Subject: Alert Triggered: BTC"));
        assert!(raw.contains("BTC has met the condition"));
    }

    #[tokio::test]
    async fn test_user_without_email_is_skipped() {
        let channel = EmailChannel::new(&config()).unwrap();
        let rule = NewAlertRule {
            coin: "BTC".into(),
            condition: AlertCondition::recurring(ConditionKind::PriceAbove),
            threshold: dec!(45000),
            channels: vec![AlertChannel::Email],
        }
        .into_rule("u1");
        let active = ActiveAlert {
            rule,
            user: User::new("u1"),
            settings: None,
        };

        let outcome = channel.send(&active, &notification()).await.unwrap();
        assert!(matches!(outcome, Delivery::Skipped(_)));
    }
}
