//! Notification Channels
//!
//! A triggered alert fans out to every channel listed on its rule. Each
//! delivery runs independently; a failing channel never blocks the others.

mod chat;
mod email;
mod telegram;

pub use chat::ChatChannel;
pub use email::{EmailChannel, EmailConfig};
pub use telegram::TelegramChannel;

use std::collections::HashMap;
use std::sync::Arc;

use assistant_core::{ActiveAlert, AlertChannel};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;

use crate::error::{AlertError, Result};
use crate::model::AlertNotification;

/// Result of a single delivery attempt that did not error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The recipient lacks what this channel needs (no email, no bot token)
    Skipped(String),
}

/// A transport for alert notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> AlertChannel;

    async fn send(&self, alert: &ActiveAlert, notification: &AlertNotification) -> Result<Delivery>;
}

/// Per-channel outcome of one dispatch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: Vec<AlertChannel>,
    pub skipped: Vec<(AlertChannel, String)>,
    pub failed: Vec<(AlertChannel, String)>,
}

/// Registry of configured channels
#[derive(Clone, Default)]
pub struct Notifier {
    channels: HashMap<AlertChannel, Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any previous one of the same kind
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn is_configured(&self, kind: AlertChannel) -> bool {
        self.channels.contains_key(&kind)
    }

    /// Deliver to every channel on the notification, concurrently
    pub async fn dispatch(
        &self,
        alert: &ActiveAlert,
        notification: &AlertNotification,
    ) -> DispatchReport {
        let deliveries = notification.channels.iter().map(|&kind| async move {
            let outcome = match self.channels.get(&kind) {
                Some(channel) => channel.send(alert, notification).await,
                None => Err(AlertError::ChannelNotConfigured(kind)),
            };
            (kind, outcome)
        });

        let mut report = DispatchReport::default();
        for (kind, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(Delivery::Sent) => {
                    tracing::info!(
                        rule_id = %notification.rule_id,
                        channel = %kind,
                        "Alert delivered"
                    );
                    report.sent.push(kind);
                }
                Ok(Delivery::Skipped(reason)) => {
                    tracing::debug!(
                        rule_id = %notification.rule_id,
                        channel = %kind,
                        %reason,
                        "Alert delivery skipped"
                    );
                    report.skipped.push((kind, reason));
                }
                Err(e) => {
                    tracing::warn!(
                        rule_id = %notification.rule_id,
                        channel = %kind,
                        error = %e,
                        "Alert delivery failed"
                    );
                    report.failed.push((kind, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every notification it is asked to deliver
    pub struct RecordingChannel {
        kind: AlertChannel,
        fail: bool,
        pub delivered: Mutex<Vec<AlertNotification>>,
    }

    impl RecordingChannel {
        pub fn new(kind: AlertChannel) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: false,
                delivered: Mutex::new(Vec::new()),
            })
        }

        pub fn failing(kind: AlertChannel) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: true,
                delivered: Mutex::new(Vec::new()),
            })
        }

        pub fn count(&self) -> usize {
            self.delivered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> AlertChannel {
            self.kind
        }

        async fn send(
            &self,
            _alert: &ActiveAlert,
            notification: &AlertNotification,
        ) -> Result<Delivery> {
            if self.fail {
                return Err(AlertError::Delivery {
                    channel: self.kind,
                    message: "transport down".into(),
                });
            }
            self.delivered.lock().unwrap().push(notification.clone());
            Ok(Delivery::Sent)
        }
    }
}
