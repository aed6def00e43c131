//! Alert Rules
//!
//! User-defined triggers evaluated by the alert pipeline. A condition is a
//! kind plus an optional one-shot marker, stored as a single string such as
//! `price_above` or `price_above_once`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssistantError;
use crate::model::{User, UserSettings};

const ONCE_SUFFIX: &str = "_once";

/// What an alert rule compares against its threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    PriceAbove,
    PriceBelow,
    RsiAbove,
    RsiBelow,
    /// Price within `threshold` of the EMA
    PriceCrossesEma,
    /// Price and RSI moving in opposite directions over the lookback window
    RsiDivergence,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::PriceAbove => "price_above",
            ConditionKind::PriceBelow => "price_below",
            ConditionKind::RsiAbove => "rsi_above",
            ConditionKind::RsiBelow => "rsi_below",
            ConditionKind::PriceCrossesEma => "price_crosses_ema",
            ConditionKind::RsiDivergence => "rsi_divergence",
        }
    }

    /// Whether the threshold is an RSI value (bounded to 0..=100)
    pub fn is_rsi_threshold(&self) -> bool {
        matches!(self, ConditionKind::RsiAbove | ConditionKind::RsiBelow)
    }
}

impl std::str::FromStr for ConditionKind {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_above" => Ok(ConditionKind::PriceAbove),
            "price_below" => Ok(ConditionKind::PriceBelow),
            "rsi_above" => Ok(ConditionKind::RsiAbove),
            "rsi_below" => Ok(ConditionKind::RsiBelow),
            "price_crosses_ema" => Ok(ConditionKind::PriceCrossesEma),
            "rsi_divergence" => Ok(ConditionKind::RsiDivergence),
            other => Err(AssistantError::Validation(format!("Unknown alert condition '{other}'"))),
        }
    }
}

/// Condition kind plus the one-shot marker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlertCondition {
    pub kind: ConditionKind,
    /// Deactivate the rule after it first fires
    pub once: bool,
}

impl AlertCondition {
    pub fn recurring(kind: ConditionKind) -> Self {
        Self { kind, once: false }
    }

    pub fn once(kind: ConditionKind) -> Self {
        Self { kind, once: true }
    }
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind.as_str())?;
        if self.once {
            f.write_str(ONCE_SUFFIX)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AlertCondition {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.strip_suffix(ONCE_SUFFIX) {
            Some(kind) => Ok(Self::once(kind.parse()?)),
            None => Ok(Self::recurring(s.parse()?)),
        }
    }
}

impl TryFrom<String> for AlertCondition {
    type Error = AssistantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlertCondition> for String {
    fn from(value: AlertCondition) -> Self {
        value.to_string()
    }
}

/// Where a triggered alert is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Email,
    Telegram,
    /// In-app chat message
    Chat,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Email => "email",
            AlertChannel::Telegram => "telegram",
            AlertChannel::Chat => "chat",
        }
    }
}

impl std::fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertChannel {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(AlertChannel::Email),
            "telegram" => Ok(AlertChannel::Telegram),
            "chat" => Ok(AlertChannel::Chat),
            other => Err(AssistantError::Validation(format!("Unknown alert channel '{other}'"))),
        }
    }
}

/// A persisted alert rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub user_id: String,
    /// Target asset symbol (e.g. "BTC")
    pub coin: String,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub channels: Vec<AlertChannel>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload for an alert rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub coin: String,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub channels: Vec<AlertChannel>,
}

impl NewAlertRule {
    /// Check the payload and normalize the symbol and channel list
    pub fn validate(mut self) -> Result<Self, AssistantError> {
        self.coin = self.coin.trim().to_uppercase();
        if self.coin.is_empty() {
            return Err(AssistantError::Validation("Alert coin symbol is required".into()));
        }
        if self.channels.is_empty() {
            return Err(AssistantError::Validation(
                "At least one notification channel is required".into(),
            ));
        }
        if self.threshold.is_sign_negative() {
            return Err(AssistantError::Validation("Threshold must not be negative".into()));
        }
        if self.condition.kind.is_rsi_threshold() && self.threshold > Decimal::ONE_HUNDRED {
            return Err(AssistantError::Validation(
                "RSI threshold must be between 0 and 100".into(),
            ));
        }

        self.channels.sort();
        self.channels.dedup();
        Ok(self)
    }

    pub fn into_rule(self, user_id: impl Into<String>) -> AlertRule {
        let now = Utc::now();
        AlertRule {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            coin: self.coin,
            condition: self.condition,
            threshold: self.threshold,
            channels: self.channels,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An active rule together with its owner, as loaded for one alert pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveAlert {
    pub rule: AlertRule,
    pub user: User,
    pub settings: Option<UserSettings>,
}
