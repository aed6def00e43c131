//! Domain Models
//!
//! Market indicators and alert notifications.
//! Uses `rust_decimal` for all prices and indicator values - never use f64 for money!

use assistant_core::{AlertChannel, AlertRule};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current technical indicators for one asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    /// Ticker symbol (e.g., "BTC")
    pub symbol: String,

    /// Last close in USD
    pub price: Decimal,

    /// Relative Strength Index (0-100)
    pub rsi: Decimal,

    /// 20-period Exponential Moving Average
    pub ema: Decimal,

    pub fetched_at: DateTime<Utc>,
}

impl Indicators {
    pub fn new(symbol: impl Into<String>, price: Decimal, rsi: Decimal, ema: Decimal) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            price,
            rsi,
            ema,
            fetched_at: Utc::now(),
        }
    }
}

/// Close and RSI history, oldest first
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub closes: Vec<Decimal>,
    pub rsi: Vec<Decimal>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.closes.len().min(self.rsi.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    /// Price falling while RSI rises
    Bullish,
    /// Price rising while RSI falls
    Bearish,
}

/// Outcome of comparing price and RSI direction over the lookback window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// `None` when both move the same way
    pub kind: Option<DivergenceKind>,
    /// Latest close
    pub price: Decimal,
    /// Latest RSI
    pub rsi: Decimal,
}

impl Divergence {
    pub fn is_present(&self) -> bool {
        self.kind.is_some()
    }
}

/// Everything a condition can be evaluated against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub indicators: Indicators,
    /// Only fetched for divergence conditions
    pub divergence: Option<Divergence>,
}

impl From<Indicators> for MarketSnapshot {
    fn from(indicators: Indicators) -> Self {
        Self {
            indicators,
            divergence: None,
        }
    }
}

/// A triggered alert, ready for delivery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub rule_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub channels: Vec<AlertChannel>,
}

impl AlertNotification {
    pub fn for_rule(rule: &AlertRule, snapshot: &MarketSnapshot) -> Self {
        let ind = &snapshot.indicators;
        let mut message = format!(
            "{coin} has met the condition: {cond} (threshold: {threshold})\n\
             Current values:\n\
             - Price: ${price:.2}\n\
             - RSI: {rsi:.2}\n\
             - EMA: {ema:.2}",
            coin = rule.coin,
            cond = rule.condition,
            threshold = rule.threshold,
            price = ind.price,
            rsi = ind.rsi,
            ema = ind.ema,
        );
        if let Some(kind) = snapshot.divergence.as_ref().and_then(|d| d.kind) {
            let label = match kind {
                DivergenceKind::Bullish => "bullish",
                DivergenceKind::Bearish => "bearish",
            };
            message.push_str(&format!("\n- Divergence: {label}"));
        }

        Self {
            rule_id: rule.id,
            user_id: rule.user_id.clone(),
            title: format!("Alert Triggered: {}", rule.coin),
            message,
            channels: rule.channels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::{AlertCondition, ConditionKind, NewAlertRule};
    use rust_decimal_macros::dec;

    #[test]
    fn test_notification_format() {
        let rule = NewAlertRule {
            coin: "BTC".into(),
            condition: AlertCondition::recurring(ConditionKind::PriceAbove),
            threshold: dec!(45000),
            channels: vec![AlertChannel::Chat],
        }
        .into_rule("u1");
        let indicators = Indicators::new("BTC", dec!(46000), dec!(61.234), dec!(45500.5));
        let snapshot = MarketSnapshot::from(indicators);

        let n = AlertNotification::for_rule(&rule, &snapshot);
        assert_eq!(n.title, "Alert Triggered: BTC");
        assert_eq!(
            n.message,
            "BTC has met the condition: price_above (threshold: 45000)\n\
             Current values:\n\
             - Price: $46000.00\n\
             - RSI: 61.23\n\
             - EMA: 45500.50"
        );
    }
}
