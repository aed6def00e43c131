//! Error Types for Market Alerts

use assistant_core::{AlertChannel, AssistantError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Market data unavailable for {0}")]
    Unavailable(String),

    #[error("Asset not supported: {0}")]
    UnsupportedAsset(String),

    /// Required market-data credential missing from the rule owner's settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel not configured: {0}")]
    ChannelNotConfigured(AlertChannel),

    #[error("Delivery via {channel} failed: {message}")]
    Delivery {
        channel: AlertChannel,
        message: String,
    },

    #[error("Storage error: {0}")]
    Store(#[from] AssistantError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AlertError {
    /// Worth retrying on the next pass
    pub fn is_retryable(&self) -> bool {
        match self {
            AlertError::Unavailable(_) | AlertError::Delivery { .. } => true,
            AlertError::Network(e) => e.is_timeout() || e.is_connect(),
            AlertError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AlertError::Config(msg) => format!("{msg}. Please check your settings."),
            AlertError::UnsupportedAsset(symbol) => format!("{symbol} is not a supported asset."),
            AlertError::ChannelNotConfigured(channel) => {
                format!("The {channel} notification channel is not configured on this server.")
            }
            AlertError::Unavailable(_) | AlertError::Network(_) => {
                "The market data service is currently unreachable. Please try again.".into()
            }
            _ => "An error occurred while checking your alerts.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(AlertError::Unavailable("BTC".into()).is_retryable());
        assert!(!AlertError::Config("TradingView API key not found".into()).is_retryable());
    }

    #[test]
    fn test_channel_message_names_channel() {
        let msg = AlertError::ChannelNotConfigured(AlertChannel::Email).user_message();
        assert!(msg.contains("email"));
    }
}
