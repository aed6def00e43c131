//! # market-alerts
//!
//! Scheduled evaluation of user-defined price and indicator alerts.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────┐   ┌──────────────────────┐
//! │ AlertStore   │──▶│ MarketDataSource │──▶│  evaluate  │──▶│ Notifier             │
//! │ active rules │   │ price / RSI / EMA│   │ (pure)     │   │ email·telegram·chat  │
//! └──────────────┘   └──────────────────┘   └────────────┘   └──────────────────────┘
//! ```
//!
//! Every rule is evaluated on its own: a failing market-data fetch or
//! channel only affects that rule or that delivery.

pub mod error;
pub mod evaluate;
pub mod manager;
pub mod market;
pub mod model;
pub mod notify;

pub use error::{AlertError, Result};
pub use evaluate::{detect_divergence, evaluate_condition, DIVERGENCE_LOOKBACK};
pub use manager::{AlertManager, CheckSummary};
pub use market::{MarketDataClient, MarketDataSource, MockMarketData, TradingViewSource};
pub use model::{
    AlertNotification, Divergence, DivergenceKind, IndicatorSeries, Indicators, MarketSnapshot,
};
pub use notify::{
    ChatChannel, Delivery, DispatchReport, EmailChannel, EmailConfig, NotificationChannel, Notifier,
    TelegramChannel,
};
