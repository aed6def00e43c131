//! Market Data Integration
//!
//! Abstractions and implementations for technical-indicator providers.

mod mock;
mod tradingview;

pub use mock::MockMarketData;
pub use tradingview::{TradingViewClient, TradingViewSource};

use std::sync::Arc;

use assistant_core::{ConditionKind, UserSettings};
use async_trait::async_trait;

use crate::error::Result;
use crate::evaluate::{detect_divergence, DIVERGENCE_LOOKBACK};
use crate::model::{IndicatorSeries, Indicators, MarketSnapshot};

/// Market data client trait (Strategy pattern)
///
/// Implement this for each indicator provider.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Current price, RSI and EMA for a symbol
    async fn indicators(&self, symbol: &str) -> Result<Indicators>;

    /// Close and RSI for the last `periods` periods, oldest first
    async fn history(&self, symbol: &str, periods: usize) -> Result<IndicatorSeries>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Hands out clients scoped to a rule owner's credentials
pub trait MarketDataSource: Send + Sync {
    fn client_for(&self, settings: Option<&UserSettings>) -> Result<Arc<dyn MarketDataClient>>;
}

/// Fetch what `kind` needs to be evaluated
pub async fn fetch_snapshot(
    client: &dyn MarketDataClient,
    symbol: &str,
    kind: ConditionKind,
) -> Result<MarketSnapshot> {
    let indicators = client.indicators(symbol).await?;
    let divergence = match kind {
        ConditionKind::RsiDivergence => {
            let series = client.history(symbol, DIVERGENCE_LOOKBACK).await?;
            Some(detect_divergence(&series)?)
        }
        _ => None,
    };

    Ok(MarketSnapshot {
        indicators,
        divergence,
    })
}
