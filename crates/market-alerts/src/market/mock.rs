//! Mock Market Data
//!
//! For testing and demo purposes. Returns realistic static indicators.

use std::collections::HashMap;
use std::sync::Arc;

use assistant_core::UserSettings;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{MarketDataClient, MarketDataSource};
use crate::error::{AlertError, Result};
use crate::model::{IndicatorSeries, Indicators};

/// Static indicator table, with per-symbol overrides
#[derive(Clone, Debug, Default)]
pub struct MockMarketData {
    overrides: HashMap<String, Indicators>,
    history: HashMap<String, IndicatorSeries>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the indicators returned for a symbol
    pub fn with_indicators(mut self, indicators: Indicators) -> Self {
        self.overrides.insert(indicators.symbol.clone(), indicators);
        self
    }

    /// Pin the history returned for a symbol
    pub fn with_history(mut self, symbol: &str, series: IndicatorSeries) -> Self {
        self.history.insert(symbol.to_uppercase(), series);
        self
    }

    /// (price, rsi)
    fn base(symbol: &str) -> Option<(Decimal, Decimal)> {
        match symbol {
            "BTC" => Some((dec!(97500), dec!(58.4))),
            "ETH" => Some((dec!(3450), dec!(52.1))),
            "SOL" => Some((dec!(195), dec!(63.7))),
            "ADA" => Some((dec!(0.95), dec!(44.9))),
            "DOT" => Some((dec!(7.20), dec!(47.3))),
            "LINK" => Some((dec!(24.50), dec!(55.0))),
            "AVAX" => Some((dec!(42.00), dec!(61.2))),
            "XRP" => Some((dec!(2.35), dec!(49.8))),
            "DOGE" => Some((dec!(0.38), dec!(71.5))),
            "LTC" => Some((dec!(105), dec!(50.6))),
            _ => None,
        }
    }
}

#[async_trait]
impl MarketDataClient for MockMarketData {
    async fn indicators(&self, symbol: &str) -> Result<Indicators> {
        let symbol = symbol.to_uppercase();
        if let Some(pinned) = self.overrides.get(&symbol) {
            return Ok(pinned.clone());
        }

        let (price, rsi) = Self::base(&symbol)
            .ok_or_else(|| AlertError::UnsupportedAsset(symbol.clone()))?;
        // EMA trails price by 2%
        let ema = (price * dec!(0.98)).round_dp(8);
        Ok(Indicators::new(symbol, price, rsi, ema))
    }

    async fn history(&self, symbol: &str, periods: usize) -> Result<IndicatorSeries> {
        let symbol = symbol.to_uppercase();
        if let Some(series) = self.history.get(&symbol) {
            return Ok(series.clone());
        }

        // Flat history: no divergence
        let current = self.indicators(&symbol).await?;
        Ok(IndicatorSeries {
            closes: vec![current.price; periods],
            rsi: vec![current.rsi; periods],
        })
    }

    fn name(&self) -> &str {
        "MockMarketData"
    }
}

impl MarketDataSource for MockMarketData {
    fn client_for(&self, _settings: Option<&UserSettings>) -> Result<Arc<dyn MarketDataClient>> {
        Ok(Arc::new(self.clone()))
    }
}
