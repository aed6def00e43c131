//! TradingView scanner client
//!
//! Reads `close`, `RSI` and `EMA20` columns from the crypto scanner, using
//! the rule owner's TradingView API key.

use std::sync::Arc;
use std::time::Duration;

use assistant_core::UserSettings;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MarketDataClient, MarketDataSource};
use crate::error::{AlertError, Result};
use crate::model::{IndicatorSeries, Indicators};

const SCANNER_URL: &str = "https://scanner.tradingview.com/crypto/scan";
const SYMBOL_PREFIX: &str = "CRYPTO:";

#[derive(Serialize)]
struct ScanRequest<'a> {
    symbols: ScanSymbols,
    columns: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<[i64; 2]>,
}

#[derive(Serialize)]
struct ScanSymbols {
    tickers: Vec<String>,
}

#[derive(Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Deserialize)]
struct ScanRow {
    #[serde(default)]
    s: String,
    d: Vec<Value>,
}

fn column(row: &ScanRow, idx: usize, name: &str) -> Result<Decimal> {
    let value = row
        .d
        .get(idx)
        .ok_or_else(|| AlertError::MarketData(format!("missing {name} column")))?;

    let parsed = match value {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        Value::String(s) => s.parse::<Decimal>().ok(),
        _ => None,
    };
    parsed
        .map(|d| d.round_dp(8))
        .ok_or_else(|| AlertError::MarketData(format!("invalid {name} value: {value}")))
}

/// Builds a scanner client per user
#[derive(Clone)]
pub struct TradingViewSource {
    http: reqwest::Client,
    base_url: String,
}

impl TradingViewSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, SCANNER_URL)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl MarketDataSource for TradingViewSource {
    fn client_for(&self, settings: Option<&UserSettings>) -> Result<Arc<dyn MarketDataClient>> {
        let api_key = settings
            .and_then(|s| s.trading_view_api_key.clone())
            .ok_or_else(|| AlertError::Config("TradingView API key not found".into()))?;

        Ok(Arc::new(TradingViewClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key,
        }))
    }
}

/// Scanner client bound to one API key
pub struct TradingViewClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TradingViewClient {
    async fn scan(
        &self,
        symbol: &str,
        columns: &[&str],
        range: Option<[i64; 2]>,
    ) -> Result<Vec<ScanRow>> {
        let request = ScanRequest {
            symbols: ScanSymbols {
                tickers: vec![format!("{SYMBOL_PREFIX}{}", symbol.to_uppercase())],
            },
            columns,
            range,
        };

        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AlertError::Unavailable(format!("{symbol}: {e}"))
                } else {
                    AlertError::Network(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AlertError::Config("TradingView API key rejected".into()));
        }
        if status.is_server_error() {
            return Err(AlertError::Unavailable(format!("{symbol}: HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::MarketData(format!("TradingView error ({status}): {body}")));
        }

        let body: ScanResponse = response.json().await?;
        if body.data.is_empty() {
            return Err(AlertError::UnsupportedAsset(symbol.to_uppercase()));
        }
        Ok(body.data)
    }
}

#[async_trait]
impl MarketDataClient for TradingViewClient {
    async fn indicators(&self, symbol: &str) -> Result<Indicators> {
        let rows = self.scan(symbol, &["close", "RSI", "EMA20"], None).await?;
        let row = &rows[0];

        let symbol = match row.s.strip_prefix(SYMBOL_PREFIX) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => symbol.to_uppercase(),
        };
        Ok(Indicators::new(
            symbol,
            column(row, 0, "close")?,
            column(row, 1, "RSI")?,
            column(row, 2, "EMA20")?,
        ))
    }

    async fn history(&self, symbol: &str, periods: usize) -> Result<IndicatorSeries> {
        let periods = i64::try_from(periods).unwrap_or(i64::MAX);
        let rows = self.scan(symbol, &["close", "RSI"], Some([-periods, 0])).await?;

        let mut series = IndicatorSeries::default();
        for row in &rows {
            series.closes.push(column(row, 0, "close")?);
            series.rsi.push(column(row, 1, "RSI")?);
        }
        Ok(series)
    }

    fn name(&self) -> &str {
        "TradingView"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings_with_key() -> UserSettings {
        let mut settings = UserSettings::new("u1");
        settings.trading_view_api_key = Some("tv-key".into());
        settings
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let source = TradingViewSource::new(reqwest::Client::new());
        let result = source.client_for(Some(&UserSettings::new("u1")));
        assert!(matches!(result, Err(AlertError::Config(_))));
        assert!(matches!(source.client_for(None), Err(AlertError::Config(_))));
    }

    #[tokio::test]
    async fn test_indicators_parsed_from_scan() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer tv-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"totalCount":1,"data":[{"s":"CRYPTO:BTC","d":[46000.5,61.25,45800]}]}"#)
            .expect(1)
            .create_async()
            .await;

        let source = TradingViewSource::with_base_url(reqwest::Client::new(), server.url());
        let client = source.client_for(Some(&settings_with_key())).unwrap();
        let ind = client.indicators("btc").await.unwrap();

        assert_eq!(ind.symbol, "BTC");
        assert_eq!(ind.price, dec!(46000.5));
        assert_eq!(ind.rsi, dec!(61.25));
        assert_eq!(ind.ema, dec!(45800));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_history_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                r#"{"data":[{"s":"CRYPTO:ETH","d":[3400,40]},{"s":"CRYPTO:ETH","d":[3500,38]}]}"#,
            )
            .create_async()
            .await;

        let source = TradingViewSource::with_base_url(reqwest::Client::new(), server.url());
        let client = source.client_for(Some(&settings_with_key())).unwrap();
        let series = client.history("ETH", 14).await.unwrap();

        assert_eq!(series.closes, vec![dec!(3400), dec!(3500)]);
        assert_eq!(series.rsi, vec![dec!(40), dec!(38)]);
    }

    #[tokio::test]
    async fn test_empty_scan_is_unsupported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let source = TradingViewSource::with_base_url(reqwest::Client::new(), server.url());
        let client = source.client_for(Some(&settings_with_key())).unwrap();
        let result = client.indicators("NOTREAL").await;
        assert!(matches!(result, Err(AlertError::UnsupportedAsset(_))));
    }
}
