//! Server configuration
//!
//! Read once from the environment at startup.

use std::time::Duration;

/// Where alert indicators come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketDataProvider {
    TradingView,
    /// Static table, for demos and local development
    Mock,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Postgres store when set, in-memory store otherwise
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub alert_check_interval: Duration,
    pub market_data: MarketDataProvider,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            database_url: None,
            database_max_connections: 10,
            alert_check_interval: Duration::from_secs(60),
            market_data: MarketDataProvider::TradingView,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let provider = var("MARKET_DATA_PROVIDER").map(|p| p.to_lowercase());
        let market_data = match provider.as_deref() {
            None | Some("tradingview") => MarketDataProvider::TradingView,
            Some("mock") => MarketDataProvider::Mock,
            Some(other) => anyhow::bail!(
                "Unknown MARKET_DATA_PROVIDER '{other}' (expected tradingview or mock)"
            ),
        };

        let alert_check_interval = match var("ALERT_CHECK_INTERVAL_SECS") {
            Some(secs) => {
                let secs: u64 = secs.parse().map_err(|e| {
                    anyhow::anyhow!("Invalid ALERT_CHECK_INTERVAL_SECS '{secs}': {e}")
                })?;
                anyhow::ensure!(secs > 0, "ALERT_CHECK_INTERVAL_SECS must be positive");
                Duration::from_secs(secs)
            }
            None => defaults.alert_check_interval,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            alert_check_interval,
            market_data,
        })
    }
}
