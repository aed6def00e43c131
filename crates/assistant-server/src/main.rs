//! Trading Assistant HTTP Server
//!
//! Axum-based REST API for threaded AI chat, user settings and market
//! alerts, plus the background scheduler that evaluates alert rules.

mod app;
mod auth;
mod config;
mod error;
mod handlers;
mod scheduler;
mod state;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::{
    AccountStore, AiServiceFactory, AlertStore, ChatStore, MemoryStore, UserSettings,
};
use assistant_runtime::ProviderFactory;
use market_alerts::{
    AlertManager, ChatChannel, EmailChannel, EmailConfig, MarketDataSource, MockMarketData,
    Notifier, TelegramChannel, TradingViewSource,
};

use crate::config::{MarketDataProvider, ServerConfig};
use crate::scheduler::JobScheduler;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    #[cfg(feature = "postgres")]
    if let Some(url) = config.database_url.as_deref() {
        let store =
            assistant_core::PgStore::connect(url, config.database_max_connections).await?;
        let store = Arc::new(store);
        tracing::info!("✓ Connected to Postgres, migrations applied");
        return serve(config, store, "postgres").await;
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        tracing::warn!("⚠ DATABASE_URL is set but this build has no Postgres support");
    }

    tracing::warn!("⚠ Using in-memory store - data is lost on restart");
    serve(config, Arc::new(MemoryStore::new()), "memory").await
}

async fn serve<S>(
    config: ServerConfig,
    store: Arc<S>,
    store_kind: &'static str,
) -> anyhow::Result<()>
where
    S: ChatStore + AccountStore + AlertStore + 'static,
{
    let ai = Arc::new(ProviderFactory::from_env()?);

    // Verify the server-wide key, if any
    match ai.build(&UserSettings::default()) {
        Ok(service) => match service.health_check().await {
            Ok(true) => {
                tracing::info!(model = service.model(), "✓ Connected to {}", service.name());
            }
            _ => tracing::warn!("⚠ {} is not reachable with the server key", service.name()),
        },
        Err(_) => tracing::warn!("⚠ OPENAI_API_KEY not set - users must bring their own key"),
    }

    // Notification channels
    let mut notifier = Notifier::new()
        .with_channel(Arc::new(ChatChannel::new(store.clone())))
        .with_channel(Arc::new(TelegramChannel::new()));
    match EmailConfig::from_env() {
        Some(email) => {
            notifier = notifier.with_channel(Arc::new(EmailChannel::new(&email)?));
            tracing::info!(host = %email.smtp_host, "✓ Email alerts configured");
        }
        None => {
            tracing::warn!("⚠ SMTP not configured - email alerts will fail");
            tracing::warn!("  Set SMTP_HOST and SMTP_FROM in .env");
        }
    }

    let market: Arc<dyn MarketDataSource> = match config.market_data {
        MarketDataProvider::TradingView => Arc::new(TradingViewSource::new(reqwest::Client::new())),
        MarketDataProvider::Mock => {
            tracing::warn!("⚠ Using mock market data");
            Arc::new(MockMarketData::new())
        }
    };

    let alerts = Arc::new(AlertManager::new(store.clone(), market, notifier));
    let state = AppState::new(store, store_kind, ai, alerts.clone());

    // Background alert passes
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = JobScheduler::new(alerts, config.alert_check_interval).spawn(shutdown_rx);

    let app = app::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    let rule = "═".repeat(50);
    tracing::info!("{rule}");
    tracing::info!("🚀 trading assistant running on http://{}", config.bind_addr);
    tracing::info!("{rule}");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                       - Health check");
    tracing::info!("  GET    /api/threads                  - List threads");
    tracing::info!("  POST   /api/threads                  - Create thread");
    tracing::info!("  DELETE /api/threads/{{id}}            - Delete thread");
    tracing::info!("  GET    /api/threads/{{id}}/messages   - List messages");
    tracing::info!("  POST   /api/threads/{{id}}/messages   - Append message");
    tracing::info!("  POST   /api/messages/{{id}}/reactions - Toggle reaction");
    tracing::info!("  GET    /api/settings                 - Read settings");
    tracing::info!("  POST   /api/settings                 - Update settings");
    tracing::info!("  POST   /api/settings/test            - Test provider credentials");
    tracing::info!("  GET    /api/settings/models          - List provider models");
    tracing::info!("  POST   /api/chat                     - Send message");
    tracing::info!("  GET    /api/alerts                   - List alert rules");
    tracing::info!("  POST   /api/alerts                   - Create alert rule");
    tracing::info!("  DELETE /api/alerts/{{id}}             - Delete alert rule");
    tracing::info!("  POST   /api/alerts/check             - Run alert pass now");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    scheduler.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
