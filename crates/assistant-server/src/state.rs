//! Application State

use std::sync::Arc;

use assistant_core::{AccountStore, AiServiceFactory, AlertStore, ChatConfig, ChatStore};
use market_alerts::AlertManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Threads, messages, reactions and chat logs
    pub chats: Arc<dyn ChatStore>,

    /// Users and their settings
    pub accounts: Arc<dyn AccountStore>,

    /// Alert rules
    pub alert_rules: Arc<dyn AlertStore>,

    /// Builds the AI service selected by a user's settings
    pub ai: Arc<dyn AiServiceFactory>,

    /// Shared with the scheduler
    pub alerts: Arc<AlertManager>,

    pub chat_config: ChatConfig,

    /// "postgres" or "memory"
    pub store_kind: &'static str,
}

impl AppState {
    /// Wire all three store roles to one backing store
    pub fn new<S>(
        store: Arc<S>,
        store_kind: &'static str,
        ai: Arc<dyn AiServiceFactory>,
        alerts: Arc<AlertManager>,
    ) -> Self
    where
        S: ChatStore + AccountStore + AlertStore + 'static,
    {
        Self {
            chats: store.clone(),
            accounts: store.clone(),
            alert_rules: store,
            ai,
            alerts,
            chat_config: ChatConfig::default(),
            store_kind,
        }
    }
}
