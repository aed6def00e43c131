//! # assistant-core
//!
//! Domain model, persistence traits and the chat pipeline of the trading
//! assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ChatService                           │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────┐  │
//! │  │ Moderation  │──│   History    │──│     AiService       │  │
//! │  │             │  │  (ChatStore) │  │     (Strategy)      │  │
//! │  └─────────────┘  └──────────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `AiService` trait lets the pipeline run against OpenAI, Ollama or
//! any other backend; `AiServiceFactory` picks one from a user's settings.

pub mod alert;
pub mod chat;
pub mod error;
pub mod message;
pub mod model;
pub mod provider;
pub mod reaction;
pub mod store;

pub use alert::{ActiveAlert, AlertChannel, AlertCondition, AlertRule, ConditionKind, NewAlertRule};
pub use chat::{ChatConfig, ChatService};
pub use error::{AssistantError, Result};
pub use message::{Conversation, Message, Role};
pub use model::{
    ChatLog, MessageCategory, NewMessage, ProviderKind, Reaction, SettingsUpdate, Thread,
    ThreadMessage, User, UserSettings,
};
pub use provider::{AiService, AiServiceFactory, Completion, CompletionOptions, ModelInfo};
pub use reaction::toggle_reaction;
pub use store::{AccountStore, AlertStore, ChatStore, MemoryStore};
#[cfg(feature = "postgres")]
pub use store::PgStore;
