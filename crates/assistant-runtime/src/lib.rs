//! # assistant-runtime
//!
//! AI service implementations for the trading assistant.
//!
//! ## Providers
//!
//! - **OpenAI** (default): hosted chat completions and moderation, with a
//!   fallback key on quota errors
//! - **Ollama** (`ollama` feature): self-hosted inference with keyword
//!   moderation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_core::AiServiceFactory;
//! use assistant_runtime::ProviderFactory;
//!
//! let factory = ProviderFactory::from_env()?;
//! let service = factory.build(&settings)?;
//! ```

pub mod factory;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;

pub use factory::{ProviderFactory, RuntimeConfig};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaService};
pub use openai::{OpenAiConfig, OpenAiService};
