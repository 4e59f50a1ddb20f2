//! # Smriti - memory-augmented chat server
//!
//! Smriti answers chat queries grounded in what it remembers about each
//! user, and keeps that memory current: every exchange is classified as new
//! information, an update to something already known, or noise, and the
//! user's index is written accordingly.
//!
//! ## Overview
//!
//! Smriti can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `smriti-server` binary
//! 2. **As a library** - Build an [`AppState`] and mount [`api::routes::build_app`]
//!
//! ### Library Example
//!
//! ```rust,ignore
//! use smriti::{AppState, SmritiConfigManager};
//! use std::sync::Arc;
//!
//! let config_manager = Arc::new(SmritiConfigManager::new("smriti.toml")?);
//! let state = AppState::from_config(config_manager)?;
//!
//! let answer = state.chat.respond("alice", "what is my name?").await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible completion API, Groq by default (default) |
//! | `ollama` | Local Ollama completion |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui` |
//!
//! ## Modules
//!
//! - [`api`] - REST handlers and routes
//! - [`chat`] - memory-grounded answers
//! - [`memory`] - classification and the read-decide-write cycle
//! - [`db`] - per-user memory index backends
//! - [`llm`] - completion providers
//! - [`utils`] - TOML configuration with hot reload

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Memory-grounded chat orchestration.
pub mod chat;
/// `smriti-server` command-line interface.
pub mod cli;
/// Memory index backends (Pinecone, in-process).
pub mod db;
/// Completion provider clients.
pub mod llm;
/// Memory classification and reconciliation.
pub mod memory;
/// Request/response types and errors.
pub mod types;
/// Configuration loading and hot reload.
pub mod utils;

pub use chat::ChatOrchestrator;
pub use db::{Namespace, VectorStore, VectorStoreProvider};
pub use llm::{LLMClient, LLMClientFactory, Provider};
pub use memory::{Classifier, LlmClassifier, MemoryManager, RuleClassifier};
pub use types::{AppError, Result};
pub use utils::toml_config::{SmritiConfig, SmritiConfigManager};

use std::sync::Arc;
use utils::ClassifierKind;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<MemoryManager>,
    pub chat: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Wire the memory manager and chat orchestrator around the given
    /// backends. The classifier is chosen once from `memory.classifier`.
    pub fn new(
        config_manager: Arc<SmritiConfigManager>,
        vector_store: Arc<dyn VectorStore>,
        llm: Arc<dyn LLMClient>,
    ) -> Self {
        let classifier: Arc<dyn Classifier> = match config_manager.config().memory.classifier {
            ClassifierKind::Llm => Arc::new(LlmClassifier::new(Arc::clone(&llm))),
            ClassifierKind::Rules => Arc::new(RuleClassifier::default()),
        };

        let memory = Arc::new(MemoryManager::new(
            vector_store,
            classifier,
            Arc::clone(&config_manager),
        ));
        let chat = Arc::new(ChatOrchestrator::new(llm, Arc::clone(&memory), config_manager));

        Self { memory, chat }
    }

    /// Build the configured completion client and index, then wire them.
    pub fn from_config(config_manager: Arc<SmritiConfigManager>) -> Result<Self> {
        let config = config_manager.config();

        let provider = config
            .completion_provider()
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        let llm: Arc<dyn LLMClient> = Arc::from(LLMClientFactory::new(provider).create_default()?);

        let store: Arc<dyn VectorStore> = Arc::from(
            config
                .vector_store_provider()
                .map_err(|e| AppError::Configuration(e.to_string()))?
                .create_store()?,
        );

        let completion = llm.model_name().to_string();
        let index = store.provider_name();
        let state = Self::new(config_manager, store, llm);

        tracing::info!(
            completion = %completion,
            index,
            classifier = state.memory.classifier_name(),
            "application state initialized"
        );

        Ok(state)
    }
}
