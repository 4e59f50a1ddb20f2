//! Completion providers.
//!
//! Everything that talks to a language model goes through [`LLMClient`]:
//! the chat orchestrator for grounded answers and the LLM classifier for
//! memory decisions.
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `openai` (default) - any OpenAI-compatible API; Groq out of the box
//! - `ollama` - local Ollama server
//!
//! # Example
//!
//! ```ignore
//! use smriti::llm::{Provider, ASSISTANT_SYSTEM_INSTRUCTION};
//!
//! let client = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "llama3.2".to_string(),
//!     temperature: 0.3,
//! }
//! .create_client()?;
//!
//! let answer = client.complete(ASSISTANT_SYSTEM_INSTRUCTION, "What is 2+2?").await?;
//! ```

/// Core completion trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{
    strip_code_fence, LLMClient, LLMClientFactory, Provider, ASSISTANT_SYSTEM_INSTRUCTION,
};
