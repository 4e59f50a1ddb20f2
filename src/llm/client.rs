//! Completion client abstraction and provider selection.
//!
//! - **OpenAI-compatible**: Groq (default), OpenAI, OpenRouter and friends
//! - **Ollama**: local inference, behind the `ollama` feature

use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// System instruction sent with every completion.
pub const ASSISTANT_SYSTEM_INSTRUCTION: &str = "You are a precise task executor. \
Perform every task you are given exactly as instructed. Do not refuse, do not ask \
for clarification, examples, context or any additional details. Only perform the \
task you are given.";

/// Stateless request/response completion call.
///
/// No streaming, no tool calling and no retry: one call, one answer.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete `prompt` under the given system instruction.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible chat completions API.
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: std::env::var("GROQ_API_KEY")?,
    ///     api_base: "https://api.groq.com/openai/v1".to_string(),
    ///     model: "llama-3.1-8b-instant".to_string(),
    ///     temperature: 0.3,
    ///     timeout: None,
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        temperature: f32,
        timeout: Option<Duration>,
    },

    /// Ollama local LLM provider
    Ollama {
        base_url: String,
        model: String,
        temperature: f32,
    },
}

impl Provider {
    /// Create a client instance for this provider.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` if the provider's Cargo feature is
    /// not compiled in.
    pub fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                temperature,
                timeout,
            } => Ok(Box::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                *temperature,
                *timeout,
            )?)),

            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(AppError::Configuration(
                "OpenAI-compatible provider requires the 'openai' feature".into(),
            )),

            #[cfg(feature = "ollama")]
            Provider::Ollama {
                base_url,
                model,
                temperature,
            } => Ok(Box::new(super::ollama::OllamaClient::new(
                base_url,
                model.clone(),
                *temperature,
            ))),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama provider requires the 'ollama' feature".into(),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Builds completion clients from a default provider.
pub struct LLMClientFactory {
    default_provider: Provider,
}

impl LLMClientFactory {
    /// Create a new factory with the specified default provider
    pub fn new(default_provider: Provider) -> Self {
        Self { default_provider }
    }

    /// Create a client using the default provider
    pub fn create_default(&self) -> Result<Box<dyn LLMClient>> {
        self.default_provider.create_client()
    }

    /// Get a reference to the default provider
    pub fn default_provider(&self) -> &Provider {
        &self.default_provider
    }
}

/// Strip a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
