//! Memory-grounded chat.
//!
//! [`ChatOrchestrator::respond`] retrieves the user's relevant memories,
//! answers the query with them in the prompt, then hands the exchange to the
//! [`MemoryManager`] so the conversation itself can become memory.

use crate::llm::{LLMClient, ASSISTANT_SYSTEM_INSTRUCTION};
use crate::memory::{ConversationTurn, MemoryManager, SearchOutcome};
use crate::types::Result;
use crate::utils::{SmritiConfigManager, WriteMode};
use std::sync::Arc;

/// Build the grounding prompt sent to the completion model.
pub fn grounding_prompt(memory_context: &str, query: &str) -> String {
    format!(
        "You are a helpful AI assistant and you help the user with their queries. \
         To understand the user better, use the following information from your memory: \
         {memory_context}. Now answer the user query: {query}"
    )
}

pub struct ChatOrchestrator {
    llm: Arc<dyn LLMClient>,
    memory: Arc<MemoryManager>,
    config: Arc<SmritiConfigManager>,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        memory: Arc<MemoryManager>,
        config: Arc<SmritiConfigManager>,
    ) -> Self {
        Self {
            llm,
            memory,
            config,
        }
    }

    /// Answer `query` for `user_id`, grounded in their stored memories.
    ///
    /// A failing retrieval degrades to the no-memory placeholder; a failing
    /// memory write after the answer is logged and never reaches the caller.
    pub async fn respond(&self, user_id: &str, query: &str) -> Result<String> {
        let context = match self.memory.retrieve(user_id, query, None).await {
            Ok(outcome) => outcome.prompt_context(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "memory retrieval failed, answering without memory");
                SearchOutcome::NoMemory.prompt_context()
            }
        };

        let prompt = grounding_prompt(&context, query);
        let response = self
            .llm
            .complete(ASSISTANT_SYSTEM_INSTRUCTION, &prompt)
            .await?;

        let turn = ConversationTurn::new(query, response.clone());
        let write_mode = self.config.config().memory.write_mode;
        match write_mode {
            WriteMode::Background => {
                let memory = Arc::clone(&self.memory);
                let user_id = user_id.to_string();
                tokio::spawn(async move {
                    record_turn(&memory, &user_id, &turn).await;
                });
            }
            WriteMode::Inline => record_turn(&self.memory, user_id, &turn).await,
        }

        Ok(response)
    }
}

async fn record_turn(memory: &MemoryManager, user_id: &str, turn: &ConversationTurn) {
    if let Err(e) = memory.decide_and_write(user_id, turn).await {
        tracing::warn!(user_id, error = %e, "post-chat memory write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryVectorStore, Namespace, VectorStore};
    use crate::memory::{MemoryRecord, RuleClassifier, DEFAULT_CATEGORY, NO_MEMORY_PLACEHOLDER};
    use crate::types::AppError;
    use crate::utils::{IndexConfig, SmritiConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records prompts and answers with a fixed string.
    struct RecordingLLM {
        prompts: Mutex<Vec<String>>,
        answer: String,
    }

    #[async_trait]
    impl LLMClient for RecordingLLM {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(self.answer.clone())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    struct FailingLLM;

    #[async_trait]
    impl LLMClient for FailingLLM {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(AppError::LLM("upstream down".into()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn setup(
        llm: Arc<dyn LLMClient>,
        store: Arc<InMemoryVectorStore>,
    ) -> ChatOrchestrator {
        let mut config = SmritiConfig::default();
        config.index = IndexConfig::Memory;
        config.memory.write_mode = WriteMode::Inline;
        let config = Arc::new(SmritiConfigManager::from_config(config));
        let memory = Arc::new(MemoryManager::new(
            store,
            Arc::new(RuleClassifier::default()),
            Arc::clone(&config),
        ));
        ChatOrchestrator::new(llm, memory, config)
    }

    #[test]
    fn test_grounding_prompt_embeds_context_and_query() {
        let prompt = grounding_prompt(NO_MEMORY_PLACEHOLDER, "what is my name?");
        assert!(prompt.contains(NO_MEMORY_PLACEHOLDER));
        assert!(prompt.ends_with("Now answer the user query: what is my name?"));
    }

    #[tokio::test]
    async fn test_respond_uses_placeholder_for_new_user() {
        let llm = Arc::new(RecordingLLM {
            prompts: Mutex::new(Vec::new()),
            answer: "Nice to meet you, Sam".into(),
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let chat = setup(llm.clone(), store.clone());

        let answer = chat.respond("sam", "my name is Sam").await.unwrap();

        assert_eq!(answer, "Nice to meet you, Sam");
        assert!(llm.prompts.lock()[0].contains(NO_MEMORY_PLACEHOLDER));
        // Inline write mode: the turn is already remembered.
        assert_eq!(store.count(&Namespace::for_user("sam"), DEFAULT_CATEGORY), 1);
    }

    #[tokio::test]
    async fn test_respond_grounds_on_stored_memory() {
        let llm = Arc::new(RecordingLLM {
            prompts: Mutex::new(Vec::new()),
            answer: "Your meeting is on Friday".into(),
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();
        store
            .upsert(
                &ns,
                DEFAULT_CATEGORY,
                &[MemoryRecord::with_id("r1", "sam", DEFAULT_CATEGORY, "Meeting on Friday")],
            )
            .await
            .unwrap();

        let chat = setup(llm.clone(), store);
        chat.respond("sam", "when is my meeting?").await.unwrap();

        let prompt = llm.prompts.lock()[0].clone();
        assert!(prompt.contains("Meeting on Friday"));
        assert!(prompt.contains("\"results\""));
    }

    #[tokio::test]
    async fn test_completion_failure_is_returned() {
        let store = Arc::new(InMemoryVectorStore::new());
        let chat = setup(Arc::new(FailingLLM), store.clone());

        let result = chat.respond("sam", "hello").await;
        assert!(matches!(result, Err(AppError::LLM(_))));
        assert!(!store
            .namespace_exists(&Namespace::for_user("sam"))
            .await
            .unwrap());
    }
}
