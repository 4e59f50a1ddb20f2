//! Memory decisions: should a conversation turn become a new memory, update
//! an existing one, or be ignored?
//!
//! Two implementations of [`Classifier`]:
//! - [`LlmClassifier`] asks the completion model and parses its JSON answer
//! - [`RuleClassifier`] applies a deterministic token-overlap policy

use crate::llm::{strip_code_fence, LLMClient, ASSISTANT_SYSTEM_INSTRUCTION};
use crate::memory::model::{
    is_valid_category, ConversationTurn, SearchOutcome, DEFAULT_CATEGORY,
};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;

/// One memory to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MemoryItem {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    /// Id of the retrieved record this item replaces; `None` for a new record.
    #[serde(default)]
    pub update_id: Option<String>,
}

impl MemoryItem {
    /// Target id. Empty strings and the spelled-out `"null"` / `"none"`
    /// some models emit count as absent.
    pub fn target_id(&self) -> Option<&str> {
        self.update_id.as_deref().map(str::trim).filter(|id| {
            !id.is_empty() && !id.eq_ignore_ascii_case("null") && !id.eq_ignore_ascii_case("none")
        })
    }
}

/// A classifier's answer, exactly as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DecisionResponse {
    pub memory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_data: Vec<MemoryItem>,
}

/// Outcome of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    New,
    Update,
    Ignore,
}

impl DecisionResponse {
    pub fn ignore() -> Self {
        Self {
            memory: false,
            type_of_memory: None,
            memory_data: Vec::new(),
        }
    }

    pub fn new_memory(category: &str, user_id: &str, text: impl Into<String>) -> Self {
        Self {
            memory: true,
            type_of_memory: Some(category.to_string()),
            memory_data: vec![MemoryItem {
                user_id: user_id.to_string(),
                text: text.into(),
                update_id: None,
            }],
        }
    }

    pub fn update(
        category: &str,
        user_id: &str,
        update_id: &str,
        text: impl Into<String>,
    ) -> Self {
        Self {
            memory: true,
            type_of_memory: Some(category.to_string()),
            memory_data: vec![MemoryItem {
                user_id: user_id.to_string(),
                text: text.into(),
                update_id: Some(update_id.to_string()),
            }],
        }
    }

    /// Update if any item targets an existing record, new if it writes
    /// anything else, ignore otherwise.
    pub fn kind(&self) -> DecisionKind {
        if !self.memory || self.memory_data.is_empty() {
            DecisionKind::Ignore
        } else if self.memory_data.iter().any(|item| item.target_id().is_some()) {
            DecisionKind::Update
        } else {
            DecisionKind::New
        }
    }

    /// Reject positive decisions that cannot be written.
    pub fn validate(&self) -> Result<()> {
        if self.kind() == DecisionKind::Ignore {
            return Ok(());
        }

        let category = self.type_of_memory.as_deref().unwrap_or_default().trim();
        if category.is_empty() {
            return Err(AppError::MalformedDecision(
                "positive decision without type_of_memory".into(),
            ));
        }
        if !is_valid_category(category) {
            return Err(AppError::MalformedDecision(format!(
                "invalid type_of_memory '{}'",
                category
            )));
        }

        if self.memory_data.iter().any(|item| item.text.trim().is_empty()) {
            return Err(AppError::MalformedDecision(
                "memory item with empty text".into(),
            ));
        }

        Ok(())
    }

    /// Parse a model answer, tolerating a surrounding markdown code fence.
    pub fn parse(raw: &str) -> Result<Self> {
        let body = strip_code_fence(raw);
        let decision: DecisionResponse = serde_json::from_str(body).map_err(|e| {
            AppError::MalformedDecision(format!("{}; classifier output: {}", e, truncate(body)))
        })?;
        decision.validate()?;
        Ok(decision)
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    }
}

/// Decides what, if anything, a conversation turn adds to a user's memory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `turn` against the `candidates` retrieved for the same user.
    async fn classify(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
        candidates: &SearchOutcome,
    ) -> Result<DecisionResponse>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// LLM classifier
// ============================================================================

/// Classifier backed by the completion model.
pub struct LlmClassifier {
    llm: Arc<dyn LLMClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Build the decision prompt for one turn.
    pub fn build_prompt(
        user_id: &str,
        turn: &ConversationTurn,
        candidates: &SearchOutcome,
    ) -> String {
        format!(
            r#"You act as the part of a mind that decides what is worth remembering from a conversation.

You receive the current `chat_thread` and `searched_result`, the existing memories most similar to it. Produce at most a short memory point, and decide whether the new information UPDATES an existing memory or is entirely NEW.

Decision rules:
1. UPDATE: the new information corrects, changes or supersedes a memory in `searched_result` (a renamed person, a rescheduled meeting, a changed preference). Return it as an update and give the `id` of the memory it replaces as `update_id`.
2. NEW: the information is about a topic that `searched_result` does not cover.
3. IGNORE: small talk, greetings, and anything already stored exactly as it is. If `searched_result` already says "User has a meeting on Saturday" and the chat says the same, do nothing.

Worked examples:

Example 1, updating a fact
chat_thread: [{{"user": "oh sorry, my meeting is actually on saturday"}}]
searched_result: {{"results": [{{"id": "uuid-123", "text": "User has a meeting on Friday."}}]}}
Output:
{{"memory": true, "type_of_memory": "facts", "memory_data": [{{"user_id": "{user_id}", "text": "User's meeting is on Saturday.", "update_id": "uuid-123"}}]}}

Example 2, adding a new fact
chat_thread: [{{"user": "i like to read sci-fi books"}}]
searched_result: {{"results": [{{"id": "uuid-456", "text": "User's meeting is on Saturday."}}]}}
Output:
{{"memory": true, "type_of_memory": "user_understanding", "memory_data": [{{"user_id": "{user_id}", "text": "User enjoys reading science fiction books.", "update_id": null}}]}}

Example 3, ignoring a duplicate
chat_thread: [{{"user": "yes my name is aman"}}]
searched_result: {{"results": [{{"id": "uuid-789", "text": "User introduced himself as Aman."}}]}}
Output:
{{"memory": false}}

Output format:
- To write a new or updated memory: {{"memory": true, "type_of_memory": "...", "memory_data": [{{"user_id": "...", "text": "...", "update_id": "..."}}]}}
- When nothing should be remembered: {{"memory": false}}

Strict rules: no markdown; answer with a single JSON object starting with {{ and ending with }}; `update_id` must be an id taken from `searched_result` for an update and null otherwise.

Data for your decision:
chat_thread: {thread}
searched_result: {context}
user_id: {user_id}"#,
            user_id = user_id,
            thread = turn.to_thread_json(),
            context = candidates.prompt_context(),
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
        candidates: &SearchOutcome,
    ) -> Result<DecisionResponse> {
        let prompt = Self::build_prompt(user_id, turn, candidates);
        let raw = self
            .llm
            .complete(ASSISTANT_SYSTEM_INSTRUCTION, &prompt)
            .await?;
        DecisionResponse::parse(&raw)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

// ============================================================================
// Rule classifier
// ============================================================================

const STOPWORDS: &[&str] = &[
    "a", "about", "am", "an", "and", "are", "at", "be", "for", "has", "have", "i", "i'm", "in",
    "is", "it", "me", "my", "of", "on", "s", "so", "that", "the", "this", "to", "user", "was",
    "with",
];

const SMALL_TALK: &[&str] = &[
    "bye", "cool", "good", "hello", "hey", "hi", "morning", "nice", "no", "ok", "okay", "sure",
    "thank", "thanks", "yes", "yeah", "you",
];

/// Deterministic policy over content-word overlap.
///
/// - small talk, questions, or a candidate overlapping at least
///   `duplicate_threshold`: ignore
/// - best candidate overlapping at least `update_threshold`: update it
/// - otherwise: new memory in [`DEFAULT_CATEGORY`]
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    duplicate_threshold: f32,
    update_threshold: f32,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.8,
            update_threshold: 0.2,
        }
    }
}

impl RuleClassifier {
    fn content_words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect()
    }

    /// Jaccard overlap of content words.
    pub fn overlap(a: &str, b: &str) -> f32 {
        let a = Self::content_words(a);
        let b = Self::content_words(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        a.intersection(&b).count() as f32 / a.union(&b).count() as f32
    }

    fn is_small_talk(text: &str) -> bool {
        let words = Self::content_words(text);
        words.iter().all(|w| SMALL_TALK.contains(&w.as_str()))
    }

    /// Decide synchronously; [`Classifier::classify`] delegates here.
    pub fn decide(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
        candidates: &SearchOutcome,
    ) -> DecisionResponse {
        let utterance = turn.user_utterance.trim();
        if utterance.ends_with('?') || Self::is_small_talk(utterance) {
            return DecisionResponse::ignore();
        }

        let best = candidates
            .hits()
            .iter()
            .map(|hit| (hit, Self::overlap(utterance, &hit.text)))
            .max_by(|(a, sa), (b, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id.cmp(&a.id))
            });

        match best {
            Some((_, score)) if score >= self.duplicate_threshold => DecisionResponse::ignore(),
            Some((hit, score)) if score >= self.update_threshold => {
                let category = if hit.category.is_empty() {
                    DEFAULT_CATEGORY
                } else {
                    hit.category.as_str()
                };
                DecisionResponse::update(category, user_id, &hit.id, utterance)
            }
            _ => DecisionResponse::new_memory(DEFAULT_CATEGORY, user_id, utterance),
        }
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    async fn classify(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
        candidates: &SearchOutcome,
    ) -> Result<DecisionResponse> {
        Ok(self.decide(user_id, turn, candidates))
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
