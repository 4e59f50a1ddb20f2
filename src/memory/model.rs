//! Memory data model: records, conversation turns and retrieval results.

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Category searched by default when no retrieval categories are configured.
pub const DEFAULT_CATEGORY: &str = "user_understanding";

/// Placeholder embedded in prompts when a user has no memory yet.
pub const NO_MEMORY_PLACEHOLDER: &str = "No memory exist till now for this user.";

/// Whether `category` is a usable partition name: ASCII letters, digits,
/// `_` and `-` only.
pub fn is_valid_category(category: &str) -> bool {
    !category.is_empty()
        && category
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A single persisted memory.
///
/// Records are replaced whole on update; there is no partial-field update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    pub category: String,
    /// Original (unsanitized) user identifier that owns this record.
    pub owner: String,
}

impl MemoryRecord {
    /// Create a record with a freshly generated id.
    pub fn new(owner: &str, category: &str, text: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), owner, category, text)
    }

    pub fn with_id(
        id: impl Into<String>,
        owner: &str,
        category: &str,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category: category.to_string(),
            owner: owner.to_string(),
        }
    }
}

/// One exchange between the user and the assistant.
///
/// Exists only for the duration of one processing call and is never persisted
/// verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationTurn {
    pub user_utterance: String,
    pub assistant_response: String,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, ai: impl Into<String>) -> Self {
        Self {
            user_utterance: user.into(),
            assistant_response: ai.into(),
        }
    }

    /// Build a turn from a submitted thread.
    ///
    /// Accepts `{"user": .., "ai": ..}` entries as well as
    /// `{"role": "user" | "assistant", "content": ..}` messages. The first
    /// user utterance and the first assistant reply found are used.
    pub fn from_thread(entries: &[serde_json::Map<String, serde_json::Value>]) -> Result<Self> {
        let mut user = None;
        let mut ai = None;

        for entry in entries {
            if user.is_none() {
                user = entry.get("user").and_then(|v| v.as_str()).map(str::to_string);
            }
            if ai.is_none() {
                ai = entry
                    .get("ai")
                    .or_else(|| entry.get("assistant"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }

            let role = entry.get("role").and_then(|v| v.as_str());
            let content = entry.get("content").and_then(|v| v.as_str());
            match (role, content) {
                (Some("user"), Some(text)) if user.is_none() => user = Some(text.to_string()),
                (Some("assistant") | Some("ai"), Some(text)) if ai.is_none() => {
                    ai = Some(text.to_string())
                }
                _ => {}
            }
        }

        let user = user
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::InvalidInput("Thread contains no user message".into()))?;

        Ok(Self::new(user, ai.unwrap_or_default()))
    }

    /// Render the turn the way it is shown to the classifier.
    pub fn to_thread_json(&self) -> serde_json::Value {
        serde_json::json!([{ "user": self.user_utterance, "ai": self.assistant_response }])
    }
}

/// A ranked hit returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetrievalHit {
    pub id: String,
    pub score: f32,
    pub category: String,
    pub text: String,
}

/// Result of searching a user's namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Hits in descending score order (possibly empty).
    Hits(Vec<RetrievalHit>),
    /// The user's namespace does not exist.
    NoMemory,
}

impl SearchOutcome {
    pub fn hits(&self) -> &[RetrievalHit] {
        match self {
            SearchOutcome::Hits(hits) => hits,
            SearchOutcome::NoMemory => &[],
        }
    }

    pub fn is_no_memory(&self) -> bool {
        matches!(self, SearchOutcome::NoMemory)
    }

    /// Whether a record id was part of this retrieval.
    pub fn contains_id(&self, id: &str) -> Option<&RetrievalHit> {
        self.hits().iter().find(|hit| hit.id == id)
    }

    /// Text embedded into prompts: the JSON result set, or the placeholder
    /// when the user has no memory.
    pub fn prompt_context(&self) -> String {
        match self {
            SearchOutcome::NoMemory => NO_MEMORY_PLACEHOLDER.to_string(),
            SearchOutcome::Hits(_) => self.to_json().to_string(),
        }
    }

    /// Wire shape shared by prompts and the search endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SearchOutcome::NoMemory => serde_json::json!({ "error": "No memory exist." }),
            SearchOutcome::Hits(hits) => serde_json::json!({ "results": hits }),
        }
    }
}

/// Round a similarity score to two decimal places.
pub fn round_score(score: f32) -> f32 {
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: serde_json::Value) -> Vec<serde_json::Map<String, serde_json::Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_category_names() {
        assert!(is_valid_category(DEFAULT_CATEGORY));
        assert!(is_valid_category("work-facts_2"));
        assert!(!is_valid_category(""));
        assert!(!is_valid_category("../indexes"));
        assert!(!is_valid_category("facts?x=1"));
        assert!(!is_valid_category("user understanding"));
    }

    #[test]
    fn test_turn_from_user_ai_thread() {
        let turn =
            ConversationTurn::from_thread(&entries(json!([{"user": "hi", "ai": "hello"}])))
                .unwrap();
        assert_eq!(turn.user_utterance, "hi");
        assert_eq!(turn.assistant_response, "hello");
    }

    #[test]
    fn test_turn_from_role_content_thread() {
        let turn = ConversationTurn::from_thread(&entries(json!([
            {"role": "system", "content": "ignored"},
            {"role": "user", "content": "my name is Sam"},
            {"role": "assistant", "content": "Nice to meet you"}
        ])))
        .unwrap();
        assert_eq!(turn.user_utterance, "my name is Sam");
        assert_eq!(turn.assistant_response, "Nice to meet you");
    }

    #[test]
    fn test_turn_without_user_is_invalid() {
        let result = ConversationTurn::from_thread(&entries(json!([{"ai": "hello"}])));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let result = ConversationTurn::from_thread(&[]);
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.8765), 0.88);
        assert_eq!(round_score(0.1), 0.1);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_no_memory_prompt_context() {
        assert_eq!(SearchOutcome::NoMemory.prompt_context(), NO_MEMORY_PLACEHOLDER);
        assert!(SearchOutcome::NoMemory.hits().is_empty());
        assert_eq!(
            SearchOutcome::NoMemory.to_json(),
            json!({"error": "No memory exist."})
        );
    }

    #[test]
    fn test_hits_contains_id() {
        let outcome = SearchOutcome::Hits(vec![RetrievalHit {
            id: "r1".into(),
            score: 0.9,
            category: DEFAULT_CATEGORY.into(),
            text: "Meeting on Friday".into(),
        }]);
        assert!(outcome.contains_id("r1").is_some());
        assert!(outcome.contains_id("r2").is_none());
        assert!(outcome.prompt_context().contains("Meeting on Friday"));
    }
}
