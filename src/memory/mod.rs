//! Per-user conversational memory.
//!
//! - [`model`]: records, conversation turns and retrieval results
//! - [`classifier`]: NEW / UPDATE / IGNORE decisions
//! - [`manager`]: the read-decide-write sequence against the index

pub mod classifier;
pub mod manager;
pub mod model;

pub use classifier::{
    Classifier, DecisionKind, DecisionResponse, LlmClassifier, MemoryItem, RuleClassifier,
};
pub use manager::{MemoryManager, MemoryWriteOutcome};
pub use model::{
    ConversationTurn, MemoryRecord, RetrievalHit, SearchOutcome, DEFAULT_CATEGORY,
    NO_MEMORY_PLACEHOLDER,
};
