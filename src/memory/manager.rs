//! Read-decide-write reconciliation of a user's memory.
//!
//! For each conversation turn the manager:
//! 1. makes sure the user's namespace exists,
//! 2. retrieves the most similar existing memories,
//! 3. asks the [`Classifier`] for a NEW / UPDATE / IGNORE decision,
//! 4. writes the resulting records.
//!
//! The whole sequence holds a per-namespace lock, so two turns for the same
//! user never interleave their retrieval and write steps.

use crate::db::{Namespace, VectorStore};
use crate::memory::classifier::{Classifier, DecisionKind, DecisionResponse};
use crate::memory::model::{ConversationTurn, MemoryRecord, SearchOutcome};
use crate::types::Result;
use crate::utils::SmritiConfigManager;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Result of one decide-and-write call.
#[derive(Debug, Clone)]
pub struct MemoryWriteOutcome {
    /// Whether any record was written.
    pub written: bool,
    /// Namespace key written to, if any.
    pub namespace: Option<String>,
    /// Records written, in write order.
    pub records: Vec<MemoryRecord>,
    /// The classifier's decision, unmodified.
    pub decision: DecisionResponse,
}

impl MemoryWriteOutcome {
    /// Body returned to API callers: the decision, or `{"memory": []}` when
    /// nothing was remembered (an ignore, or updates that were all rejected).
    pub fn to_response_json(&self) -> serde_json::Value {
        if !self.written {
            serde_json::json!({ "memory": [] })
        } else {
            serde_json::to_value(&self.decision).unwrap_or_else(|_| serde_json::json!({}))
        }
    }
}

type LockTable = parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive hold on one namespace. Dropping it releases the lock and removes
/// the table entry once nobody else holds or waits for it.
struct NamespaceGuard<'a> {
    locks: &'a LockTable,
    key: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for NamespaceGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Reconciles conversation turns into a user's stored memories.
pub struct MemoryManager {
    store: Arc<dyn VectorStore>,
    classifier: Arc<dyn Classifier>,
    config: Arc<SmritiConfigManager>,
    locks: LockTable,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        classifier: Arc<dyn Classifier>,
        config: Arc<SmritiConfigManager>,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    async fn lock_namespace(&self, namespace: &Namespace) -> NamespaceGuard<'_> {
        let key = namespace.key().to_string();
        let lock = Arc::clone(self.locks.lock().entry(key.clone()).or_default());

        // Built before awaiting so a cancelled wait still prunes the entry.
        let mut held = NamespaceGuard {
            locks: &self.locks,
            key,
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    /// Retrieve the memories most similar to `query` across the configured
    /// retrieval categories.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<SearchOutcome> {
        let config = self.config.config();
        let top_k = top_k.unwrap_or(config.memory.top_k).max(1);
        let namespace = Namespace::for_user(user_id);

        self.store
            .search_categories(
                &namespace,
                &config.memory.retrieval_categories,
                query,
                top_k,
            )
            .await
    }

    /// Classify a turn and apply the resulting write.
    pub async fn decide_and_write(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
    ) -> Result<MemoryWriteOutcome> {
        let started = Instant::now();
        let namespace = Namespace::for_user(user_id);

        let _guard = self.lock_namespace(&namespace).await;

        let created = self.store.create_namespace_if_absent(&namespace).await?;
        if created {
            tracing::info!(user_id, namespace = %namespace, "created memory namespace");
        }

        let candidates = self.retrieve(user_id, &turn.user_utterance, None).await?;

        let decision = self
            .classifier
            .classify(user_id, turn, &candidates)
            .await?;
        decision.validate()?;

        let kind = decision.kind();
        tracing::debug!(
            user_id,
            namespace = %namespace,
            classifier = self.classifier.name(),
            decision = ?kind,
            candidates = candidates.hits().len(),
            "memory decision"
        );

        if kind == DecisionKind::Ignore {
            // Ignored turns are not persisted.
            return Ok(MemoryWriteOutcome {
                written: false,
                namespace: None,
                records: Vec::new(),
                decision,
            });
        }

        let records = self.plan_records(user_id, &decision, &candidates);
        let mut by_category: BTreeMap<&str, Vec<MemoryRecord>> = BTreeMap::new();
        for record in &records {
            by_category
                .entry(record.category.as_str())
                .or_default()
                .push(record.clone());
        }

        for (category, batch) in &by_category {
            self.store.upsert(&namespace, category, batch).await?;
            tracing::info!(
                user_id,
                namespace = %namespace,
                category,
                records = batch.len(),
                "memory written"
            );
        }

        tracing::debug!(
            user_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "decide and write finished"
        );

        Ok(MemoryWriteOutcome {
            written: !records.is_empty(),
            namespace: (!records.is_empty()).then(|| namespace.key().to_string()),
            records,
            decision,
        })
    }

    /// Turn a validated positive decision into records, dropping updates
    /// whose target was not part of this call's retrieval.
    fn plan_records(
        &self,
        user_id: &str,
        decision: &DecisionResponse,
        candidates: &SearchOutcome,
    ) -> Vec<MemoryRecord> {
        let category = decision
            .type_of_memory
            .as_deref()
            .unwrap_or(crate::memory::DEFAULT_CATEGORY)
            .trim();

        let mut records = Vec::with_capacity(decision.memory_data.len());
        for item in &decision.memory_data {
            if !item.user_id.is_empty() && item.user_id != user_id {
                tracing::warn!(
                    user_id,
                    claimed_user_id = %item.user_id,
                    "memory item names a different user; writing to the requester's namespace"
                );
            }

            let text = item.text.trim();
            match item.target_id() {
                Some(target) => match candidates.contains_id(target) {
                    Some(hit) => {
                        let target_category = if hit.category.is_empty() {
                            category
                        } else {
                            hit.category.as_str()
                        };
                        records.push(MemoryRecord::with_id(
                            target,
                            user_id,
                            target_category,
                            text,
                        ));
                    }
                    None => {
                        tracing::warn!(
                            user_id,
                            update_id = target,
                            "rejected update of a record outside the retrieved candidates"
                        );
                    }
                },
                None => records.push(MemoryRecord::new(user_id, category, text)),
            }
        }
        records
    }

    /// Irreversibly delete a user's namespace. Returns `false` if it did not exist.
    pub async fn forget(&self, user_id: &str) -> Result<bool> {
        let namespace = Namespace::for_user(user_id);
        let _guard = self.lock_namespace(&namespace).await;

        let deleted = self.store.delete_namespace(&namespace).await?;
        if deleted {
            tracing::info!(user_id, namespace = %namespace, "memory namespace deleted");
        }
        Ok(deleted)
    }
}
