//! Vector Store Abstraction Layer
//!
//! This module provides a unified interface for the per-user memory index,
//! allowing the memory manager to work with a hosted index or an in-process
//! double through a common trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       VectorStore Trait                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ create_namespace_if_absent │ search │ upsert │ delete_namespace│
//! └──────────────────────────────────────────────────────────────┘
//!              ▲                               ▲
//!              │                               │
//!       ┌──────┴──────┐                 ┌──────┴──────┐
//!       │  Pinecone   │                 │  InMemory   │
//!       │  (hosted)   │                 │ (dev/tests) │
//!       └─────────────┘                 └─────────────┘
//! ```
//!
//! Embedding happens inside the index: records are written as text and
//! searched by text.

use crate::db::namespace::Namespace;
use crate::memory::model::{round_score, MemoryRecord, RetrievalHit, SearchOutcome};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::time::Duration;

// ============================================================================
// Vector Store Provider Configuration
// ============================================================================

/// Resolved configuration for vector store providers.
///
/// Each variant contains the necessary configuration (with secrets already
/// resolved from the environment) to connect to a backend.
#[derive(Debug, Clone)]
pub enum VectorStoreProvider {
    /// Pinecone - managed index with integrated embedding.
    Pinecone {
        /// Pinecone API key.
        api_key: String,
        /// Control-plane base URL (e.g. "https://api.pinecone.io").
        control_url: String,
        /// Cloud used when creating indexes.
        cloud: String,
        /// Region used when creating indexes.
        region: String,
        /// Integrated embedding model.
        embed_model: String,
        /// Value of the `X-Pinecone-API-Version` header.
        api_version: String,
        /// Per-request timeout.
        timeout: Option<Duration>,
        /// How long to wait for a new index to become ready.
        ready_timeout: Duration,
    },

    /// In-memory store for tests and local development.
    ///
    /// Data is not persisted and will be lost when the process exits.
    InMemory,
}

impl VectorStoreProvider {
    /// Create a vector store instance from this provider configuration.
    pub fn create_store(&self) -> Result<Box<dyn VectorStore>> {
        match self {
            VectorStoreProvider::Pinecone {
                api_key,
                control_url,
                cloud,
                region,
                embed_model,
                api_version,
                timeout,
                ready_timeout,
            } => {
                let store = super::pinecone::PineconeStore::new(super::pinecone::PineconeOptions {
                    api_key: api_key.clone(),
                    control_url: control_url.clone(),
                    cloud: cloud.clone(),
                    region: region.clone(),
                    embed_model: embed_model.clone(),
                    api_version: api_version.clone(),
                    timeout: *timeout,
                    ready_timeout: *ready_timeout,
                })?;
                Ok(Box::new(store))
            }
            VectorStoreProvider::InMemory => Ok(Box::new(InMemoryVectorStore::new())),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            VectorStoreProvider::Pinecone { .. } => "pinecone",
            VectorStoreProvider::InMemory => "in-memory",
        }
    }
}

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Namespace-scoped index operations.
///
/// Each operation is a single remote call (or a short fixed sequence of them)
/// with no local retry. Every operation on an existing namespace checks its
/// recorded owner digest and fails with `AppError::NamespaceCollision` when
/// the namespace belongs to a different original identifier.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get the name of this vector store provider.
    fn provider_name(&self) -> &'static str;

    /// Check whether a namespace with this key exists, whoever owns it.
    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool>;

    /// Create the user's namespace unless it already exists.
    ///
    /// Returns `true` if the namespace was created by this call.
    ///
    /// # Errors
    ///
    /// `AppError::NamespaceCollision` if the namespace exists but was created
    /// for a different original identifier.
    async fn create_namespace_if_absent(&self, namespace: &Namespace) -> Result<bool>;

    /// Irreversibly remove the namespace and every record in it.
    ///
    /// Returns `false` if the namespace did not exist.
    ///
    /// # Errors
    ///
    /// `AppError::NamespaceCollision` if the namespace belongs to another user.
    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool>;

    /// Write records into a category of the namespace.
    ///
    /// Records are keyed by id: an absent id is created, a present id is
    /// replaced whole.
    async fn upsert(
        &self,
        namespace: &Namespace,
        category: &str,
        records: &[MemoryRecord],
    ) -> Result<usize>;

    /// Search one category of the namespace by text.
    ///
    /// Returns [`SearchOutcome::NoMemory`] when the namespace does not exist,
    /// and `AppError::NamespaceCollision` when it belongs to another user.
    async fn search(
        &self,
        namespace: &Namespace,
        category: &str,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome>;

    /// Search several categories and merge the hits by score.
    async fn search_categories(
        &self,
        namespace: &Namespace,
        categories: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome> {
        let mut hits = Vec::new();
        for category in categories {
            match self.search(namespace, category, query, top_k).await? {
                SearchOutcome::NoMemory => return Ok(SearchOutcome::NoMemory),
                SearchOutcome::Hits(found) => hits.extend(found),
            }
        }
        Ok(SearchOutcome::Hits(rank_hits(hits, top_k)))
    }
}

/// Sort hits by descending score (ties broken by id) and keep the top `k`.
pub fn rank_hits(mut hits: Vec<RetrievalHit>, top_k: usize) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits
}

// ============================================================================
// In-Memory Vector Store (for testing)
// ============================================================================

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// In-memory vector store for tests and offline development.
///
/// Scores are token-overlap (Jaccard) similarity between the query and the
/// record text. This stands in for the hosted index's embedding search and is
/// not meant to be a semantic search.
pub struct InMemoryVectorStore {
    namespaces: Arc<RwLock<HashMap<String, InMemoryNamespace>>>,
}

struct InMemoryNamespace {
    owner_digest: String,
    /// category -> id -> record
    categories: HashMap<String, BTreeMap<String, MemoryRecord>>,
}

impl InMemoryNamespace {
    fn check_owner(&self, namespace: &Namespace) -> Result<()> {
        if self.owner_digest == namespace.owner_digest() {
            Ok(())
        } else {
            Err(AppError::NamespaceCollision(format!(
                "Namespace '{}' already belongs to a different user",
                namespace.key()
            )))
        }
    }
}

impl InMemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch a record directly, bypassing search.
    pub fn get(&self, namespace: &Namespace, category: &str, id: &str) -> Option<MemoryRecord> {
        let namespaces = self.namespaces.read();
        namespaces
            .get(namespace.key())?
            .categories
            .get(category)?
            .get(id)
            .cloned()
    }

    /// Number of records in one category of a namespace.
    pub fn count(&self, namespace: &Namespace, category: &str) -> usize {
        let namespaces = self.namespaces.read();
        namespaces
            .get(namespace.key())
            .and_then(|ns| ns.categories.get(category))
            .map(|records| records.len())
            .unwrap_or(0)
    }

    /// Total number of records across all categories of a namespace.
    pub fn total_count(&self, namespace: &Namespace) -> usize {
        let namespaces = self.namespaces.read();
        namespaces
            .get(namespace.key())
            .map(|ns| ns.categories.values().map(|records| records.len()).sum())
            .unwrap_or(0)
    }

    fn tokens(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Jaccard similarity between the token sets of two texts.
    pub(crate) fn lexical_similarity(a: &str, b: &str) -> f32 {
        let a = Self::tokens(a);
        let b = Self::tokens(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count() as f32;
        let union = a.union(&b).count() as f32;
        shared / union
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        Ok(self.namespaces.read().contains_key(namespace.key()))
    }

    async fn create_namespace_if_absent(&self, namespace: &Namespace) -> Result<bool> {
        let mut namespaces = self.namespaces.write();
        match namespaces.get(namespace.key()) {
            Some(existing) => existing.check_owner(namespace).map(|_| false),
            None => {
                namespaces.insert(
                    namespace.key().to_string(),
                    InMemoryNamespace {
                        owner_digest: namespace.owner_digest(),
                        categories: HashMap::new(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        let mut namespaces = self.namespaces.write();
        match namespaces.get(namespace.key()) {
            Some(existing) => existing.check_owner(namespace)?,
            None => return Ok(false),
        }
        Ok(namespaces.remove(namespace.key()).is_some())
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        category: &str,
        records: &[MemoryRecord],
    ) -> Result<usize> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces.get_mut(namespace.key()).ok_or_else(|| {
            AppError::NotFound(format!("Namespace '{}' not found", namespace.key()))
        })?;
        ns.check_owner(namespace)?;

        let partition = ns.categories.entry(category.to_string()).or_default();
        for record in records {
            let mut stored = record.clone();
            stored.category = category.to_string();
            partition.insert(stored.id.clone(), stored);
        }

        Ok(records.len())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        category: &str,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome> {
        let namespaces = self.namespaces.read();
        let Some(ns) = namespaces.get(namespace.key()) else {
            return Ok(SearchOutcome::NoMemory);
        };
        ns.check_owner(namespace)?;

        let hits = ns
            .categories
            .get(category)
            .map(|records| {
                records
                    .values()
                    .map(|record| RetrievalHit {
                        id: record.id.clone(),
                        score: round_score(Self::lexical_similarity(query.trim(), &record.text)),
                        category: record.category.clone(),
                        text: record.text.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(SearchOutcome::Hits(rank_hits(hits, top_k)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: &str = "user_understanding";

    fn record(id: &str, text: &str) -> MemoryRecord {
        MemoryRecord::with_id(id, "sam", CATEGORY, text)
    }

    #[tokio::test]
    async fn test_inmemory_create_namespace_idempotent() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("Sam");

        assert!(store.create_namespace_if_absent(&ns).await.unwrap());
        assert!(!store.create_namespace_if_absent(&ns).await.unwrap());
        assert!(store.namespace_exists(&ns).await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_namespace_collision() {
        let store = InMemoryVectorStore::new();
        store
            .create_namespace_if_absent(&Namespace::for_user("sam.smith"))
            .await
            .unwrap();

        let result = store
            .create_namespace_if_absent(&Namespace::for_user("sam_smith"))
            .await;
        assert!(matches!(result, Err(AppError::NamespaceCollision(_))));
    }

    #[tokio::test]
    async fn test_inmemory_colliding_user_cannot_read_write_or_delete() {
        let store = InMemoryVectorStore::new();
        let owner = Namespace::for_user("Sam.Smith");
        let other = Namespace::for_user("sam_smith");
        assert_eq!(owner.key(), other.key());

        store.create_namespace_if_absent(&owner).await.unwrap();
        store
            .upsert(&owner, CATEGORY, &[record("r1", "my secret pin is 4242")])
            .await
            .unwrap();

        let search = store.search(&other, CATEGORY, "secret pin", 10).await;
        assert!(matches!(search, Err(AppError::NamespaceCollision(_))));

        let categories = vec![CATEGORY.to_string()];
        let merged = store
            .search_categories(&other, &categories, "secret pin", 10)
            .await;
        assert!(matches!(merged, Err(AppError::NamespaceCollision(_))));

        let upsert = store
            .upsert(&other, CATEGORY, &[record("r1", "overwritten")])
            .await;
        assert!(matches!(upsert, Err(AppError::NamespaceCollision(_))));

        let delete = store.delete_namespace(&other).await;
        assert!(matches!(delete, Err(AppError::NamespaceCollision(_))));

        assert_eq!(
            store.get(&owner, CATEGORY, "r1").unwrap().text,
            "my secret pin is 4242"
        );
    }

    #[tokio::test]
    async fn test_inmemory_search_missing_namespace_is_no_memory() {
        let store = InMemoryVectorStore::new();
        let outcome = store
            .search(&Namespace::for_user("nobody"), CATEGORY, "anything", 10)
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::NoMemory);
    }

    #[tokio::test]
    async fn test_inmemory_upsert_and_search_ranked() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();

        store
            .upsert(
                &ns,
                CATEGORY,
                &[
                    record("r1", "User has a meeting on Friday"),
                    record("r2", "User enjoys science fiction books"),
                    record("r3", "User's meeting room is on floor two"),
                ],
            )
            .await
            .unwrap();

        let outcome = store
            .search(&ns, CATEGORY, "meeting on Friday", 2)
            .await
            .unwrap();
        let hits = outcome.hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "r1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_inmemory_upsert_is_idempotent() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();

        let rec = record("r1", "User is called Sam");
        store.upsert(&ns, CATEGORY, &[rec.clone()]).await.unwrap();
        store.upsert(&ns, CATEGORY, &[rec]).await.unwrap();

        assert_eq!(store.count(&ns, CATEGORY), 1);
    }

    #[tokio::test]
    async fn test_inmemory_upsert_replaces_text() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();

        store
            .upsert(&ns, CATEGORY, &[record("r1", "Meeting on Friday")])
            .await
            .unwrap();
        store
            .upsert(&ns, CATEGORY, &[record("r1", "Meeting on Saturday")])
            .await
            .unwrap();

        let stored = store.get(&ns, CATEGORY, "r1").unwrap();
        assert_eq!(stored.text, "Meeting on Saturday");
        assert_eq!(store.count(&ns, CATEGORY), 1);
    }

    #[tokio::test]
    async fn test_inmemory_delete_namespace() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();

        assert!(store.delete_namespace(&ns).await.unwrap());
        assert!(!store.delete_namespace(&ns).await.unwrap());
        assert!(!store.namespace_exists(&ns).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_categories_merges_by_score() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::for_user("sam");
        store.create_namespace_if_absent(&ns).await.unwrap();
        store
            .upsert(&ns, CATEGORY, &[record("a", "likes tea")])
            .await
            .unwrap();
        store
            .upsert(&ns, "facts", &[record("b", "meeting on friday")])
            .await
            .unwrap();

        let categories = vec![CATEGORY.to_string(), "facts".to_string()];
        let outcome = store
            .search_categories(&ns, &categories, "meeting friday", 10)
            .await
            .unwrap();
        let hits = outcome.hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].category, "facts");
    }

    #[test]
    fn test_lexical_similarity() {
        assert!((InMemoryVectorStore::lexical_similarity("a b", "a b") - 1.0).abs() < 0.001);
        assert!(InMemoryVectorStore::lexical_similarity("a b", "c d").abs() < 0.001);
        assert_eq!(InMemoryVectorStore::lexical_similarity("", "a"), 0.0);
    }
}
