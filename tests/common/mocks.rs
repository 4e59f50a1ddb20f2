//! Test doubles shared by the integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use smriti::db::{InMemoryVectorStore, Namespace, VectorStore};
use smriti::llm::LLMClient;
use smriti::memory::{MemoryRecord, SearchOutcome};
use smriti::types::{AppError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Completion client that replays scripted replies in order.
///
/// Once the script is exhausted every call fails, so an unexpected extra
/// call shows up as an error instead of a silent default.
pub struct ScriptedLLM {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(AppError::LLM(message.to_string()))])),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock()[index].clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::LLM("no scripted reply left".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory index that counts every call made against it.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryVectorStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    fn provider_name(&self) -> &'static str {
        "counting"
    }

    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        self.hit();
        self.inner.namespace_exists(namespace).await
    }

    async fn create_namespace_if_absent(&self, namespace: &Namespace) -> Result<bool> {
        self.hit();
        self.inner.create_namespace_if_absent(namespace).await
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        self.hit();
        self.inner.delete_namespace(namespace).await
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        category: &str,
        records: &[MemoryRecord],
    ) -> Result<usize> {
        self.hit();
        self.inner.upsert(namespace, category, records).await
    }

    async fn search(
        &self,
        namespace: &Namespace,
        category: &str,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome> {
        self.hit();
        self.inner.search(namespace, category, query, top_k).await
    }
}

/// In-memory index whose searches always fail, as if the data plane were down.
#[derive(Default)]
pub struct SearchDownStore {
    pub inner: InMemoryVectorStore,
}

#[async_trait]
impl VectorStore for SearchDownStore {
    fn provider_name(&self) -> &'static str {
        "search-down"
    }

    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        self.inner.namespace_exists(namespace).await
    }

    async fn create_namespace_if_absent(&self, namespace: &Namespace) -> Result<bool> {
        self.inner.create_namespace_if_absent(namespace).await
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        self.inner.delete_namespace(namespace).await
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        category: &str,
        records: &[MemoryRecord],
    ) -> Result<usize> {
        self.inner.upsert(namespace, category, records).await
    }

    async fn search(
        &self,
        _namespace: &Namespace,
        _category: &str,
        _query: &str,
        _top_k: usize,
    ) -> Result<SearchOutcome> {
        Err(AppError::VectorStore("search unavailable (503)".to_string()))
    }
}
