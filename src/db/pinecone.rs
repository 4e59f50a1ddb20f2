//! Pinecone vector database integration.
//!
//! Each user namespace is one Pinecone index created for an integrated
//! embedding model, so records are written and searched as plain text.
//! Categories map onto Pinecone namespaces inside the index.
//!
//! Control-plane calls (describe / create / delete index) go to
//! `control_url`; data-plane calls (records upsert / search) go to the host
//! returned when describing the index.

use crate::db::namespace::Namespace;
use crate::db::vectorstore::{rank_hits, VectorStore};
use crate::memory::model::{
    is_valid_category, round_score, MemoryRecord, RetrievalHit, SearchOutcome,
};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Index tag holding the owner digest.
const OWNER_TAG: &str = "owner_digest";

/// Record field the integrated embedding reads from.
const TEXT_FIELD: &str = "chunk_text";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connection settings for [`PineconeStore`].
#[derive(Debug, Clone)]
pub struct PineconeOptions {
    pub api_key: String,
    pub control_url: String,
    pub cloud: String,
    pub region: String,
    pub embed_model: String,
    pub api_version: String,
    pub timeout: Option<Duration>,
    pub ready_timeout: Duration,
}

/// Pinecone-backed vector store.
pub struct PineconeStore {
    http: reqwest::Client,
    options: PineconeOptions,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct CreateForModelRequest<'a> {
    name: &'a str,
    cloud: &'a str,
    region: &'a str,
    embed: EmbedSpec<'a>,
    tags: HashMap<&'a str, String>,
}

#[derive(Debug, Serialize)]
struct EmbedSpec<'a> {
    model: &'a str,
    field_map: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertRecord<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    chunk_text: &'a str,
    category: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResultBody,
}

#[derive(Debug, Deserialize)]
struct SearchResultBody {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f32,
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
}

impl PineconeStore {
    pub fn new(options: PineconeOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppError::VectorStore(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, options })
    }

    fn control(&self, path: &str) -> String {
        format!("{}{}", self.options.control_url.trim_end_matches('/'), path)
    }

    fn data_url(host: &str, path: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host.trim_end_matches('/'), path)
        } else {
            format!("https://{}{}", host.trim_end_matches('/'), path)
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Api-Key", &self.options.api_key)
            .header("X-Pinecone-API-Version", &self.options.api_version)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| AppError::VectorStore(format!("Pinecone request failed: {}", e)))
    }

    async fn fail(context: &str, response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        AppError::VectorStore(format!("{} ({}): {}", context, status, body))
    }

    /// Describe an index, `None` if it does not exist.
    async fn describe(&self, namespace: &Namespace) -> Result<Option<IndexDescription>> {
        let url = self.control(&format!("/indexes/{}", namespace.key()));
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<IndexDescription>()
                .await
                .map(Some)
                .map_err(|e| AppError::VectorStore(format!("Invalid index description: {}", e))),
            _ => Err(Self::fail("Failed to describe index", response).await),
        }
    }

    async fn wait_until_ready(&self, namespace: &Namespace) -> Result<()> {
        let started = Instant::now();
        loop {
            if let Some(description) = self.describe(namespace).await? {
                if description.status.map(|s| s.ready).unwrap_or(true) {
                    return Ok(());
                }
            }
            if started.elapsed() >= self.options.ready_timeout {
                return Err(AppError::VectorStore(format!(
                    "Index '{}' not ready after {:?}",
                    namespace.key(),
                    self.options.ready_timeout
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    fn check_owner(namespace: &Namespace, description: &IndexDescription) -> Result<()> {
        let recorded = description
            .tags
            .as_ref()
            .and_then(|tags| tags.get(OWNER_TAG));

        match recorded {
            Some(digest) if *digest != namespace.owner_digest() => {
                Err(AppError::NamespaceCollision(format!(
                    "Index '{}' already belongs to a different user",
                    namespace.key()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Describe an index and make sure it belongs to `namespace`'s owner.
    async fn describe_owned(&self, namespace: &Namespace) -> Result<Option<IndexDescription>> {
        let description = self.describe(namespace).await?;
        if let Some(description) = &description {
            Self::check_owner(namespace, description)?;
        }
        Ok(description)
    }

    /// Categories become URL path segments on the data plane.
    fn category_segment(category: &str) -> Result<&str> {
        if is_valid_category(category) {
            Ok(category)
        } else {
            Err(AppError::InvalidInput(format!(
                "Invalid memory category '{}'",
                category
            )))
        }
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn provider_name(&self) -> &'static str {
        "pinecone"
    }

    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        Ok(self.describe(namespace).await?.is_some())
    }

    async fn create_namespace_if_absent(&self, namespace: &Namespace) -> Result<bool> {
        if let Some(description) = self.describe(namespace).await? {
            Self::check_owner(namespace, &description)?;
            return Ok(false);
        }

        let body = CreateForModelRequest {
            name: namespace.key(),
            cloud: &self.options.cloud,
            region: &self.options.region,
            embed: EmbedSpec {
                model: &self.options.embed_model,
                field_map: HashMap::from([("text", TEXT_FIELD)]),
            },
            tags: HashMap::from([(OWNER_TAG, namespace.owner_digest())]),
        };

        let url = self.control("/indexes/create-for-model");
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?;

        let created = match response.status() {
            status if status.is_success() => true,
            // Created concurrently by another request.
            StatusCode::CONFLICT => false,
            _ => return Err(Self::fail("Failed to create index", response).await),
        };

        if !created {
            if let Some(description) = self.describe(namespace).await? {
                Self::check_owner(namespace, &description)?;
            }
        }

        self.wait_until_ready(namespace).await?;
        tracing::info!(namespace = %namespace, created, "Index ready");
        Ok(created)
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        if self.describe_owned(namespace).await?.is_none() {
            return Ok(false);
        }

        let url = self.control(&format!("/indexes/{}", namespace.key()));
        let response = self.send(self.request(reqwest::Method::DELETE, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::fail("Failed to delete index", response).await),
        }
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        category: &str,
        records: &[MemoryRecord],
    ) -> Result<usize> {
        let category = Self::category_segment(category)?;
        if records.is_empty() {
            return Ok(0);
        }

        let description = self.describe_owned(namespace).await?.ok_or_else(|| {
            AppError::NotFound(format!("Index '{}' not found", namespace.key()))
        })?;

        let mut body = String::new();
        for record in records {
            let line = serde_json::to_string(&UpsertRecord {
                id: &record.id,
                chunk_text: &record.text,
                category,
            })
            .map_err(|e| AppError::Internal(format!("Failed to encode record: {}", e)))?;
            body.push_str(&line);
            body.push('\n');
        }

        let url = Self::data_url(
            &description.host,
            &format!("/records/namespaces/{}/upsert", category),
        );
        let response = self
            .send(
                self.request(reqwest::Method::POST, url)
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail("Failed to upsert records", response).await);
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
        let category = Self::category_segment(category)?;
        let Some(description) = self.describe_owned(namespace).await? else {
            return Ok(SearchOutcome::NoMemory);
        };

        let body = serde_json::json!({
            "query": {
                "top_k": top_k,
                "inputs": { "text": query.trim() }
            },
            "fields": [TEXT_FIELD, "category"]
        });

        let url = Self::data_url(
            &description.host,
            &format!("/records/namespaces/{}/search", category),
        );
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?;

        // A category nobody has written to yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(SearchOutcome::Hits(Vec::new()));
        }
        if !response.status().is_success() {
            return Err(Self::fail("Failed to search records", response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::VectorStore(format!("Invalid search response: {}", e)))?;

        let field = |fields: &HashMap<String, serde_json::Value>, name: &str| {
            fields
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let hits = parsed
            .result
            .hits
            .into_iter()
            .map(|hit| RetrievalHit {
                score: round_score(hit.score),
                category: field(&hit.fields, "category"),
                text: field(&hit.fields, TEXT_FIELD),
                id: hit.id,
            })
            .collect();

        Ok(SearchOutcome::Hits(rank_hits(hits, top_k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> PineconeStore {
        PineconeStore::new(PineconeOptions {
            api_key: "test-key".into(),
            control_url: server.uri(),
            cloud: "aws".into(),
            region: "us-east-1".into(),
            embed_model: "llama-text-embed-v2".into(),
            api_version: "2025-01".into(),
            timeout: Some(Duration::from_secs(5)),
            ready_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn description(server: &MockServer, ns: &Namespace) -> serde_json::Value {
        json!({
            "name": ns.key(),
            "host": server.uri(),
            "tags": { "owner_digest": ns.owner_digest() },
            "status": { "ready": true, "state": "Ready" }
        })
    }

    #[tokio::test]
    async fn test_search_missing_index_is_no_memory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let outcome = store
            .search(&Namespace::for_user("Sam"), "user_understanding", "hi", 10)
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::NoMemory);
    }

    #[tokio::test]
    async fn test_search_rounds_scores_and_maps_fields() {
        let server = MockServer::start().await;
        let ns = Namespace::for_user("sam");
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .and(header("Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &ns)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/user_understanding/search"))
            .and(body_partial_json(json!({"query": {"top_k": 5, "inputs": {"text": "meeting"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "hits": [
                    { "_id": "r2", "_score": 0.41234, "fields": { "chunk_text": "Likes tea", "category": "user_understanding" } },
                    { "_id": "r1", "_score": 0.87654, "fields": { "chunk_text": "Meeting on Friday", "category": "user_understanding" } }
                ]},
                "usage": { "read_units": 1 }
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let outcome = store
            .search(&ns, "user_understanding", "  meeting ", 5)
            .await
            .unwrap();

        let hits = outcome.hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "r1");
        assert_eq!(hits[0].score, 0.88);
        assert_eq!(hits[0].text, "Meeting on Friday");
        assert_eq!(hits[1].score, 0.41);
    }

    #[tokio::test]
    async fn test_create_if_absent_creates_with_owner_tag() {
        let server = MockServer::start().await;
        let ns = Namespace::for_user("sam");

        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes/create-for-model"))
            .and(body_partial_json(json!({
                "name": "sam",
                "cloud": "aws",
                "region": "us-east-1",
                "embed": { "model": "llama-text-embed-v2", "field_map": { "text": "chunk_text" } },
                "tags": { "owner_digest": ns.owner_digest() }
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &ns)))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.create_namespace_if_absent(&ns).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_if_absent_existing_is_noop() {
        let server = MockServer::start().await;
        let ns = Namespace::for_user("sam");
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &ns)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes/create-for-model"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(!store.create_namespace_if_absent(&ns).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_if_absent_detects_collision() {
        let server = MockServer::start().await;
        let owner = Namespace::for_user("sam.smith");
        let intruder = Namespace::for_user("sam_smith");
        Mock::given(method("GET"))
            .and(path("/indexes/sam-smith"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &owner)))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let result = store.create_namespace_if_absent(&intruder).await;
        assert!(matches!(result, Err(AppError::NamespaceCollision(_))));
    }

    #[tokio::test]
    async fn test_upsert_sends_ndjson_records() {
        let server = MockServer::start().await;
        let ns = Namespace::for_user("sam");
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &ns)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/facts/upsert"))
            .and(header("content-type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let written = store
            .upsert(
                &ns,
                "facts",
                &[MemoryRecord::with_id("r1", "sam", "facts", "Meeting on Saturday")],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);

        let requests = server.received_requests().await.unwrap();
        let upsert = requests
            .iter()
            .find(|r| r.url.path().ends_with("/upsert"))
            .unwrap();
        let line: serde_json::Value =
            serde_json::from_slice(upsert.body.split(|b| *b == b'\n').next().unwrap()).unwrap();
        assert_eq!(
            line,
            json!({"_id": "r1", "chunk_text": "Meeting on Saturday", "category": "facts"})
        );
    }

    #[tokio::test]
    async fn test_delete_namespace() {
        let server = MockServer::start().await;
        let ns = Namespace::for_user("sam");
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &ns)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/indexes/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.delete_namespace(&ns).await.unwrap());
        assert!(!store.delete_namespace(&Namespace::for_user("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_colliding_user_is_refused_on_every_operation() {
        let server = MockServer::start().await;
        let owner = Namespace::for_user("Sam.Smith");
        let intruder = Namespace::for_user("sam_smith");
        Mock::given(method("GET"))
            .and(path("/indexes/sam-smith"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, &owner)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/user_understanding/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"hits": []}})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/user_understanding/upsert"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/indexes/sam-smith"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let search = store
            .search(&intruder, "user_understanding", "secret pin", 10)
            .await;
        assert!(matches!(search, Err(AppError::NamespaceCollision(_))));

        let upsert = store
            .upsert(
                &intruder,
                "user_understanding",
                &[MemoryRecord::with_id("r1", "sam_smith", "user_understanding", "x")],
            )
            .await;
        assert!(matches!(upsert, Err(AppError::NamespaceCollision(_))));

        let delete = store.delete_namespace(&intruder).await;
        assert!(matches!(delete, Err(AppError::NamespaceCollision(_))));
    }

    #[tokio::test]
    async fn test_invalid_category_never_reaches_the_data_plane() {
        let server = MockServer::start().await;
        let store = store_for(&server);
        let ns = Namespace::for_user("sam");

        let search = store.search(&ns, "../../indexes", "hi", 5).await;
        assert!(matches!(search, Err(AppError::InvalidInput(_))));

        let upsert = store
            .upsert(
                &ns,
                "facts?x=1",
                &[MemoryRecord::with_id("r1", "sam", "facts", "x")],
            )
            .await;
        assert!(matches!(upsert, Err(AppError::InvalidInput(_))));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_is_vector_store_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/sam"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let result = store.namespace_exists(&Namespace::for_user("sam")).await;
        assert!(matches!(result, Err(AppError::VectorStore(msg)) if msg.contains("boom")));
    }
}
