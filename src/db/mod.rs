//! Per-user memory index.
//!
//! - [`namespace`]: user identifier to index name mapping
//! - [`vectorstore`]: the [`VectorStore`] trait and the in-memory backend
//! - [`pinecone`]: hosted Pinecone backend with integrated embedding
//!
//! Select the backend in `smriti.toml`:
//! ```toml
//! [index]
//! type = "pinecone"   # or "memory"
//! ```

#![allow(missing_docs)]

pub mod namespace;
pub mod pinecone;
pub mod vectorstore;

// Re-exports
pub use namespace::{sanitize_namespace_key, Namespace};
pub use pinecone::{PineconeOptions, PineconeStore};
pub use vectorstore::{InMemoryVectorStore, VectorStore, VectorStoreProvider};
