//! HTTP API Handlers and Routes
//!
//! The REST layer, built on Axum. Handlers validate input and delegate to
//! the chat orchestrator or the memory manager immediately.
//!
//! # API Endpoints
//!
//! - `GET /` - Welcome message
//! - `GET /health` - Liveness probe
//! - `POST /chat` - Memory-grounded chat response
//! - `POST /memory/add` - Submit a conversation thread for memory extraction
//! - `POST /memory/search` - Search a user's memory
//! - `DELETE /memory/{user_id}` - Delete a user's memory
//!
//! # OpenAPI Documentation
//!
//! The OpenAPI document is served at `/api-docs/openapi.json`; with the
//! `swagger-ui` feature, interactive documentation is at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
