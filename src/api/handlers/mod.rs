//! API request handlers.

/// Memory-grounded chat.
pub mod chat;
/// Welcome and liveness endpoints.
pub mod health;
/// Memory add, search and delete.
pub mod memory;
