//! API Layer Module
//!
//! HTTP surface of the transparency service: registration, receipt
//! retrieval, checkpoints, and the well-known discovery endpoints.

pub mod routes;
pub mod server;

// Re-exports for convenience
pub use routes::create_router;
pub use server::{start_server, AppState, SharedAppState};
