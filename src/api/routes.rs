//! API Route Handlers
//!
//! REST endpoints for the transparency service:
//! - POST /entries - Register a signed statement, returns receipt bytes
//! - GET /entries/:index - Receipt for an existing entry
//! - GET /checkpoint - Signed checkpoint note (text/plain)
//! - GET /.well-known/scitt-configuration - Service configuration (JSON)
//! - GET /.well-known/scitt-keys - COSE key set (CBOR)
//! - GET /health - Health check

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::server::SharedAppState;
use crate::common::error::ScittError;
use crate::cose::cose_key_set;

/// Content type for COSE messages.
const APPLICATION_COSE: &str = "application/cose";

/// Create the API router
pub fn create_router(state: SharedAppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/entries", post(handle_register))
        .route("/entries/:index", get(handle_get_entry))
        .route("/checkpoint", get(handle_checkpoint))
        .route(
            "/.well-known/scitt-configuration",
            get(handle_configuration),
        )
        .route("/.well-known/scitt-keys", get(handle_keys))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Map a service error onto its transport status and JSON body.
fn error_response(err: &ScittError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "error": err.error_code(),
        "details": err.to_string(),
    });
    (status, Json(body)).into_response()
}

/// POST /entries
///
/// Body: COSE Sign1 statement bytes. Returns 201 with the receipt bytes.
async fn handle_register(State(state): State<SharedAppState>, body: Bytes) -> Response {
    match state.registration.register(&body).await {
        Ok(receipt) => (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, APPLICATION_COSE)],
            receipt,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /entries/:index
///
/// Returns a fresh receipt for the entry, against the current tree head.
async fn handle_get_entry(
    State(state): State<SharedAppState>,
    Path(index): Path<u64>,
) -> Response {
    match state.registration.receipt_for_entry(index).await {
        Ok(receipt) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, APPLICATION_COSE)],
            receipt,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /checkpoint
///
/// Returns the signed-note form of the current checkpoint.
async fn handle_checkpoint(State(state): State<SharedAppState>) -> Response {
    match state.registration.checkpoint().await {
        Ok(signed) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            signed.to_note(),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /.well-known/scitt-configuration
async fn handle_configuration(State(state): State<SharedAppState>) -> Response {
    Json(serde_json::json!({
        "issuer": state.registration.origin(),
        "supported_algorithms": ["ES256"],
        "supported_hash_algorithms": ["sha-256"],
        "registration_policy": state.registration.policy_name(),
    }))
    .into_response()
}

/// GET /.well-known/scitt-keys
///
/// COSE Key Set receipt verifiers use to locate the service key by kid.
async fn handle_keys(State(state): State<SharedAppState>) -> Response {
    match cose_key_set(&[state.registration.verifying_key()]) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/cbor")],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(&ScittError::inconsistency(format!(
            "key set encoding: {e}"
        ))),
    }
}

/// GET /health
async fn handle_health(State(state): State<SharedAppState>) -> Response {
    let tree_size = state.registration.tree_size().await;
    Json(serde_json::json!({
        "status": "healthy",
        "service": "scitt-log",
        "version": env!("CARGO_PKG_VERSION"),
        "tree_size": tree_size,
        "writes_enabled": !state.registration.is_poisoned(),
    }))
    .into_response()
}
