//! API Server Module
//!
//! Application state and server startup logic.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::registration::RegistrationService;

/// Combined application state for all API endpoints
pub struct AppState {
    /// The registration pipeline
    pub registration: Arc<RegistrationService>,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Create new application state around a registration service
    pub fn new(registration: Arc<RegistrationService>) -> SharedAppState {
        Arc::new(Self { registration })
    }
}

/// Start the HTTP server on the given port
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let origin = state.registration.origin().to_string();
    let app = super::routes::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== SCITT Transparency Log ===");
    println!("Origin: {}", origin);
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /entries                          - Register a signed statement");
    println!("  GET  /entries/:index                   - Receipt for an entry");
    println!("  GET  /checkpoint                       - Signed checkpoint note");
    println!("  GET  /.well-known/scitt-configuration  - Service configuration");
    println!("  GET  /.well-known/scitt-keys           - COSE key set");
    println!("  GET  /health                           - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
