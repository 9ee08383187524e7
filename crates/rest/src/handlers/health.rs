//! Health check endpoint handlers.
//!
//! Provides health endpoints for monitoring and load balancers. They sit
//! outside the silo pipeline and touch no silo data.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portal_persistence::core::SiloStore;
use tracing::{debug, warn};

use crate::state::AppState;

/// Handler for the health check endpoint.
///
/// # HTTP Request
///
/// `GET [base]/health`
///
/// # Response
///
/// - `200 OK` - Server and backend are healthy
/// - `503 Service Unavailable` - Backend health check failed
pub async fn health_handler<S>(State(state): State<AppState<S>>) -> Response
where
    S: SiloStore + 'static,
{
    debug!("Processing health check request");

    let backend_name = state.storage().backend_name();
    let (status, label) = match state.storage().health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(backend = backend_name, error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    let body = serde_json::json!({
        "status": label,
        "backend": backend_name,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (status, Json(body)).into_response()
}

/// Handler for a liveness probe.
///
/// # HTTP Request
///
/// `GET [base]/_liveness`
pub async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}
