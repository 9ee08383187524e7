//! Portal route configuration.

use axum::{Router, routing::get};
use portal_persistence::core::SiloStore;

use crate::handlers;
use crate::state::AppState;

/// Creates all portal routes.
///
/// # Routes
///
/// ## Unscoped
/// - `GET /health` - Health check
/// - `GET /_liveness` - Liveness probe
///
/// ## Silo-scoped (`{silo}` is `bf`, `bi` or `slf`)
/// - `GET /{silo}/contacts` - Contacts of the caller's silo
/// - `GET /{silo}/applications/{id}` - One loan application, audited
///
/// ## BI only, Admin or BI_Manager
/// - `GET /bi/commissions/{id}` - One commission, audited synchronously
pub fn create_routes<S>(state: AppState<S>) -> Router
where
    S: SiloStore + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_handler::<S>))
        .route("/_liveness", get(handlers::liveness_handler))
        .route("/{silo}/contacts", get(handlers::list_contacts_handler::<S>))
        .route(
            "/{silo}/applications/{id}",
            get(handlers::read_application_handler::<S>),
        )
        .route(
            "/bi/commissions/{id}",
            get(handlers::read_commission_handler::<S>),
        )
        .with_state(state)
}
