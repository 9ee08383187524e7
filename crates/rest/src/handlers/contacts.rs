//! Contact listing handler.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use portal_persistence::core::SiloStore;
use portal_persistence::scope::{ScopedStatement, scoped_query};
use portal_persistence::silo::RouteRequirement;
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::CurrentPrincipal;
use crate::pipeline::SiloPipeline;
use crate::state::AppState;

use super::route_silo;

/// Lists the contacts of the caller's silo.
///
/// # HTTP Request
///
/// `GET [base]/{silo}/contacts`
///
/// # Response
///
/// - `200 OK` - `{"silo": ..., "contacts": [...]}`
/// - `401 Unauthorized` - No principal
/// - `403 Forbidden` - Path silo differs from the principal's silo
/// - `404 Not Found` - Unknown silo prefix
pub async fn list_contacts_handler<S>(
    State(state): State<AppState<S>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(segment): Path<String>,
) -> RestResult<Response>
where
    S: SiloStore + 'static,
{
    let requirement = RouteRequirement::silo(route_silo(&segment)?);
    let mut request = SiloPipeline::enter(state.storage(), principal.as_ref(), &requirement).await?;

    let (ctx, session) = request.parts();
    let rows = scoped_query(
        session,
        ctx,
        &ScopedStatement::new("SELECT id, name, email, silo FROM contacts WHERE {silo_scope} ORDER BY id"),
        vec![],
    )
    .await?;
    let ctx = request.commit().await?;

    debug!(silo = %ctx.silo(), count = rows.len(), "Listed contacts");

    let contacts: Vec<_> = rows.into_iter().map(|r| r.into_json()).collect();
    Ok(Json(serde_json::json!({
        "silo": ctx.silo(),
        "contacts": contacts,
    }))
    .into_response())
}
