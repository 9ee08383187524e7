//! Loan application read handler.

use axum::{
    Json,
    extract::{MatchedPath, Path, State},
    response::{IntoResponse, Response},
};
use portal_persistence::audit::{APPLICATION_VIEW, AuditLogEntry};
use portal_persistence::core::{SiloSession, SiloStore};
use portal_persistence::scope::{ScopedStatement, SqlValue, scoped_query};
use portal_persistence::silo::RouteRequirement;

use crate::error::{RestError, RestResult};
use crate::extractors::CurrentPrincipal;
use crate::pipeline::SiloPipeline;
use crate::state::AppState;

use super::route_silo;

/// Reads one loan application of the caller's silo and audits the view.
///
/// # HTTP Request
///
/// `GET [base]/{silo}/applications/{id}`
///
/// # Response
///
/// - `200 OK` - The application
/// - `401 Unauthorized` - No principal
/// - `403 Forbidden` - Path silo differs from the principal's silo
/// - `404 Not Found` - No such application in the caller's silo
pub async fn read_application_handler<S>(
    State(state): State<AppState<S>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    matched: MatchedPath,
    Path((segment, id)): Path<(String, String)>,
) -> RestResult<Response>
where
    S: SiloStore + 'static,
{
    let requirement = RouteRequirement::silo(route_silo(&segment)?);
    let mut request = SiloPipeline::enter(state.storage(), principal.as_ref(), &requirement).await?;

    let (ctx, session) = request.parts();
    let sql = format!(
        "SELECT id, contact_id, status, amount, silo FROM loan_applications WHERE id = {} AND {{silo_scope}}",
        session.backend_kind().dialect().placeholder(1)
    );
    let mut rows = scoped_query(session, ctx, &ScopedStatement::new(sql), vec![SqlValue::from(id.as_str())]).await?;

    let Some(row) = rows.pop() else {
        request.rollback().await?;
        return Err(RestError::NotFound {
            entity: "application",
            id,
        });
    };
    let ctx = request.commit().await?;

    let entry = AuditLogEntry::new(&ctx, APPLICATION_VIEW, id.as_str())
        .with_metadata(serde_json::json!({ "route": matched.as_str() }));
    state.audit().record_audit(entry).await?;

    Ok(Json(serde_json::json!({ "application": row.into_json() })).into_response())
}
