//! Commission read handler.
//!
//! Commissions belong to the BI line and are visible to its administrators
//! and managers only. Each successful view is audited synchronously by
//! default, so a lost audit write fails the request.

use axum::{
    Json,
    extract::{MatchedPath, Path, State},
    response::{IntoResponse, Response},
};
use portal_persistence::audit::{AuditLogEntry, COMMISSION_VIEW};
use portal_persistence::core::{SiloSession, SiloStore};
use portal_persistence::scope::{ScopedStatement, SqlValue, scoped_query};
use portal_persistence::silo::{Role, RouteRequirement, Silo};
use tracing::info;

use crate::error::{RestError, RestResult};
use crate::extractors::CurrentPrincipal;
use crate::pipeline::SiloPipeline;
use crate::state::AppState;

/// The commission route's requirement: silo BI, role Admin or BI_Manager.
pub fn commission_requirement() -> RouteRequirement {
    RouteRequirement::silo(Silo::BI).with_roles([Role::admin(), Role::bi_manager()])
}

/// Reads one commission record.
///
/// # HTTP Request
///
/// `GET [base]/bi/commissions/{id}`
///
/// # Response
///
/// - `200 OK` - The commission, after its audit entry was written
/// - `401 Unauthorized` - No principal
/// - `403 Forbidden` - Not BI, or role not Admin / BI_Manager
/// - `404 Not Found` - No such commission in BI
/// - `500 Internal Server Error` - Including a failed synchronous audit write
pub async fn read_commission_handler<S>(
    State(state): State<AppState<S>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    matched: MatchedPath,
    Path(id): Path<String>,
) -> RestResult<Response>
where
    S: SiloStore + 'static,
{
    let mut request =
        SiloPipeline::enter(state.storage(), principal.as_ref(), &commission_requirement()).await?;

    let (ctx, session) = request.parts();
    let sql = format!(
        "SELECT id, application_id, broker, amount, paid, silo FROM commissions WHERE id = {} AND {{silo_scope}}",
        session.backend_kind().dialect().placeholder(1)
    );
    let mut rows = scoped_query(session, ctx, &ScopedStatement::new(sql), vec![SqlValue::from(id.as_str())]).await?;

    let Some(row) = rows.pop() else {
        request.rollback().await?;
        return Err(RestError::NotFound {
            entity: "commission",
            id,
        });
    };
    let ctx = request.commit().await?;

    let entry = AuditLogEntry::new(&ctx, COMMISSION_VIEW, id.as_str())
        .with_metadata(serde_json::json!({ "route": matched.as_str() }));
    state.audit().record_audit(entry).await?;

    info!(
        silo = %ctx.silo(),
        principal_id = %ctx.principal_id(),
        commission_id = %id,
        "Commission viewed"
    );

    Ok(Json(serde_json::json!({ "commission": row.into_json() })).into_response())
}
