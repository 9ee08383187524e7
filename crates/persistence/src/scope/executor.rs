//! Executes scoped statements on a silo-bound session.
//!
//! Before anything runs, the executor checks that the session was bound for
//! the same silo as the caller's context and that the connection still
//! reports that binding. After a query, every row must expose the `silo`
//! column and carry the bound silo. A missing column or a mismatch fails
//! closed.

use tracing::{debug, warn};

use super::insert::ScopedInsert;
use super::row::ScopedRow;
use super::statement::{ComposedStatement, SILO_COLUMN, ScopedStatement};
use super::value::SqlValue;
use crate::core::SiloSession;
use crate::error::{ScopeError, SessionError, StorageResult};
use crate::silo::RequestSiloContext;

/// Runs a scoped query and returns rows that all belong to the context's silo.
pub async fn scoped_query<S>(
    session: &mut S,
    context: &RequestSiloContext,
    statement: &ScopedStatement,
    params: Vec<SqlValue>,
) -> StorageResult<Vec<ScopedRow>>
where
    S: SiloSession + ?Sized,
{
    let composed = prepare(session, context, statement, params).await?;
    let rows = session.fetch(&composed).await?;
    verify_rows(context, &rows)?;

    debug!(
        silo = %context.silo(),
        principal_id = %context.principal_id(),
        rows = rows.len(),
        "Scoped query complete"
    );
    Ok(rows)
}

/// Runs a scoped `UPDATE` or `DELETE` and returns the number of affected rows.
pub async fn scoped_execute<S>(
    session: &mut S,
    context: &RequestSiloContext,
    statement: &ScopedStatement,
    params: Vec<SqlValue>,
) -> StorageResult<u64>
where
    S: SiloSession + ?Sized,
{
    let composed = prepare(session, context, statement, params).await?;
    let affected = session.execute(&composed).await?;

    debug!(
        silo = %context.silo(),
        principal_id = %context.principal_id(),
        affected,
        "Scoped statement complete"
    );
    Ok(affected)
}

/// Inserts a row whose `silo` column is taken from the context.
pub async fn scoped_insert<S>(
    session: &mut S,
    context: &RequestSiloContext,
    insert: &ScopedInsert,
) -> StorageResult<u64>
where
    S: SiloSession + ?Sized,
{
    ensure_bound(session, context).await?;
    let composed = insert.compose(session.backend_kind().dialect(), context.silo())?;
    let affected = session.execute(&composed).await?;

    debug!(
        silo = %context.silo(),
        table = insert.table(),
        "Scoped insert complete"
    );
    Ok(affected)
}

async fn prepare<S>(
    session: &mut S,
    context: &RequestSiloContext,
    statement: &ScopedStatement,
    params: Vec<SqlValue>,
) -> StorageResult<ComposedStatement>
where
    S: SiloSession + ?Sized,
{
    let composed = statement
        .compose(session.backend_kind().dialect(), context.silo(), params)
        .inspect_err(|e| {
            warn!(
                silo = %context.silo(),
                principal_id = %context.principal_id(),
                error = %e,
                "Rejected ambiguous statement"
            );
        })?;
    ensure_bound(session, context).await?;
    Ok(composed)
}

/// Refuses to run unless the session is active and bound to the context's silo.
async fn ensure_bound<S>(session: &mut S, context: &RequestSiloContext) -> StorageResult<()>
where
    S: SiloSession + ?Sized,
{
    if !session.is_active() {
        return Err(SessionError::Inactive.into());
    }

    let expected = context.silo();
    if session.context().silo() != expected {
        warn!(
            expected = %expected,
            session_silo = %session.context().silo(),
            "Session belongs to a different silo"
        );
        return Err(SessionError::BindingMismatch {
            expected,
            found: Some(session.context().silo().to_string()),
        }
        .into());
    }

    let found = session.current_binding().await?;
    if found.as_deref() != Some(expected.as_str()) {
        warn!(
            expected = %expected,
            found = ?found,
            "Connection binding does not match context"
        );
        return Err(SessionError::BindingMismatch { expected, found }.into());
    }
    Ok(())
}

fn verify_rows(context: &RequestSiloContext, rows: &[ScopedRow]) -> Result<(), ScopeError> {
    let expected = context.silo();
    for row in rows {
        let Some(value) = row.get(SILO_COLUMN) else {
            warn!(expected = %expected, "Row without silo column");
            return Err(ScopeError::RowMissingScope);
        };
        if value.as_str() != Some(expected.as_str()) {
            let found = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            warn!(expected = %expected, found = %found, "Row outside bound silo");
            return Err(ScopeError::RowOutsideScope { expected, found });
        }
    }
    Ok(())
}
