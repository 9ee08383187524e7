//! Silo-bound sessions for the SQLite backend.
//!
//! SQLite has no session variables, so the binding is a row in the
//! per-connection `temp.silo_session` table written inside the session's
//! transaction. Rolling back removes it with everything else; committing
//! deletes it first. The pool manager discards any connection that comes back
//! with an open transaction or a leftover binding row.

use async_trait::async_trait;
use r2d2::PooledConnection;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use tracing::{debug, warn};

use crate::core::{BackendKind, SiloSession};
use crate::error::{SessionError, StorageError, StorageResult};
use crate::scope::{ComposedStatement, ScopedRow};
use crate::silo::RequestSiloContext;

use super::backend::SiloConnectionManager;
use super::value::read_row;

/// Key of the binding row.
pub const BINDING_KEY: &str = "app.current_silo";

/// Binds the context's silo on `conn`.
///
/// Must run inside an open transaction so that a rollback clears it.
pub fn bind_session(conn: &Connection, context: &RequestSiloContext) -> Result<(), SessionError> {
    conn.execute(
        "INSERT OR REPLACE INTO temp.silo_session (key, value) VALUES (?1, ?2)",
        [BINDING_KEY, context.silo().as_str()],
    )
    .map_err(|e| SessionError::BindFailed {
        silo: context.silo(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// A SQLite transaction bound to one silo.
pub struct SqliteSession {
    conn: PooledConnection<SiloConnectionManager>,
    context: RequestSiloContext,
    active: bool,
}

impl std::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSession")
            .field("active", &self.active)
            .field("context", &self.context)
            .finish()
    }
}

impl SqliteSession {
    /// Opens a transaction on `conn` and binds the context's silo.
    pub(crate) fn begin(
        conn: PooledConnection<SiloConnectionManager>,
        context: RequestSiloContext,
    ) -> StorageResult<Self> {
        conn.execute_batch("BEGIN").map_err(|e| SessionError::BindFailed {
            silo: context.silo(),
            message: format!("Failed to begin transaction: {}", e),
        })?;

        if let Err(e) = bind_session(&conn, &context) {
            let _ = conn.execute_batch("ROLLBACK");
            warn!(silo = %context.silo(), error = %e, "Silo binding failed");
            return Err(e.into());
        }

        debug!(
            silo = %context.silo(),
            principal_id = %context.principal_id(),
            "SQLite session bound"
        );

        Ok(Self {
            conn,
            context,
            active: true,
        })
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(SessionError::Inactive.into())
        }
    }

    fn finish(&mut self, sql: &str) -> StorageResult<()> {
        self.ensure_active()?;
        self.active = false;
        if let Err(e) = self.conn.execute_batch(sql) {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(StorageError::Session(SessionError::FinishFailed {
                message: e.to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl SiloSession for SqliteSession {
    fn context(&self) -> &RequestSiloContext {
        &self.context
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn current_binding(&mut self) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM temp.silo_session WHERE key = ?1",
                [BINDING_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn fetch(&mut self, statement: &ComposedStatement) -> StorageResult<Vec<ScopedRow>> {
        self.ensure_active()?;
        let mut stmt = self.conn.prepare(statement.sql())?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(statement.params().iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row, &columns)?);
        }
        Ok(out)
    }

    async fn execute(&mut self, statement: &ComposedStatement) -> StorageResult<u64> {
        self.ensure_active()?;
        let affected = self
            .conn
            .execute(statement.sql(), params_from_iter(statement.params().iter()))?;
        Ok(affected as u64)
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.finish(
            "DELETE FROM temp.silo_session;
             COMMIT;",
        )?;
        debug!(silo = %self.context.silo(), "SQLite session committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.finish("ROLLBACK")?;
        debug!(silo = %self.context.silo(), "SQLite session rolled back");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        // If the session wasn't explicitly committed or rolled back, roll it back
        // before the connection goes back to the pool.
        if self.active {
            warn!(
                silo = %self.context.silo(),
                principal_id = %self.context.principal_id(),
                "SQLite session dropped while active; rolling back"
            );
            let _ = self.conn.execute_batch("ROLLBACK");
            let _ = self.conn.execute_batch("DELETE FROM temp.silo_session");
        }
    }
}
