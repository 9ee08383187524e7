//! Silo-bound sessions for the PostgreSQL backend.
//!
//! The binding is the transaction-local setting `app.current_silo`, set with
//! `set_config(..., true)` right after `BEGIN` on the same client. It vanishes
//! at `COMMIT` or `ROLLBACK`. Row-level security policies on the silo tables
//! compare against it, so a statement without a binding sees nothing.
//!
//! A session dropped while active cannot roll back (no async in `Drop`), so
//! its client is detached from the pool and closed instead of reused.

use async_trait::async_trait;
use deadpool_postgres::Client;
use tokio_postgres::types::ToSql;
use tracing::{debug, warn};

use crate::core::{BackendKind, SiloSession};
use crate::error::{SessionError, StorageError, StorageResult};
use crate::scope::{ComposedStatement, ScopedRow};
use crate::silo::RequestSiloContext;

use super::value::{BoxedParam, read_row, to_param};

/// Name of the transaction-local setting that carries the silo.
pub const BINDING_SETTING: &str = "app.current_silo";

/// Binds the context's silo on `client` for the current transaction.
pub async fn bind_session(
    client: &tokio_postgres::Client,
    context: &RequestSiloContext,
) -> Result<(), SessionError> {
    client
        .query_one(
            "SELECT set_config($1, $2, true)",
            &[&BINDING_SETTING, &context.silo().as_str()],
        )
        .await
        .map_err(|e| SessionError::BindFailed {
            silo: context.silo(),
            message: e.to_string(),
        })?;
    Ok(())
}

/// A PostgreSQL transaction bound to one silo.
pub struct PostgresSession {
    /// Option so commit, rollback and drop can take it.
    client: Option<Client>,
    context: RequestSiloContext,
    active: bool,
}

impl std::fmt::Debug for PostgresSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSession")
            .field("active", &self.active)
            .field("context", &self.context)
            .finish()
    }
}

impl PostgresSession {
    /// Opens a transaction, binds the silo and applies the statement timeout.
    pub(crate) async fn begin(
        client: Client,
        context: RequestSiloContext,
        statement_timeout_ms: u64,
    ) -> StorageResult<Self> {
        let mut session = Self {
            client: None,
            context,
            active: false,
        };

        client.batch_execute("BEGIN").await.map_err(|e| SessionError::BindFailed {
            silo: session.context.silo(),
            message: format!("Failed to begin transaction: {}", e),
        })?;
        session.client = Some(client);
        session.active = true;

        let bound = match session.client.as_ref() {
            Some(client) => {
                let timeout = statement_timeout_ms.to_string();
                match bind_session(client, &session.context).await {
                    Ok(()) => client
                        .query_one("SELECT set_config('statement_timeout', $1, true)", &[&timeout])
                        .await
                        .map(|_| ())
                        .map_err(|e| SessionError::BindFailed {
                            silo: session.context.silo(),
                            message: format!("Failed to set statement_timeout: {}", e),
                        }),
                    Err(e) => Err(e),
                }
            }
            None => Err(SessionError::Inactive),
        };

        if let Err(e) = bound {
            warn!(silo = %session.context.silo(), error = %e, "Silo binding failed");
            // Dropping an active session detaches the client.
            drop(session);
            return Err(e.into());
        }

        debug!(
            silo = %session.context.silo(),
            principal_id = %session.context.principal_id(),
            "PostgreSQL session bound"
        );
        Ok(session)
    }

    fn client(&self) -> StorageResult<&Client> {
        match (&self.client, self.active) {
            (Some(client), true) => Ok(client),
            _ => Err(SessionError::Inactive.into()),
        }
    }

    async fn finish(&mut self, sql: &str) -> StorageResult<()> {
        let client = self.client()?;
        let result = client.batch_execute(sql).await;
        self.active = false;
        if let Err(e) = result {
            // The connection state is unknown; never hand it back to the pool.
            if let Some(client) = self.client.take() {
                let _ = Client::take(client);
            }
            return Err(StorageError::Session(SessionError::FinishFailed {
                message: e.to_string(),
            }));
        }
        Ok(())
    }

    async fn prepare_params(
        client: &Client,
        statement: &ComposedStatement,
    ) -> StorageResult<(tokio_postgres::Statement, Vec<BoxedParam>)> {
        let prepared = client.prepare(statement.sql()).await?;
        let params = statement
            .params()
            .iter()
            .zip(prepared.params())
            .map(|(value, ty)| to_param(value, ty))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((prepared, params))
    }
}

fn as_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl SiloSession for PostgresSession {
    fn context(&self) -> &RequestSiloContext {
        &self.context
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn current_binding(&mut self) -> StorageResult<Option<String>> {
        let client = self.client()?;
        let row = client
            .query_one("SELECT current_setting($1, true)", &[&BINDING_SETTING])
            .await?;
        let value: Option<String> = row.try_get(0)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn fetch(&mut self, statement: &ComposedStatement) -> StorageResult<Vec<ScopedRow>> {
        let client = self.client()?;
        let (prepared, params) = Self::prepare_params(client, statement).await?;
        let rows = client.query(&prepared, &as_refs(&params)).await?;
        rows.iter().map(read_row).collect()
    }

    async fn execute(&mut self, statement: &ComposedStatement) -> StorageResult<u64> {
        let client = self.client()?;
        let (prepared, params) = Self::prepare_params(client, statement).await?;
        let affected = client.execute(&prepared, &as_refs(&params)).await?;
        Ok(affected)
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.finish("COMMIT").await?;
        debug!(silo = %self.context.silo(), "PostgreSQL session committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.finish("ROLLBACK").await?;
        debug!(silo = %self.context.silo(), "PostgreSQL session rolled back");
        Ok(())
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.active {
            warn!(
                silo = %self.context.silo(),
                principal_id = %self.context.principal_id(),
                "PostgreSQL session dropped while active; closing its connection"
            );
            if let Some(client) = self.client.take() {
                // Detached clients are closed when dropped, which aborts the
                // server-side transaction together with its binding.
                drop(Client::take(client));
            }
        }
    }
}
