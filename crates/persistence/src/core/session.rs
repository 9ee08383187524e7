//! Silo-bound database sessions.
//!
//! A [`SiloSession`] is one pooled connection with an open transaction whose
//! transaction-local silo binding equals the request's silo. Every scoped
//! statement of a request runs through the same session, so the binding is
//! active for their whole lifetime.
//!
//! Sessions end with [`commit`](SiloSession::commit) or
//! [`rollback`](SiloSession::rollback). A session dropped while still active
//! (request cancelled, timeout, panic) must never hand its binding to the next
//! borrower of the connection; each backend documents how it guarantees this.

use async_trait::async_trait;

use super::backend::BackendKind;
use crate::error::StorageResult;
use crate::scope::{ComposedStatement, ScopedRow};
use crate::silo::RequestSiloContext;

/// A transaction bound to exactly one silo.
#[async_trait]
pub trait SiloSession: Send {
    /// The context the session was bound for.
    fn context(&self) -> &RequestSiloContext;

    /// The backend this session runs on.
    fn backend_kind(&self) -> BackendKind;

    /// Returns `true` until the session is committed or rolled back.
    fn is_active(&self) -> bool;

    /// Reads the binding currently visible on the connection.
    async fn current_binding(&mut self) -> StorageResult<Option<String>>;

    /// Runs a composed query and returns its rows.
    async fn fetch(&mut self, statement: &ComposedStatement) -> StorageResult<Vec<ScopedRow>>;

    /// Runs a composed statement and returns the number of affected rows.
    async fn execute(&mut self, statement: &ComposedStatement) -> StorageResult<u64>;

    /// Commits the transaction and clears the binding.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls back the transaction, discarding the binding with it.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// A pooled store that hands out silo-bound sessions.
///
/// # Example
///
/// ```ignore
/// use portal_persistence::core::{SiloSession, SiloStore};
/// use portal_persistence::scope::{scoped_query, ScopedStatement};
///
/// async fn list_contacts<S: SiloStore>(
///     store: &S,
///     ctx: &RequestSiloContext,
/// ) -> StorageResult<Vec<ScopedRow>> {
///     let mut session = store.begin_session(ctx).await?;
///     let rows = scoped_query(
///         &mut session,
///         ctx,
///         &ScopedStatement::new("SELECT id, name, silo FROM contacts WHERE {silo_scope}"),
///         vec![],
///     )
///     .await?;
///     Box::new(session).commit().await?;
///     Ok(rows)
/// }
/// ```
#[async_trait]
pub trait SiloStore: Send + Sync {
    /// The session type handed out by this store.
    type Session: SiloSession + 'static;

    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Checks out a connection, opens a transaction and binds the context's silo.
    ///
    /// Fails with a bind error before any silo data is touched.
    async fn begin_session(&self, context: &RequestSiloContext) -> StorageResult<Self::Session>;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> StorageResult<()>;
}
