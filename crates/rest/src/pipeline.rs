//! The per-request silo pipeline.
//!
//! Every silo-scoped route runs the same chain before its handler logic:
//!
//! ```text
//! unauthenticated -> silo-resolved -> session-bound -> guard-checked
//!                 -> query-executed -> audited -> responded
//! ```
//!
//! [`SiloPipeline::enter`] covers the first three transitions and hands the
//! handler a [`ScopedRequest`]. Any failure ends the request: a missing
//! principal never reaches the binder, and a failed guard rolls the freshly
//! bound session back before returning.

use std::fmt;

use portal_persistence::core::{SiloSession, SiloStore};
use portal_persistence::silo::{Principal, RequestSiloContext, RouteRequirement, resolve_context};
use tracing::{debug, error, warn};

use crate::error::RestResult;

/// Entry point of the silo pipeline.
pub struct SiloPipeline;

impl SiloPipeline {
    /// Resolves the context, binds a session and checks the route requirement.
    pub async fn enter<S>(
        store: &S,
        principal: Option<&Principal>,
        requirement: &RouteRequirement,
    ) -> RestResult<ScopedRequest<S::Session>>
    where
        S: SiloStore,
    {
        let context = resolve_context(principal)?;
        debug!(
            silo = %context.silo(),
            principal_id = %context.principal_id(),
            "Silo resolved"
        );

        let session = store.begin_session(&context).await?;
        let session = Box::new(session);

        if let Err(e) = requirement.check(&context) {
            warn!(
                silo = %context.silo(),
                principal_id = %context.principal_id(),
                required = %requirement.required_silo(),
                "Route guard rejected request"
            );
            if let Err(rollback) = session.rollback().await {
                error!(error = %rollback, "Rollback after guard failure failed");
            }
            return Err(e.into());
        }

        Ok(ScopedRequest { context, session })
    }
}

/// A request that passed resolve, bind and guard.
///
/// Dropping it without [`commit`](Self::commit) or [`rollback`](Self::rollback)
/// lets the session's own drop handling discard the binding.
pub struct ScopedRequest<T: SiloSession> {
    context: RequestSiloContext,
    session: Box<T>,
}

impl<T: SiloSession> fmt::Debug for ScopedRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRequest")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<T: SiloSession> ScopedRequest<T> {
    /// The resolved context.
    pub fn context(&self) -> &RequestSiloContext {
        &self.context
    }

    /// Splits into the context and the bound session for scoped statements.
    pub fn parts(&mut self) -> (&RequestSiloContext, &mut T) {
        (&self.context, &mut *self.session)
    }

    /// Commits the session and returns the context for auditing.
    pub async fn commit(self) -> RestResult<RequestSiloContext> {
        self.session.commit().await?;
        Ok(self.context)
    }

    /// Rolls the session back.
    pub async fn rollback(self) -> RestResult<()> {
        self.session.rollback().await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::error::RestError;
    use portal_persistence::backends::sqlite::{SqliteBackend, SqliteBackendConfig};
    use portal_persistence::silo::{Role, Silo};

    fn backend() -> SqliteBackend {
        let config = SqliteBackendConfig::default().with_max_connections(1);
        let backend = SqliteBackend::in_memory_with_config(config).unwrap();
        backend.init_schema().unwrap();
        backend
    }

    #[tokio::test]
    async fn test_enter_binds_session() {
        let backend = backend();
        let principal = Principal::new("u-1", Role::staff(), "SLF");

        let mut request = SiloPipeline::enter(&backend, Some(&principal), &RouteRequirement::silo(Silo::SLF))
            .await
            .unwrap();
        let (ctx, session) = request.parts();
        assert_eq!(ctx.silo(), Silo::SLF);
        assert_eq!(session.current_binding().await.unwrap().as_deref(), Some("SLF"));

        request.commit().await.unwrap();
        assert_eq!(backend.probe_binding().unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthenticated() {
        let backend = backend();
        let err = SiloPipeline::enter(&backend, None, &RouteRequirement::silo(Silo::BF))
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_guard_failure_rolls_back() {
        let backend = backend();
        let principal = Principal::new("u-2", Role::admin(), "BF");
        let requirement =
            RouteRequirement::silo(Silo::BI).with_roles([Role::admin(), Role::bi_manager()]);

        let err = SiloPipeline::enter(&backend, Some(&principal), &requirement)
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Forbidden { .. }));
        assert_eq!(backend.probe_binding().unwrap(), None);
    }
}
