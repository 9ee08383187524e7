//! Request silo context and its resolver.
//!
//! This module defines [`RequestSiloContext`], the validated, immutable view of
//! who is making a request and which silo they are confined to. Every
//! downstream stage takes the context by reference; nothing can alter the
//! silo once it has been resolved.

use tracing::{debug, warn};

use super::id::Silo;
use super::principal::{Principal, Role};
use crate::error::SiloError;

/// The silo scope of a single request.
///
/// Fields are private and there are no setters: a context is created once by
/// [`resolve_context`] and then only read.
///
/// ```
/// use portal_persistence::silo::{resolve_context, Principal, Role, Silo};
///
/// let principal = Principal::new("u-17", Role::staff(), "SLF");
/// let ctx = resolve_context(Some(&principal)).unwrap();
/// assert_eq!(ctx.silo(), Silo::SLF);
/// assert_eq!(ctx.principal_id(), "u-17");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSiloContext {
    principal_id: String,
    role: Role,
    silo: Silo,
}

impl RequestSiloContext {
    /// Returns the authenticated principal's identifier.
    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// Returns the principal's role.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Returns the silo in effect for this request.
    pub fn silo(&self) -> Silo {
        self.silo
    }
}

/// Derives the request's silo context from the authenticated principal.
///
/// The silo comes only from the principal. A missing principal is
/// [`SiloError::Unauthenticated`]; a missing or unknown silo assignment is
/// [`SiloError::InvalidSiloAssignment`].
pub fn resolve_context(principal: Option<&Principal>) -> Result<RequestSiloContext, SiloError> {
    let principal = principal.ok_or(SiloError::Unauthenticated)?;

    let silo = principal
        .silo
        .as_deref()
        .and_then(|raw| raw.parse::<Silo>().ok())
        .ok_or_else(|| {
            warn!(
                principal_id = %principal.id,
                assigned = ?principal.silo,
                "Rejecting principal with invalid silo assignment"
            );
            SiloError::InvalidSiloAssignment {
                principal_id: principal.id.clone(),
            }
        })?;

    debug!(principal_id = %principal.id, silo = %silo, "Resolved request silo");

    Ok(RequestSiloContext {
        principal_id: principal.id.clone(),
        role: principal.role.clone(),
        silo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_valid_principal() {
        let principal = Principal::new("u-1", Role::bi_manager(), "BI");
        let ctx = resolve_context(Some(&principal)).unwrap();
        assert_eq!(ctx.silo(), Silo::BI);
        assert_eq!(ctx.role(), &Role::bi_manager());
        assert_eq!(ctx.principal_id(), "u-1");
    }

    #[test]
    fn test_resolve_missing_principal() {
        assert_eq!(resolve_context(None), Err(SiloError::Unauthenticated));
    }

    #[test]
    fn test_resolve_missing_silo() {
        let principal = Principal::unassigned("u-2", Role::staff());
        let err = resolve_context(Some(&principal)).unwrap_err();
        assert_eq!(
            err,
            SiloError::InvalidSiloAssignment {
                principal_id: "u-2".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_unknown_silo() {
        let principal = Principal::new("u-3", Role::staff(), "ALL");
        assert!(matches!(
            resolve_context(Some(&principal)),
            Err(SiloError::InvalidSiloAssignment { .. })
        ));
    }
}
