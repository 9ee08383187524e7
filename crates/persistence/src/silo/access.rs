//! Route-level access checks.
//!
//! A route declares a [`RouteRequirement`]: the silo it belongs to and,
//! optionally, the roles admitted. [`require_silo`] evaluates both against a
//! resolved context before any handler logic runs.

use super::context::RequestSiloContext;
use super::id::Silo;
use super::principal::{Role, RoleSet};
use crate::error::SiloError;

/// Access requirement declared by a route.
///
/// ```
/// use portal_persistence::silo::{Role, RouteRequirement, Silo};
///
/// let commissions = RouteRequirement::silo(Silo::BI)
///     .with_roles([Role::admin(), Role::bi_manager()]);
/// assert_eq!(commissions.required_silo(), Silo::BI);
/// assert!(commissions.allowed_roles().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirement {
    silo: Silo,
    roles: Option<RoleSet>,
}

impl RouteRequirement {
    /// A silo-only restriction.
    pub fn silo(silo: Silo) -> Self {
        Self { silo, roles: None }
    }

    /// Adds a role restriction on top of the silo restriction.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    /// Returns the silo the route belongs to.
    pub fn required_silo(&self) -> Silo {
        self.silo
    }

    /// Returns the admitted roles, if restricted.
    pub fn allowed_roles(&self) -> Option<&RoleSet> {
        self.roles.as_ref()
    }

    /// Checks a context against this requirement.
    pub fn check(&self, context: &RequestSiloContext) -> Result<(), SiloError> {
        require_silo(context, self.silo, self.roles.as_ref())
    }
}

/// Checks that `context` may enter a route belonging to `required`.
///
/// The silo check runs first, then the optional role check. An empty role set
/// admits nobody.
pub fn require_silo(
    context: &RequestSiloContext,
    required: Silo,
    allowed_roles: Option<&RoleSet>,
) -> Result<(), SiloError> {
    if context.silo() != required {
        return Err(SiloError::SiloMismatch {
            required,
            actual: context.silo(),
        });
    }

    if let Some(roles) = allowed_roles {
        if !roles.contains(context.role()) {
            return Err(SiloError::RoleNotPermitted {
                role: context.role().clone(),
                required,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::silo::{Principal, resolve_context};

    fn ctx(role: Role, silo: &str) -> RequestSiloContext {
        resolve_context(Some(&Principal::new("u", role, silo))).unwrap()
    }

    fn commission_route() -> RouteRequirement {
        RouteRequirement::silo(Silo::BI).with_roles([Role::admin(), Role::bi_manager()])
    }

    #[test]
    fn test_silo_only_route() {
        let route = RouteRequirement::silo(Silo::SLF);
        assert!(route.check(&ctx(Role::staff(), "SLF")).is_ok());
        assert!(route.check(&ctx(Role::admin(), "BF")).is_err());
    }

    #[test]
    fn test_wrong_silo_admin_is_forbidden() {
        let err = commission_route()
            .check(&ctx(Role::admin(), "BF"))
            .unwrap_err();
        assert!(matches!(err, SiloError::SiloMismatch { .. }));
    }

    #[test]
    fn test_right_silo_wrong_role_is_forbidden() {
        let err = commission_route()
            .check(&ctx(Role::staff(), "BI"))
            .unwrap_err();
        assert!(matches!(err, SiloError::RoleNotPermitted { .. }));
    }

    #[test]
    fn test_right_silo_allowed_role_passes() {
        assert!(commission_route().check(&ctx(Role::bi_manager(), "BI")).is_ok());
        assert!(commission_route().check(&ctx(Role::admin(), "BI")).is_ok());
    }

    #[test]
    fn test_empty_role_set_admits_nobody() {
        let route = RouteRequirement::silo(Silo::BF).with_roles(Vec::<Role>::new());
        assert!(route.check(&ctx(Role::admin(), "BF")).is_err());
    }
}
