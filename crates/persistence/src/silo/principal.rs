//! Authenticated principal and role types.
//!
//! A [`Principal`] is attached to a request by the authentication layer.
//! Its silo is carried as the raw value the identity provider supplied and is
//! only trusted once [`resolve_context`](super::resolve_context) has validated it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A staff role name.
///
/// Roles are opaque strings assigned by the identity provider. The portal
/// only compares them for membership in a route's allowed set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Portal administrator.
    pub const ADMIN: &'static str = "Admin";
    /// Regular staff member.
    pub const STAFF: &'static str = "Staff";
    /// Manager of the BI line.
    pub const BI_MANAGER: &'static str = "BI_Manager";

    /// Creates a role from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the administrator role.
    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    /// Returns the staff role.
    pub fn staff() -> Self {
        Self::new(Self::STAFF)
    }

    /// Returns the BI manager role.
    pub fn bi_manager() -> Self {
        Self::new(Self::BI_MANAGER)
    }

    /// Returns the role name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of roles a route admits.
pub type RoleSet = BTreeSet<Role>;

/// The identity established by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable staff identifier.
    pub id: String,
    /// Assigned role.
    pub role: Role,
    /// Silo code as assigned by the identity provider. Validated by the resolver.
    #[serde(default)]
    pub silo: Option<String>,
}

impl Principal {
    /// Creates a principal with the given silo assignment.
    pub fn new(id: impl Into<String>, role: Role, silo: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            silo: Some(silo.into()),
        }
    }

    /// Creates a principal with no silo assignment.
    pub fn unassigned(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            silo: None,
        }
    }
}
