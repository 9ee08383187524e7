//! Silo (tenant) management for the portal.
//!
//! This module provides the core types for business-line isolation. All
//! scoped storage operations require a [`RequestSiloContext`], and the only
//! way to obtain one is [`resolve_context`] on an authenticated [`Principal`].
//!
//! # Core Types
//!
//! - [`Silo`] - Closed set of business-line partitions (`BF`, `BI`, `SLF`)
//! - [`Principal`] / [`Role`] - Identity attached by the authentication layer
//! - [`RequestSiloContext`] - Immutable per-request scope
//! - [`RouteRequirement`] - Silo and role restrictions declared by a route
//!
//! # Examples
//!
//! ```
//! use portal_persistence::silo::{
//!     require_silo, resolve_context, Principal, Role, RouteRequirement, Silo,
//! };
//!
//! let principal = Principal::new("staff-42", Role::bi_manager(), "BI");
//! let ctx = resolve_context(Some(&principal)).unwrap();
//!
//! // Silo-only check
//! assert!(require_silo(&ctx, Silo::BI, None).is_ok());
//!
//! // Silo + role check
//! let route = RouteRequirement::silo(Silo::BI).with_roles([Role::admin(), Role::bi_manager()]);
//! assert!(route.check(&ctx).is_ok());
//! ```

mod access;
mod context;
mod id;
mod principal;

pub use access::{RouteRequirement, require_silo};
pub use context::{RequestSiloContext, resolve_context};
pub use id::{Silo, UnknownSilo};
pub use principal::{Principal, Role, RoleSet};
