//! Route configuration for the portal.
//!
//! This module contains the routing configuration that maps HTTP paths
//! to handlers.

pub mod portal_routes;

pub use portal_routes::create_routes;
