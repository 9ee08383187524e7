//! Custom Axum extractors for the portal.
//!
//! - [`principal`] - Reads the authenticated principal attached by the auth layer

pub mod principal;

pub use principal::CurrentPrincipal;
