//! Middleware for the portal HTTP surface.
//!
//! - [`auth`] - Static bearer-token authentication for development

pub mod auth;

pub use auth::{PrincipalsFileError, StaticTokenAuthenticator, authenticate};
