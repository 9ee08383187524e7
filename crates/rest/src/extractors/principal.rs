//! Principal extractor.
//!
//! The authentication layer attaches a [`Principal`] as a request extension.
//! This extractor only reads it; absence is not a rejection here, because the
//! silo pipeline turns it into a 401 at the resolve stage.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use portal_persistence::silo::Principal;

/// The principal attached to the request, if any.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Option<Principal>);

impl CurrentPrincipal {
    /// Returns the principal, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(parts.extensions.get::<Principal>().cloned()))
    }
}
