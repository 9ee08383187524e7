//! Static bearer-token authentication for development.
//!
//! Production deployments put the real identity provider in front of the
//! portal and attach a [`Principal`] extension themselves. For local work the
//! server can load a JSON file mapping tokens to principals:
//!
//! ```json
//! {
//!   "dev-bi-manager": { "id": "u-100", "role": "BI_Manager", "silo": "BI" },
//!   "dev-bf-admin":   { "id": "u-200", "role": "Admin", "silo": "BF" }
//! }
//! ```
//!
//! The silo always comes from this table. Nothing in the request other than
//! the `Authorization: Bearer` token is consulted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use portal_persistence::silo::Principal;
use thiserror::Error;
use tracing::{debug, info};

/// Errors loading a principals file.
#[derive(Debug, Error)]
pub enum PrincipalsFileError {
    /// The file could not be read.
    #[error("failed to read principals file {path}: {source}")]
    Read {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a token-to-principal JSON object.
    #[error("invalid principals file {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Maps bearer tokens to principals.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: Arc<HashMap<String, Principal>>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator from a token table.
    pub fn new(tokens: HashMap<String, Principal>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    /// Loads the token table from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PrincipalsFileError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| PrincipalsFileError::Read {
            path: display.clone(),
            source,
        })?;
        let tokens: HashMap<String, Principal> =
            serde_json::from_str(&raw).map_err(|source| PrincipalsFileError::Parse {
                path: display.clone(),
                source,
            })?;
        info!(path = %path.display(), principals = tokens.len(), "Loaded static principals");
        Ok(Self::new(tokens))
    }

    /// Looks up the principal for an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Option<Principal> {
        let token = authorization?.strip_prefix("Bearer ")?.trim();
        self.tokens.get(token).cloned()
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no tokens are configured.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Middleware attaching the principal for a recognised bearer token.
///
/// Unknown or missing tokens pass through without a principal; the silo
/// pipeline answers them with 401.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn authenticate(
    State(authenticator): State<StaticTokenAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    // A principal must never come from anything but the token table.
    request.extensions_mut().remove::<Principal>();

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if let Some(principal) = authenticator.authenticate(header) {
        debug!(principal_id = %principal.id, "Bearer token accepted");
        request.extensions_mut().insert(principal);
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_persistence::silo::Role;
    use std::io::Write;

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new(HashMap::from([(
            "tok-1".to_string(),
            Principal::new("u-1", Role::bi_manager(), "BI"),
        )]))
    }

    #[test]
    fn test_bearer_lookup() {
        let auth = authenticator();
        assert_eq!(auth.authenticate(Some("Bearer tok-1")).unwrap().id, "u-1");
        assert!(auth.authenticate(Some("Bearer nope")).is_none());
        assert!(auth.authenticate(Some("tok-1")).is_none());
        assert!(auth.authenticate(None).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"a": {{"id": "u-9", "role": "Staff", "silo": "SLF"}}, "b": {{"id": "u-10", "role": "Admin"}}}}"#
        )
        .unwrap();

        let auth = StaticTokenAuthenticator::from_file(file.path()).unwrap();
        assert_eq!(auth.len(), 2);
        let unassigned = auth.authenticate(Some("Bearer b")).unwrap();
        assert!(unassigned.silo.is_none());
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        assert!(matches!(
            StaticTokenAuthenticator::from_file(file.path()),
            Err(PrincipalsFileError::Parse { .. })
        ));
        assert!(matches!(
            StaticTokenAuthenticator::from_file("/nonexistent/principals.json"),
            Err(PrincipalsFileError::Read { .. })
        ));
    }
}
