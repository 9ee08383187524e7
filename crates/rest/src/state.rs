//! Application state for the portal HTTP surface.
//!
//! This module defines the shared application state that is available to all
//! request handlers: the silo store, the audit logger and the configuration.

use std::sync::Arc;

use portal_persistence::audit::AuditLogger;
use portal_persistence::core::SiloStore;

use crate::config::ServerConfig;

/// Shared application state.
///
/// # Type Parameters
///
/// * `S` - The storage backend type (must implement [`SiloStore`])
///
/// # Example
///
/// ```rust,ignore
/// use portal_rest::{AppState, ServerConfig};
/// use portal_persistence::audit::AuditLogger;
/// use portal_persistence::backends::sqlite::SqliteBackend;
/// use std::sync::Arc;
///
/// let backend = Arc::new(SqliteBackend::in_memory()?);
/// let audit = AuditLogger::new(backend.clone());
/// let state = AppState::new(backend, audit, ServerConfig::default());
/// ```
pub struct AppState<S> {
    /// The storage backend.
    storage: Arc<S>,

    /// Audit logger writing through its own connections.
    audit: AuditLogger,

    /// Server configuration.
    config: Arc<ServerConfig>,
}

// Manually implement Clone since S is wrapped in Arc and doesn't need to be Clone
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            audit: self.audit.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: SiloStore> AppState<S> {
    /// Creates a new AppState.
    pub fn new(storage: Arc<S>, audit: AuditLogger, config: ServerConfig) -> Self {
        Self {
            storage,
            audit,
            config: Arc::new(config),
        }
    }

    /// Returns a reference to the storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the audit logger.
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Returns a reference to the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
