//! Server configuration for the portal HTTP surface.
//!
//! This module provides configuration types for the REST server, supporting
//! both programmatic configuration and environment variable overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORTAL_SERVER_PORT` | 8080 | Server port |
//! | `PORTAL_SERVER_HOST` | 127.0.0.1 | Host to bind |
//! | `PORTAL_LOG_LEVEL` | info | Log level |
//! | `PORTAL_REQUEST_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `PORTAL_ENABLE_CORS` | true | Enable CORS |
//! | `PORTAL_ENABLE_REQUEST_ID` | true | Generate and propagate `x-request-id` |
//! | `PORTAL_CORS_ORIGINS` | * | Allowed origins |
//! | `PORTAL_CORS_METHODS` | GET,OPTIONS | Allowed methods |
//! | `PORTAL_CORS_HEADERS` | Content-Type,Authorization,Accept | Allowed headers |
//! | `PORTAL_DATABASE_URL` | - | Database path or `postgres://` URL |
//! | `PORTAL_PRINCIPALS_FILE` | - | Static bearer-token principals (development) |
//! | `PORTAL_AUDIT_SYNC_ACTIONS` | commission.view | Actions whose audit write must succeed |
//!
//! # Example
//!
//! ```rust
//! use portal_rest::ServerConfig;
//!
//! // Create from environment
//! let config = ServerConfig::from_env();
//!
//! // Or create programmatically
//! let config = ServerConfig {
//!     port: 3000,
//!     host: "0.0.0.0".to_string(),
//!     enable_cors: true,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;

use clap::Parser;
use portal_persistence::audit::{AuditMode, AuditPolicy};

/// Server configuration for the portal.
///
/// This struct can be constructed from environment variables using [`ServerConfig::from_env`],
/// from command line arguments using [`ServerConfig::parse`], or programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "portal")]
#[command(about = "Silo-isolated staff portal server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "PORTAL_SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "PORTAL_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PORTAL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Request timeout in seconds.
    #[arg(long, env = "PORTAL_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Enable CORS.
    #[arg(long, env = "PORTAL_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Generate and propagate an `x-request-id` header.
    #[arg(long, env = "PORTAL_ENABLE_REQUEST_ID", default_value = "true")]
    pub enable_request_id: bool,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "PORTAL_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Allowed CORS methods (comma-separated, or * for all).
    #[arg(long, env = "PORTAL_CORS_METHODS", default_value = "GET,OPTIONS")]
    pub cors_methods: String,

    /// Allowed CORS headers (comma-separated, or * for all).
    #[arg(
        long,
        env = "PORTAL_CORS_HEADERS",
        default_value = "Content-Type,Authorization,Accept"
    )]
    pub cors_headers: String,

    /// Database path (SQLite) or `postgres://` connection string.
    #[arg(long, env = "PORTAL_DATABASE_URL")]
    pub database_url: Option<String>,

    /// JSON file mapping bearer tokens to principals, for development.
    #[arg(long, env = "PORTAL_PRINCIPALS_FILE")]
    pub principals_file: Option<PathBuf>,

    /// Audit actions whose write must succeed before the response (comma-separated).
    #[arg(
        long,
        env = "PORTAL_AUDIT_SYNC_ACTIONS",
        default_value = "commission.view"
    )]
    pub audit_sync_actions: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            request_timeout: 30,
            enable_cors: true,
            enable_request_id: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,OPTIONS".to_string(),
            cors_headers: "Content-Type,Authorization,Accept".to_string(),
            database_url: None,
            principals_file: None,
            audit_sync_actions: "commission.view".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig from environment variables.
    ///
    /// This is a convenience method that parses environment variables without
    /// requiring command line arguments.
    pub fn from_env() -> Self {
        Self::try_parse_from(["portal"]).unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the audit policy: the listed actions are synchronous, the rest async.
    pub fn audit_policy(&self) -> AuditPolicy {
        self.audit_sync_actions
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .fold(AuditPolicy::uniform(AuditMode::Async), |policy, action| {
                policy.require_sync(action)
            })
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Port cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if let Some(path) = &self.principals_file {
            if path.as_os_str().is_empty() {
                errors.push("Principals file path cannot be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// This uses ephemeral port 0 and disables features that might interfere
    /// with tests.
    pub fn for_testing() -> Self {
        Self {
            port: 0, // Let OS assign port
            log_level: "debug".to_string(),
            request_timeout: 5,
            enable_cors: false,
            enable_request_id: false,
            cors_methods: "*".to_string(),
            cors_headers: "*".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_persistence::audit::{APPLICATION_VIEW, COMMISSION_VIEW};

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.socket_addr(), "127.0.0.1:8080");
        assert!(config.principals_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_audit_policy() {
        let policy = ServerConfig::default().audit_policy();
        assert_eq!(policy.mode_for(COMMISSION_VIEW), AuditMode::Sync);
        assert_eq!(policy.mode_for(APPLICATION_VIEW), AuditMode::Async);
    }

    #[test]
    fn test_audit_policy_from_list() {
        let config = ServerConfig {
            audit_sync_actions: " application.view , commission.view,".to_string(),
            ..Default::default()
        };
        let policy = config.audit_policy();
        assert_eq!(policy.mode_for(APPLICATION_VIEW), AuditMode::Sync);
        assert_eq!(policy.mode_for(COMMISSION_VIEW), AuditMode::Sync);
        assert_eq!(policy.mode_for("contact.view"), AuditMode::Async);
    }

    #[test]
    fn test_empty_sync_list_makes_everything_async() {
        let config = ServerConfig {
            audit_sync_actions: String::new(),
            ..Default::default()
        };
        assert_eq!(config.audit_policy().mode_for(COMMISSION_VIEW), AuditMode::Async);
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig {
            port: 0,
            request_timeout: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_for_testing() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port, 0);
        assert!(!config.enable_cors);
    }
}
