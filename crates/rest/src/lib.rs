//! Silo-isolated HTTP surface for the staff portal.
//!
//! This crate wires the silo pipeline from `portal-persistence` into an Axum
//! application. Every silo-scoped route runs resolve, bind and guard before
//! its handler, queries only through scoped statements, and audits
//! sensitive reads after they complete.
//!
//! # Architecture
//!
//! - [`config`] - Server configuration (clap + environment)
//! - [`error`] - [`RestError`] and its HTTP mapping
//! - [`extractors`] - Principal extraction
//! - [`middleware`] - Development bearer-token authenticator
//! - [`pipeline`] - Resolve, bind and guard for each request
//! - [`handlers`] - Route handlers
//! - [`routing`] - Route table
//! - [`state`] - Shared application state
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use portal_persistence::backends::sqlite::SqliteBackend;
//! use portal_rest::{create_app_with_config, ServerConfig};
//!
//! let backend = Arc::new(SqliteBackend::in_memory()?);
//! backend.init_schema()?;
//! let app = create_app_with_config(backend.clone(), backend, ServerConfig::default());
//! ```

// Enforce documentation
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod routing;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{RestError, RestResult};
pub use middleware::StaticTokenAuthenticator;
pub use pipeline::{ScopedRequest, SiloPipeline};
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use portal_persistence::audit::{AuditLogger, AuditSink};
use portal_persistence::core::SiloStore;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the Axum application with default configuration.
///
/// The backend doubles as the audit sink.
pub fn create_app<S>(storage: Arc<S>) -> Router
where
    S: SiloStore + AuditSink + 'static,
{
    let sink: Arc<dyn AuditSink> = storage.clone();
    create_app_with_config(storage, sink, ServerConfig::default())
}

/// Creates the Axum application with custom configuration.
///
/// # Arguments
///
/// * `storage` - The silo store serving requests
/// * `audit_sink` - Where audit entries go; writes use its own connections
/// * `config` - Server configuration
///
/// Authentication is not installed here: the caller's auth layer must attach
/// a `Principal` extension, or wrap the router with [`with_static_auth`].
pub fn create_app_with_config<S>(
    storage: Arc<S>,
    audit_sink: Arc<dyn AuditSink>,
    config: ServerConfig,
) -> Router
where
    S: SiloStore + 'static,
{
    info!(audit_sink = audit_sink.sink_name(), "Using audit sink");
    let audit = AuditLogger::new(audit_sink).with_policy(config.audit_policy());
    create_app_with_audit(storage, audit, config)
}

/// Creates the Axum application around an existing [`AuditLogger`].
///
/// Keep a clone of `audit` and call [`AuditLogger::shutdown`] once the server
/// stops so that in-flight audit writes finish.
pub fn create_app_with_audit<S>(storage: Arc<S>, audit: AuditLogger, config: ServerConfig) -> Router
where
    S: SiloStore + 'static,
{
    info!(backend = storage.backend_name(), "Creating portal API server");

    let state = AppState::new(storage, audit, config.clone());

    let router = routing::create_routes(state);

    // Build middleware stack
    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(config.request_timeout),
        ));

    let router = if config.enable_request_id {
        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    } else {
        router
    };

    // Add CORS if enabled
    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(service_builder)
}

/// Wraps a router with the static bearer-token authenticator.
pub fn with_static_auth(router: Router, authenticator: StaticTokenAuthenticator) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        authenticator,
        middleware::authenticate,
    ))
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();

    // Configure origins
    if config.cors_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    // Configure methods
    if config.cors_methods == "*" {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<_> = config
            .cors_methods
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    // Configure headers
    if config.cors_headers == "*" {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<_> = config
            .cors_headers
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup. Audit failures are
/// logged on the `audit` target at error level regardless of `level`.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "portal={level},portal_rest={level},portal_persistence={level},audit=error,tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
