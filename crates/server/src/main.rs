//! Lending portal server.
//!
//! Serves the silo-scoped staff routes over HTTP. The database is chosen from
//! `PORTAL_DATABASE_URL`: a `postgres://` URL selects PostgreSQL, anything
//! else is a SQLite path, and no value runs an in-memory SQLite database.

use std::sync::Arc;

use clap::Parser;
use portal_persistence::audit::{AuditLogger, AuditSink};
use portal_rest::{
    ServerConfig, StaticTokenAuthenticator, create_app_with_audit, init_logging, with_static_auth,
};
use tracing::{info, warn};

#[cfg(feature = "sqlite")]
use portal_persistence::backends::sqlite::SqliteBackend;

/// Creates and initializes a SQLite backend from the server configuration.
#[cfg(feature = "sqlite")]
fn create_sqlite_backend(config: &ServerConfig) -> anyhow::Result<SqliteBackend> {
    let backend = match config.database_url.as_deref() {
        None | Some(":memory:") => {
            info!("Initializing in-memory SQLite backend");
            SqliteBackend::in_memory()?
        }
        Some(path) => {
            info!(database = %path, "Initializing SQLite backend");
            SqliteBackend::open(path)?
        }
    };
    backend.init_schema()?;

    Ok(backend)
}

/// Installs the development token authenticator when a principals file is set.
fn install_auth(app: axum::Router, config: &ServerConfig) -> anyhow::Result<axum::Router> {
    match &config.principals_file {
        Some(path) => {
            let authenticator = StaticTokenAuthenticator::from_file(path)?;
            info!(
                path = %path.display(),
                principals = authenticator.len(),
                "Static token authentication enabled"
            );
            Ok(with_static_auth(app, authenticator))
        }
        None => {
            warn!("No principals file configured; every silo route will answer 401");
            Ok(app)
        }
    }
}

/// Builds the audit logger shared by the app and the shutdown path.
fn create_audit_logger(sink: Arc<dyn AuditSink>, config: &ServerConfig) -> AuditLogger {
    info!(audit_sink = sink.sink_name(), "Audit logging enabled");
    AuditLogger::new(sink).with_policy(config.audit_policy())
}

/// Serves until shutdown, then waits for pending audit writes.
async fn serve_and_drain(
    app: axum::Router,
    config: &ServerConfig,
    audit: AuditLogger,
) -> anyhow::Result<()> {
    let served = serve(app, config).await;
    info!(pending = audit.pending_writes(), "Draining audit writes");
    audit.shutdown().await;
    served
}

/// Starts the Axum HTTP server.
async fn serve(app: axum::Router, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    info!(address = %addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let use_postgres = config.database_url.as_deref().is_some_and(is_postgres_url);

    info!(
        port = config.port,
        host = %config.host,
        storage_backend = if use_postgres { "postgres" } else { "sqlite" },
        audit_sync_actions = %config.audit_sync_actions,
        "Starting lending portal server"
    );

    if use_postgres {
        start_postgres(config).await
    } else {
        start_sqlite(config).await
    }
}

/// Starts the server with the SQLite backend.
#[cfg(feature = "sqlite")]
async fn start_sqlite(config: ServerConfig) -> anyhow::Result<()> {
    let backend = Arc::new(create_sqlite_backend(&config)?);
    let audit = create_audit_logger(backend.clone(), &config);
    let app = create_app_with_audit(backend, audit.clone(), config.clone());
    let app = install_auth(app, &config)?;
    serve_and_drain(app, &config, audit).await
}

/// Fallback when sqlite feature is not enabled.
#[cfg(not(feature = "sqlite"))]
async fn start_sqlite(_config: ServerConfig) -> anyhow::Result<()> {
    anyhow::bail!(
        "The sqlite backend requires the 'sqlite' feature. \
         Build with: cargo build -p portal-server --features sqlite"
    )
}

/// Starts the server with the PostgreSQL backend.
#[cfg(feature = "postgres")]
async fn start_postgres(config: ServerConfig) -> anyhow::Result<()> {
    use portal_persistence::backends::postgres::PostgresBackend;

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("PostgreSQL requires PORTAL_DATABASE_URL"))?;
    info!("Initializing PostgreSQL backend from connection string");
    let backend = Arc::new(PostgresBackend::from_connection_string(url).await?);
    backend.init_schema().await?;

    let audit = create_audit_logger(backend.clone(), &config);
    let app = create_app_with_audit(backend, audit.clone(), config.clone());
    let app = install_auth(app, &config)?;
    serve_and_drain(app, &config, audit).await
}

/// Fallback when postgres feature is not enabled.
#[cfg(not(feature = "postgres"))]
async fn start_postgres(_config: ServerConfig) -> anyhow::Result<()> {
    anyhow::bail!(
        "The postgres backend requires the 'postgres' feature. \
         Build with: cargo build -p portal-server --features postgres"
    )
}

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("At least one database backend feature must be enabled");
