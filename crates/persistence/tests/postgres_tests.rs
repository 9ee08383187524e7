//! PostgreSQL backend tests.
//!
//! Configuration tests run without a database. Tests against a live server
//! read `PORTAL_TEST_PG_URL` and are skipped when it is not set.
//!
//! Run with: `cargo test -p portal-persistence --features postgres -- postgres`

#![cfg(feature = "postgres")]

use portal_persistence::backends::postgres::{
    BINDING_SETTING, PostgresBackend, PostgresConfig, SILO_TABLES, row_level_security_ddl,
};
use portal_persistence::core::BackendKind;
use portal_persistence::scope::{ScopedInsert, ScopedStatement, scoped_insert, scoped_query};
use portal_persistence::silo::{Principal, RequestSiloContext, Role, Silo, resolve_context};
use portal_persistence::{SiloSession, SiloStore};

// ============================================================================
// Configuration Tests (no PostgreSQL instance required)
// ============================================================================

#[test]
fn test_postgres_config_defaults() {
    let config = PostgresConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 5432);
    assert_eq!(config.dbname, "portal");
    assert_eq!(config.user, "portal");
    assert!(config.password.is_none());
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.connect_timeout_secs, 5);
}

#[test]
fn test_postgres_config_serialization() {
    let config = PostgresConfig {
        host: "pg-server".to_string(),
        port: 5433,
        password: Some("secret".to_string()),
        ..Default::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: PostgresConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.host, "pg-server");
    assert_eq!(deserialized.port, 5433);
    assert_eq!(deserialized.password, Some("secret".to_string()));
}

#[test]
fn test_postgres_backend_kind() {
    let kind = BackendKind::Postgres;
    assert_eq!(format!("{}", kind), "postgres");
}

#[test]
fn test_every_silo_table_gets_a_policy() {
    assert_eq!(BINDING_SETTING, "app.current_silo");
    for table in SILO_TABLES {
        let ddl = row_level_security_ddl(table);
        assert!(ddl.contains(&format!("CREATE POLICY silo_isolation ON {}", table)));
        assert!(ddl.contains("FORCE ROW LEVEL SECURITY"));
    }
}

// ============================================================================
// Live Tests (require PORTAL_TEST_PG_URL)
// ============================================================================

async fn live_backend() -> Option<PostgresBackend> {
    let url = std::env::var("PORTAL_TEST_PG_URL").ok()?;
    let mut config = PostgresConfig::from_connection_string(&url).unwrap();
    config.max_connections = 1;
    let backend = PostgresBackend::new(config).await.unwrap();
    backend.init_schema().await.unwrap();
    Some(backend)
}

fn context_for(silo: Silo) -> RequestSiloContext {
    resolve_context(Some(&Principal::new("pg-test", Role::staff(), silo.as_str()))).unwrap()
}

#[tokio::test]
async fn test_postgres_binding_cleared_after_commit() {
    let Some(backend) = live_backend().await else {
        return;
    };

    let mut session = backend.begin_session(&context_for(Silo::BI)).await.unwrap();
    assert_eq!(session.current_binding().await.unwrap().as_deref(), Some("BI"));
    Box::new(session).commit().await.unwrap();

    assert_eq!(backend.probe_binding().await.unwrap(), None);
}

#[tokio::test]
async fn test_postgres_row_level_security_isolates_silos() {
    let Some(backend) = live_backend().await else {
        return;
    };
    let id = format!("pg-{}", uuid::Uuid::new_v4());

    let bf = context_for(Silo::BF);
    let mut session = backend.begin_session(&bf).await.unwrap();
    let insert = ScopedInsert::into("contacts").value("id", id.as_str()).value("name", "bf");
    scoped_insert(&mut session, &bf, &insert).await.unwrap();
    Box::new(session).commit().await.unwrap();

    let slf = context_for(Silo::SLF);
    let mut session = backend.begin_session(&slf).await.unwrap();
    let rows = scoped_query(
        &mut session,
        &slf,
        &ScopedStatement::new("SELECT id, silo FROM contacts WHERE id = $1 AND {silo_scope}"),
        vec![id.as_str().into()],
    )
    .await
    .unwrap();
    Box::new(session).rollback().await.unwrap();

    assert!(rows.is_empty());
}
