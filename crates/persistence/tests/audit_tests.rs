//! Audit trail tests against the SQLite backend.

#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use portal_persistence::audit::{
    APPLICATION_VIEW, AuditLogEntry, AuditLogger, AuditMode, AuditPolicy, COMMISSION_VIEW,
    MemoryAuditSink, RecordingErrorReporter,
};
use portal_persistence::backends::sqlite::SqliteBackend;
use portal_persistence::error::AuditError;
use portal_persistence::silo::{Principal, RequestSiloContext, Role, Silo, resolve_context};

fn create_backend() -> Arc<SqliteBackend> {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    Arc::new(backend)
}

fn manager_context() -> RequestSiloContext {
    resolve_context(Some(&Principal::new("mgr-1", Role::bi_manager(), "BI"))).unwrap()
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_sync_entry_persisted_before_return() {
    let backend = create_backend();
    let logger = AuditLogger::new(backend.clone());
    let ctx = manager_context();

    let entry = AuditLogEntry::new(&ctx, COMMISSION_VIEW, "123")
        .with_metadata(json!({"route": "/api/bi/commissions/123"}));
    logger.record_audit(entry).await.unwrap();

    let stored = backend.audit_entries().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].actor_id(), "mgr-1");
    assert_eq!(stored[0].silo(), Silo::BI);
    assert_eq!(stored[0].action(), COMMISSION_VIEW);
    assert_eq!(stored[0].entity_id(), "123");
}

#[tokio::test]
async fn test_async_entry_eventually_persisted() {
    let backend = create_backend();
    let logger = AuditLogger::new(backend.clone());
    let ctx = manager_context();

    logger
        .record_audit(AuditLogEntry::new(&ctx, APPLICATION_VIEW, "app-7"))
        .await
        .unwrap();

    let probe = backend.clone();
    wait_for(move || probe.audit_entries().map(|e| e.len() == 1).unwrap_or(false)).await;
}

#[tokio::test]
async fn test_audit_log_is_append_only() {
    let backend = create_backend();
    let logger = AuditLogger::new(backend.clone()).with_policy(AuditPolicy::uniform(AuditMode::Sync));
    logger
        .record_audit(AuditLogEntry::new(&manager_context(), COMMISSION_VIEW, "1"))
        .await
        .unwrap();

    assert!(backend.execute_admin_batch("UPDATE audit_log SET action = 'x'").is_err());
    assert!(backend.execute_admin_batch("DELETE FROM audit_log").is_err());
    assert_eq!(backend.audit_entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_entries_keep_their_own_silo() {
    let backend = create_backend();
    let logger = AuditLogger::new(backend.clone()).with_policy(AuditPolicy::uniform(AuditMode::Sync));

    for silo in Silo::ALL {
        let ctx = resolve_context(Some(&Principal::new("admin", Role::admin(), silo.as_str()))).unwrap();
        logger
            .record_audit(AuditLogEntry::new(&ctx, APPLICATION_VIEW, "a-1"))
            .await
            .unwrap();
    }

    let silos: Vec<Silo> = backend.audit_entries().unwrap().iter().map(|e| e.silo()).collect();
    assert_eq!(silos.len(), 3);
    for silo in Silo::ALL {
        assert!(silos.contains(&silo));
    }
}

#[tokio::test]
async fn test_async_failure_reaches_reporter() {
    let sink = Arc::new(MemoryAuditSink::failing());
    let reporter = Arc::new(RecordingErrorReporter::new());
    let logger = AuditLogger::new(sink).with_reporter(reporter.clone());

    // The caller is not blocked by the failure.
    logger
        .record_audit(AuditLogEntry::new(&manager_context(), APPLICATION_VIEW, "app-1"))
        .await
        .unwrap();

    let probe = reporter.clone();
    wait_for(move || probe.reports().len() == 1).await;
    assert_eq!(reporter.reports()[0].0.entity_id(), "app-1");
}

#[tokio::test]
async fn test_sync_failure_surfaces_to_caller() {
    let sink = Arc::new(MemoryAuditSink::failing());
    let reporter = Arc::new(RecordingErrorReporter::new());
    let logger = AuditLogger::new(sink).with_reporter(reporter.clone());

    let err = logger
        .record_audit(AuditLogEntry::new(&manager_context(), COMMISSION_VIEW, "9"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::WriteFailed { .. }));
    assert_eq!(reporter.reports().len(), 1);
}
