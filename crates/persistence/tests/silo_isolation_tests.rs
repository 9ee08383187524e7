//! Silo isolation tests against the SQLite backend.
//!
//! Every silo gets rows with the same ids; each request context must only
//! ever see and change its own.

#![cfg(feature = "sqlite")]

use portal_persistence::backends::sqlite::SqliteBackend;
use portal_persistence::error::{ScopeError, SessionError, StorageError};
use portal_persistence::scope::{
    ScopedInsert, ScopedStatement, SqlValue, scoped_execute, scoped_insert, scoped_query,
};
use portal_persistence::silo::{Principal, RequestSiloContext, Role, Silo, resolve_context};
use portal_persistence::{SiloSession, SiloStore};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

fn context_for(silo: Silo) -> RequestSiloContext {
    let principal = Principal::new(format!("staff-{}", silo), Role::staff(), silo.as_str());
    resolve_context(Some(&principal)).expect("valid principal")
}

async fn seed_contact(backend: &SqliteBackend, silo: Silo, id: &str, name: &str) {
    let ctx = context_for(silo);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let insert = ScopedInsert::into("contacts").value("id", id).value("name", name);
    let affected = scoped_insert(&mut session, &ctx, &insert).await.unwrap();
    assert_eq!(affected, 1);
    Box::new(session).commit().await.unwrap();
}

async fn seed_all(backend: &SqliteBackend) {
    for silo in Silo::ALL {
        seed_contact(backend, silo, "c-1", &format!("{} first", silo)).await;
        seed_contact(backend, silo, "c-2", &format!("{} second", silo)).await;
    }
}

async fn query(
    backend: &SqliteBackend,
    ctx: &RequestSiloContext,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<portal_persistence::scope::ScopedRow>, StorageError> {
    let mut session = backend.begin_session(ctx).await.unwrap();
    let result = scoped_query(&mut session, ctx, &ScopedStatement::new(sql), params).await;
    Box::new(session).rollback().await.unwrap();
    result
}

// ============================================================================
// Read Isolation
// ============================================================================

#[tokio::test]
async fn test_each_silo_sees_only_its_rows() {
    let backend = create_backend();
    seed_all(&backend).await;

    for silo in Silo::ALL {
        let ctx = context_for(silo);
        let rows = query(
            &backend,
            &ctx,
            "SELECT id, name, silo FROM contacts WHERE {silo_scope} ORDER BY id",
            vec![],
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get_str("silo") == Some(silo.as_str())));
        assert_eq!(rows[0].get_str("name"), Some(format!("{} first", silo).as_str()));
    }
}

#[tokio::test]
async fn test_lookup_by_shared_id_returns_own_row() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::SLF);
    let rows = query(
        &backend,
        &ctx,
        "SELECT id, name, silo FROM contacts WHERE id = ?1 AND {silo_scope}",
        vec![SqlValue::from("c-2")],
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name"), Some("SLF second"));
}

#[tokio::test]
async fn test_or_predicate_does_not_escape_scope() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let rows = query(
        &backend,
        &ctx,
        "SELECT id, name, silo FROM contacts WHERE id = ?1 OR id = ?2 AND {silo_scope}",
        vec![SqlValue::from("c-1"), SqlValue::from("c-2")],
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.get_str("silo") == Some("BF")));
}

#[tokio::test]
async fn test_aliased_join_stays_in_scope() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BI);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let insert = ScopedInsert::into("loan_applications")
        .value("id", "app-1")
        .value("contact_id", "c-1")
        .value("amount", 250_000i64);
    scoped_insert(&mut session, &ctx, &insert).await.unwrap();

    let rows = scoped_query(
        &mut session,
        &ctx,
        &ScopedStatement::new(
            "SELECT a.id, c.name, a.silo FROM loan_applications a \
             JOIN contacts c ON c.id = a.contact_id \
             WHERE {silo_scope:a} AND {silo_scope:c}",
        ),
        vec![],
    )
    .await
    .unwrap();
    Box::new(session).commit().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name"), Some("BI first"));
}

// ============================================================================
// Write Isolation
// ============================================================================

#[tokio::test]
async fn test_update_touches_only_own_silo() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let affected = scoped_execute(
        &mut session,
        &ctx,
        &ScopedStatement::new("UPDATE contacts SET name = ?1 WHERE id = ?2 AND {silo_scope}"),
        vec![SqlValue::from("renamed"), SqlValue::from("c-1")],
    )
    .await
    .unwrap();
    Box::new(session).commit().await.unwrap();
    assert_eq!(affected, 1);

    let bi = context_for(Silo::BI);
    let rows = query(
        &backend,
        &bi,
        "SELECT name, silo FROM contacts WHERE id = ?1 AND {silo_scope}",
        vec![SqlValue::from("c-1")],
    )
    .await
    .unwrap();
    assert_eq!(rows[0].get_str("name"), Some("BI first"));
}

#[tokio::test]
async fn test_delete_touches_only_own_silo() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::SLF);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let affected = scoped_execute(
        &mut session,
        &ctx,
        &ScopedStatement::new("DELETE FROM contacts WHERE {silo_scope}"),
        vec![],
    )
    .await
    .unwrap();
    Box::new(session).commit().await.unwrap();
    assert_eq!(affected, 2);

    for silo in [Silo::BF, Silo::BI] {
        let rows = query(
            &backend,
            &context_for(silo),
            "SELECT id, silo FROM contacts WHERE {silo_scope}",
            vec![],
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
    }
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let backend = create_backend();
    let ctx = context_for(Silo::BF);

    let mut session = backend.begin_session(&ctx).await.unwrap();
    let insert = ScopedInsert::into("contacts").value("id", "c-9").value("name", "temp");
    scoped_insert(&mut session, &ctx, &insert).await.unwrap();
    Box::new(session).rollback().await.unwrap();

    let rows = query(&backend, &ctx, "SELECT id, silo FROM contacts WHERE {silo_scope}", vec![])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// ============================================================================
// Rejected Statements
// ============================================================================

#[tokio::test]
async fn test_ambiguous_statements_never_run() {
    let backend = create_backend();
    seed_all(&backend).await;
    let ctx = context_for(Silo::BF);

    let cases: &[(&str, fn(&ScopeError) -> bool)] = &[
        ("SELECT * FROM contacts", |e| matches!(e, ScopeError::MissingWhere)),
        ("SELECT * FROM contacts WHERE id = 'c-1'", |e| {
            matches!(e, ScopeError::MissingMarker)
        }),
        (
            "SELECT id FROM contacts WHERE {silo_scope} UNION SELECT id FROM contacts",
            |e| matches!(e, ScopeError::CompoundQuery { .. }),
        ),
        (
            "SELECT id FROM contacts WHERE id IN (SELECT contact_id FROM loan_applications WHERE amount > 0) AND {silo_scope}",
            |e| matches!(e, ScopeError::Subquery),
        ),
        ("SELECT id FROM contacts WHERE {silo_scope}; DELETE FROM contacts WHERE {silo_scope}", |e| {
            matches!(e, ScopeError::MultipleStatements)
        }),
        ("SELECT id FROM contacts WHERE id = $1 AND {silo_scope}", |e| {
            matches!(e, ScopeError::ForeignPlaceholder { .. })
        }),
        ("UPDATE contacts SET silo = 'BI' WHERE {silo_scope}", |e| {
            matches!(e, ScopeError::ExplicitSiloColumn)
        }),
    ];

    for (sql, expected) in cases {
        let err = query(&backend, &ctx, sql, vec![]).await.unwrap_err();
        match &err {
            StorageError::Scope(scope) => assert!(expected(scope), "{}: got {:?}", sql, scope),
            other => panic!("{}: expected scope error, got {:?}", sql, other),
        }
    }

    // Nothing was changed by any rejected statement.
    let rows = query(&backend, &context_for(Silo::BI), "SELECT id, silo FROM contacts WHERE {silo_scope}", vec![])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_insert_with_silo_column_rejected() {
    let backend = create_backend();
    let ctx = context_for(Silo::BF);

    let mut session = backend.begin_session(&ctx).await.unwrap();
    let insert = ScopedInsert::into("contacts")
        .value("id", "c-1")
        .value("name", "x")
        .value("SILO", "BI");
    let err = scoped_insert(&mut session, &ctx, &insert).await.unwrap_err();
    Box::new(session).rollback().await.unwrap();

    assert!(matches!(err, StorageError::Scope(ScopeError::ExplicitSiloColumn)));
}

#[tokio::test]
async fn test_foreign_silo_value_in_result_fails_closed() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let err = query(
        &backend,
        &ctx,
        "SELECT id, 'BI' AS silo FROM contacts WHERE {silo_scope}",
        vec![],
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        StorageError::Scope(ScopeError::RowOutsideScope { expected: Silo::BF, .. })
    ));
}

#[tokio::test]
async fn test_subquery_into_other_silo_is_rejected() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let err = query(
        &backend,
        &ctx,
        "SELECT id, silo, (SELECT name FROM contacts x WHERE x.silo = 'BI' AND x.id = contacts.id) AS leaked \
         FROM contacts WHERE {silo_scope}",
        vec![],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, StorageError::Scope(ScopeError::Subquery)));
}

#[tokio::test]
async fn test_join_without_marker_for_every_table_is_rejected() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    for sql in [
        "SELECT a.id, c.name, a.silo FROM loan_applications a \
         JOIN contacts c ON c.id = a.contact_id WHERE {silo_scope:a}",
        "SELECT a.id, c.name, a.silo FROM loan_applications a, contacts c \
         WHERE c.id = a.contact_id AND {silo_scope:a}",
    ] {
        let err = query(&backend, &ctx, sql, vec![]).await.unwrap_err();
        assert!(
            matches!(err, StorageError::Scope(ScopeError::UncoveredTable { ref table }) if table == "contacts"),
            "{}: got {:?}",
            sql,
            err
        );
    }
}

#[tokio::test]
async fn test_tuple_update_cannot_move_row_to_other_silo() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let err = scoped_execute(
        &mut session,
        &ctx,
        &ScopedStatement::new(
            "UPDATE contacts SET (silo, name) = ('SLF', 'moved') WHERE id = ?1 AND {silo_scope}",
        ),
        vec![SqlValue::from("c-1")],
    )
    .await
    .unwrap_err();
    Box::new(session).rollback().await.unwrap();
    assert!(matches!(err, StorageError::Scope(ScopeError::ExplicitSiloColumn)));

    let rows = query(
        &backend,
        &ctx,
        "SELECT name, silo FROM contacts WHERE id = ?1 AND {silo_scope}",
        vec![SqlValue::from("c-1")],
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name"), Some("BF first"));
}

#[tokio::test]
async fn test_insert_select_through_execute_is_rejected() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BF);
    let mut session = backend.begin_session(&ctx).await.unwrap();
    let err = scoped_execute(
        &mut session,
        &ctx,
        &ScopedStatement::new(
            "INSERT INTO contacts (id, silo, name) \
             SELECT 'c-3', 'SLF', name FROM contacts WHERE {silo_scope}",
        ),
        vec![],
    )
    .await
    .unwrap_err();
    Box::new(session).commit().await.unwrap();

    assert!(matches!(
        err,
        StorageError::Scope(ScopeError::UnsupportedStatement { ref keyword }) if keyword == "INSERT"
    ));
    let rows = query(
        &backend,
        &context_for(Silo::SLF),
        "SELECT id, silo FROM contacts WHERE {silo_scope}",
        vec![],
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_result_without_silo_column_fails_closed() {
    let backend = create_backend();
    seed_all(&backend).await;

    let ctx = context_for(Silo::BI);
    let err = query(
        &backend,
        &ctx,
        "SELECT id, name FROM contacts WHERE {silo_scope}",
        vec![],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, StorageError::Scope(ScopeError::RowMissingScope)));
}

// ============================================================================
// Session / Context Agreement
// ============================================================================

#[tokio::test]
async fn test_session_for_other_silo_refused() {
    let backend = create_backend();
    seed_all(&backend).await;

    let bf = context_for(Silo::BF);
    let bi = context_for(Silo::BI);
    let mut session = backend.begin_session(&bf).await.unwrap();

    let err = scoped_query(
        &mut session,
        &bi,
        &ScopedStatement::new("SELECT id, silo FROM contacts WHERE {silo_scope}"),
        vec![],
    )
    .await
    .unwrap_err();
    Box::new(session).rollback().await.unwrap();

    assert!(matches!(
        err,
        StorageError::Session(SessionError::BindingMismatch { expected: Silo::BI, .. })
    ));
}
