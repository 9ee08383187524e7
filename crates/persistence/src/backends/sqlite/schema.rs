//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Per-connection table that holds the silo binding.
///
/// Lives in the `temp` schema, so it is private to one connection and
/// disappears when the connection closes.
pub(crate) const BINDING_TABLE_DDL: &str = "CREATE TEMP TABLE IF NOT EXISTS silo_session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

fn migration_error(step: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::MigrationError {
        message: format!("{}: {}", step, e),
    })
}

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| migration_error("Failed to create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| migration_error("Failed to clear schema_version", e))?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )
    .map_err(|e| migration_error("Failed to set schema_version", e))?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS contacts (
            silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (silo, id)
        );

        CREATE TABLE IF NOT EXISTS loan_applications (
            silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
            id TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            amount INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (silo, id)
        );
        CREATE INDEX IF NOT EXISTS idx_loan_applications_contact
            ON loan_applications(silo, contact_id);

        CREATE TABLE IF NOT EXISTS commissions (
            silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
            id TEXT NOT NULL,
            application_id TEXT NOT NULL,
            broker TEXT NOT NULL,
            amount INTEGER NOT NULL DEFAULT 0,
            paid INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (silo, id)
        );
        CREATE INDEX IF NOT EXISTS idx_commissions_application
            ON commissions(silo, application_id);

        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            actor_id TEXT NOT NULL,
            silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
            action TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_log_silo_created
            ON audit_log(silo, created_at);

        -- Append-only audit trail
        CREATE TRIGGER IF NOT EXISTS audit_log_no_update
            BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;
        CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
            BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;
        ",
    )
    .map_err(|e| migration_error("Failed to create schema v1", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_silo_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO contacts (silo, id, name) VALUES ('ALL', 'c1', 'x')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_audit_log_rejects_update_and_delete() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO audit_log (id, actor_id, silo, action, entity_id, created_at)
             VALUES ('a1', 'u1', 'BI', 'commission.view', '123', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        assert!(
            conn.execute("UPDATE audit_log SET silo = 'BF'", [])
                .is_err()
        );
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
