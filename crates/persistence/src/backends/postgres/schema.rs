//! PostgreSQL schema definitions and migrations.

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Tables partitioned by silo. Each gets a row-level security policy.
pub const SILO_TABLES: &[&str] = &["contacts", "loan_applications", "commissions"];

fn pg_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::MigrationError { message })
}

/// Initialize the database schema.
pub async fn initialize_schema(client: &deadpool_postgres::Client) -> StorageResult<()> {
    let current_version = get_schema_version(client).await?;

    if current_version == 0 {
        create_schema_v1(client).await?;
        set_schema_version(client, SCHEMA_VERSION).await?;
    }

    // Reapplied on every start.
    apply_row_level_security(client).await?;

    Ok(())
}

async fn get_schema_version(client: &deadpool_postgres::Client) -> StorageResult<i32> {
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
            &[],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create schema_version table: {}", e)))?;

    let row = client
        .query_opt("SELECT version FROM schema_version LIMIT 1", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to query schema version: {}", e)))?;

    Ok(row.map(|r| r.get::<_, i32>(0)).unwrap_or(0))
}

async fn set_schema_version(client: &deadpool_postgres::Client, version: i32) -> StorageResult<()> {
    client
        .execute("DELETE FROM schema_version", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to clear schema_version: {}", e)))?;

    client
        .execute(
            "INSERT INTO schema_version (version) VALUES ($1)",
            &[&version],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

async fn create_schema_v1(client: &deadpool_postgres::Client) -> StorageResult<()> {
    client
        .batch_execute(
            "
            CREATE TABLE IF NOT EXISTS contacts (
                silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (silo, id)
            );

            CREATE TABLE IF NOT EXISTS loan_applications (
                silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
                id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                amount BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (silo, id)
            );
            CREATE INDEX IF NOT EXISTS idx_loan_applications_contact
                ON loan_applications(silo, contact_id);

            CREATE TABLE IF NOT EXISTS commissions (
                silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
                id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                broker TEXT NOT NULL,
                amount BIGINT NOT NULL DEFAULT 0,
                paid BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (silo, id)
            );
            CREATE INDEX IF NOT EXISTS idx_commissions_application
                ON commissions(silo, application_id);
            ",
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create silo tables: {}", e)))?;

    client
        .batch_execute(
            "
            CREATE TABLE IF NOT EXISTS audit_log (
                id UUID PRIMARY KEY,
                actor_id TEXT NOT NULL,
                silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
                action TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_log_silo_created
                ON audit_log(silo, created_at);

            CREATE OR REPLACE FUNCTION audit_log_append_only() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'audit_log is append-only';
            END;
            $$ LANGUAGE plpgsql;

            DROP TRIGGER IF EXISTS audit_log_no_modify ON audit_log;
            CREATE TRIGGER audit_log_no_modify
                BEFORE UPDATE OR DELETE ON audit_log
                FOR EACH ROW EXECUTE FUNCTION audit_log_append_only();

            DROP TRIGGER IF EXISTS audit_log_no_truncate ON audit_log;
            CREATE TRIGGER audit_log_no_truncate
                BEFORE TRUNCATE ON audit_log
                FOR EACH STATEMENT EXECUTE FUNCTION audit_log_append_only();
            ",
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create audit_log: {}", e)))?;

    Ok(())
}

/// Returns the DDL that enables and forces the silo policy on `table`.
pub fn row_level_security_ddl(table: &str) -> String {
    format!(
        "ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;
         ALTER TABLE {table} FORCE ROW LEVEL SECURITY;
         DROP POLICY IF EXISTS silo_isolation ON {table};
         CREATE POLICY silo_isolation ON {table}
             USING (silo = current_setting('app.current_silo', true))
             WITH CHECK (silo = current_setting('app.current_silo', true));"
    )
}

async fn apply_row_level_security(client: &deadpool_postgres::Client) -> StorageResult<()> {
    for table in SILO_TABLES {
        client
            .batch_execute(&row_level_security_ddl(table))
            .await
            .map_err(|e| pg_error(format!("Failed to apply row-level security to {}: {}", table, e)))?;
    }
    tracing::info!(tables = SILO_TABLES.len(), "Row-level security policies applied");
    Ok(())
}
