//! Audit sink for the SQLite backend.
//!
//! Entries are written on their own pooled connection in autocommit mode,
//! outside any request's silo session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::audit::{AuditLogEntry, AuditSink};
use crate::error::{AuditError, BackendError, StorageError, StorageResult};
use crate::silo::Silo;

use super::SqliteBackend;

fn write_failed(entry: &AuditLogEntry, message: String) -> AuditError {
    AuditError::WriteFailed {
        action: entry.action().to_string(),
        entity_id: entry.entity_id().to_string(),
        message,
    }
}

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

impl SqliteBackend {
    /// Reads the audit trail, oldest first.
    pub fn audit_entries(&self) -> StorageResult<Vec<AuditLogEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, actor_id, silo, action, entity_id, metadata, created_at
             FROM audit_log ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, actor_id, silo, action, entity_id, metadata, created_at) = row?;
            let id = uuid::Uuid::parse_str(&id)
                .map_err(|e| internal_error(format!("Invalid audit id {}: {}", id, e)))?;
            let silo: Silo = silo
                .parse()
                .map_err(|e| internal_error(format!("Invalid audit silo: {}", e)))?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| internal_error(format!("Invalid audit timestamp: {}", e)))?
                .with_timezone(&Utc);
            entries.push(AuditLogEntry::from_stored(
                id,
                actor_id,
                silo,
                action,
                entity_id,
                serde_json::from_str(&metadata)?,
                created_at,
            ));
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for SqliteBackend {
    fn sink_name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let conn = self
            .get_connection()
            .map_err(|e| write_failed(entry, e.to_string()))?;
        conn.execute(
            "INSERT INTO audit_log (id, actor_id, silo, action, entity_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id().to_string(),
                entry.actor_id(),
                entry.silo().as_str(),
                entry.action(),
                entry.entity_id(),
                entry.metadata().to_string(),
                entry.created_at().to_rfc3339(),
            ],
        )
        .map_err(|e| write_failed(entry, e.to_string()))?;
        Ok(())
    }
}
