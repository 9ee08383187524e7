//! Audit sink for the PostgreSQL backend.
//!
//! Entries are written on their own pooled client in autocommit mode,
//! outside any request's silo session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::{AuditLogEntry, AuditSink};
use crate::error::{AuditError, BackendError, StorageError, StorageResult};
use crate::silo::Silo;

use super::PostgresBackend;

fn write_failed(entry: &AuditLogEntry, message: String) -> AuditError {
    AuditError::WriteFailed {
        action: entry.action().to_string(),
        entity_id: entry.entity_id().to_string(),
        message,
    }
}

impl PostgresBackend {
    /// Reads the audit trail, oldest first.
    pub async fn audit_entries(&self) -> StorageResult<Vec<AuditLogEntry>> {
        let client = self.get_client().await?;
        let rows = client
            .query(
                "SELECT id, actor_id, silo, action, entity_id, metadata, created_at
                 FROM audit_log ORDER BY created_at, id",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| -> StorageResult<AuditLogEntry> {
                let silo: String = row.try_get(2)?;
                let silo: Silo = silo.parse().map_err(|e| {
                    StorageError::Backend(BackendError::Internal {
                        backend_name: "postgres".to_string(),
                        message: format!("Invalid audit silo: {}", e),
                        source: None,
                    })
                })?;
                Ok(AuditLogEntry::from_stored(
                    row.try_get::<_, Uuid>(0)?,
                    row.try_get(1)?,
                    silo,
                    row.try_get(3)?,
                    row.try_get(4)?,
                    row.try_get::<_, Value>(5)?,
                    row.try_get::<_, DateTime<Utc>>(6)?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl AuditSink for PostgresBackend {
    fn sink_name(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let client = self
            .get_client()
            .await
            .map_err(|e| write_failed(entry, e.to_string()))?;
        client
            .execute(
                "INSERT INTO audit_log (id, actor_id, silo, action, entity_id, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &entry.id(),
                    &entry.actor_id(),
                    &entry.silo().as_str(),
                    &entry.action(),
                    &entry.entity_id(),
                    entry.metadata(),
                    &entry.created_at(),
                ],
            )
            .await
            .map_err(|e| write_failed(entry, e.to_string()))?;
        Ok(())
    }
}
