//! Audit sinks and failure reporting.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::entry::AuditLogEntry;
use crate::error::AuditError;

/// Append-only destination for audit entries.
///
/// The trait has no update or delete operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Returns a short name for logs.
    fn sink_name(&self) -> &'static str;

    /// Persists one entry.
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError>;
}

/// Receives audit write failures so they are never silently dropped.
pub trait ErrorReporter: Send + Sync {
    /// Called once per failed write.
    fn report(&self, entry: &AuditLogEntry, error: &AuditError);
}

/// Reports audit failures as `tracing` error events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, entry: &AuditLogEntry, error: &AuditError) {
        tracing::error!(
            target: "audit",
            audit_id = %entry.id(),
            actor_id = %entry.actor_id(),
            silo = %entry.silo(),
            action = %entry.action(),
            entity_id = %entry.entity_id(),
            error = %error,
            "Audit write failed"
        );
    }
}

/// In-process sink, used by tests and by deployments without a database audit table.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every write.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all entries appended so far.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn sink_name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::WriteFailed {
                action: entry.action().to_string(),
                entity_id: entry.entity_id().to_string(),
                message: "memory sink is failing".to_string(),
            });
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Reporter that keeps failures in memory.
#[derive(Debug, Default)]
pub struct RecordingErrorReporter {
    reports: Mutex<Vec<(AuditLogEntry, String)>>,
}

impl RecordingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries and error messages reported so far.
    pub fn reports(&self) -> Vec<(AuditLogEntry, String)> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, entry: &AuditLogEntry, error: &AuditError) {
        self.reports.lock().push((entry.clone(), error.to_string()));
    }
}
