//! The audit logger.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::entry::{AuditLogEntry, COMMISSION_VIEW};
use super::sink::{AuditSink, ErrorReporter, TracingErrorReporter};
use crate::error::AuditError;

/// How an audit write relates to the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditMode {
    /// Dispatched on a background task; the response does not wait.
    #[default]
    Async,
    /// Awaited; a failed write fails the request.
    Sync,
}

/// Chooses the [`AuditMode`] per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPolicy {
    default_mode: AuditMode,
    sync_actions: BTreeSet<String>,
}

impl Default for AuditPolicy {
    /// Asynchronous, except commission views.
    fn default() -> Self {
        Self {
            default_mode: AuditMode::Async,
            sync_actions: BTreeSet::from([COMMISSION_VIEW.to_string()]),
        }
    }
}

impl AuditPolicy {
    /// A policy where every action uses `mode`.
    pub fn uniform(mode: AuditMode) -> Self {
        Self {
            default_mode: mode,
            sync_actions: BTreeSet::new(),
        }
    }

    /// Marks `action` as synchronous-required.
    pub fn require_sync(mut self, action: impl Into<String>) -> Self {
        self.sync_actions.insert(action.into());
        self
    }

    /// Returns the mode used for `action`.
    pub fn mode_for(&self, action: &str) -> AuditMode {
        if self.sync_actions.contains(action) {
            AuditMode::Sync
        } else {
            self.default_mode
        }
    }
}

/// Records audit entries to a sink according to an [`AuditPolicy`].
///
/// Entries must only be recorded after the audited action was authorized and
/// completed. Failures always reach the [`ErrorReporter`].
///
/// Asynchronous writes are tracked; [`AuditLogger::shutdown`] waits for the
/// ones still in flight. Clones share the same set of writes.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    reporter: Arc<dyn ErrorReporter>,
    policy: Arc<AuditPolicy>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("sink", &self.sink.sink_name())
            .field("policy", &self.policy)
            .field("pending", &self.pending_writes())
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Creates a logger with the default policy and the tracing reporter.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            reporter: Arc::new(TracingErrorReporter),
            policy: Arc::new(AuditPolicy::default()),
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Replaces the error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the audit policy.
    pub fn with_policy(mut self, policy: AuditPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    /// Number of asynchronous writes not yet reaped.
    pub fn pending_writes(&self) -> usize {
        self.pending.lock().len()
    }

    /// Waits for every asynchronous write dispatched so far.
    ///
    /// Call once the server has stopped accepting requests so that no audit
    /// entry is lost when the runtime shuts down.
    pub async fn shutdown(&self) {
        let mut writes = std::mem::take(&mut *self.pending.lock());
        let count = writes.len();
        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined {
                warn!(target: "audit", error = %e, "Audit write task did not complete");
            }
        }
        debug!(target: "audit", count, "Audit writes drained");
    }

    /// Appends `entry` to the audit trail.
    ///
    /// In [`AuditMode::Sync`] the write is awaited and its failure returned.
    /// In [`AuditMode::Async`] the write runs on a tracked task and this
    /// returns immediately; a later failure is only reported.
    pub async fn record_audit(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        match self.policy.mode_for(entry.action()) {
            AuditMode::Sync => {
                if let Err(e) = self.sink.append(&entry).await {
                    self.reporter.report(&entry, &e);
                    return Err(e);
                }
                debug!(
                    target: "audit",
                    action = %entry.action(),
                    entity_id = %entry.entity_id(),
                    silo = %entry.silo(),
                    "Audit entry written"
                );
                Ok(())
            }
            AuditMode::Async => {
                let sink = Arc::clone(&self.sink);
                let reporter = Arc::clone(&self.reporter);
                let mut pending = self.pending.lock();
                while pending.try_join_next().is_some() {}
                pending.spawn(async move {
                    match sink.append(&entry).await {
                        Ok(()) => debug!(
                            target: "audit",
                            action = %entry.action(),
                            entity_id = %entry.entity_id(),
                            silo = %entry.silo(),
                            "Audit entry written"
                        ),
                        Err(e) => reporter.report(&entry, &e),
                    }
                });
                Ok(())
            }
        }
    }
}
