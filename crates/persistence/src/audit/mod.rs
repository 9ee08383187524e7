//! Append-only audit trail.
//!
//! Sensitive accesses are recorded as [`AuditLogEntry`] values carrying the
//! silo in effect when they happened. An [`AuditLogger`] writes them to an
//! [`AuditSink`] either on a background task or synchronously, as chosen by
//! its [`AuditPolicy`]. Write failures always reach an [`ErrorReporter`].

mod entry;
mod logger;
mod sink;

pub use entry::{APPLICATION_VIEW, AuditLogEntry, COMMISSION_VIEW};
pub use logger::{AuditLogger, AuditMode, AuditPolicy};
pub use sink::{
    AuditSink, ErrorReporter, MemoryAuditSink, RecordingErrorReporter, TracingErrorReporter,
};
