//! Audit log entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::silo::{RequestSiloContext, Silo};

/// Viewing a commission record.
pub const COMMISSION_VIEW: &str = "commission.view";

/// Viewing a loan application.
pub const APPLICATION_VIEW: &str = "application.view";

/// One append-only audit record.
///
/// The actor and silo always come from the [`RequestSiloContext`] the action
/// ran under; there is no way to set them separately. Entries serialize for
/// export but are never deserialized: stored rows come back through the
/// backend that wrote them.
///
/// ```
/// use portal_persistence::audit::{AuditLogEntry, COMMISSION_VIEW};
/// use portal_persistence::silo::{resolve_context, Principal, Role, Silo};
///
/// let ctx = resolve_context(Some(&Principal::new("u-9", Role::bi_manager(), "BI"))).unwrap();
/// let entry = AuditLogEntry::new(&ctx, COMMISSION_VIEW, "123");
/// assert_eq!(entry.silo(), Silo::BI);
/// assert_eq!(entry.actor_id(), "u-9");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogEntry {
    id: Uuid,
    actor_id: String,
    silo: Silo,
    action: String,
    entity_id: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Creates an entry for `action` on `entity_id` under `context`.
    pub fn new(
        context: &RequestSiloContext,
        action: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: context.principal_id().to_string(),
            silo: context.silo(),
            action: action.into(),
            entity_id: entity_id.into(),
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    /// Attaches free-form metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Rebuilds an entry read back from storage.
    pub(crate) fn from_stored(
        id: Uuid,
        actor_id: String,
        silo: Silo,
        action: String,
        entity_id: String,
        metadata: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            actor_id,
            silo,
            action,
            entity_id,
            metadata,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// The silo in effect when the action happened.
    pub fn silo(&self) -> Silo {
        self.silo
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
