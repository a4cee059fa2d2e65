//! Append-only audit writer.
//!
//! Audit writes never fail the operation that triggered them: a failed insert is
//! logged and dropped.

use std::sync::Arc;

use uuid::Uuid;

use super::clock::Clock;
use super::store::IdentityStore;
use crate::models::{AuditAction, AuditLogEntry};

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Start an entry stamped with the current time.
    pub fn entry(&self, action: AuditAction, actor: Option<Uuid>) -> AuditLogEntry {
        AuditLogEntry::new(action, actor, self.clock.now())
    }

    pub async fn record(&self, entry: AuditLogEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            tracing::error!(
                action = %entry.action(),
                actor = ?entry.actor_user_id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }
}
