//! # Transition Audit Log
//!
//! Append-only history of described transitions. An entry is written only
//! when the caller supplied a non-empty description; actor is kept only for
//! transitions that accept one.

use std::sync::Arc;

use sublife_core::{SubscriptionId, Timestamp};
use sublife_state::{SubscriptionChanges, TransitionRequest};
use sublife_store::{AuditEntry, AuditStore, NewAuditEntry, StoreError};

/// Audit log over an [`AuditStore`].
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Wrap a store.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Record a persisted transition if `request` carries a description.
    ///
    /// Returns the written entry, or `None` when there was nothing to record.
    pub async fn record(
        &self,
        subscription: SubscriptionId,
        request: &TransitionRequest,
        changes: &SubscriptionChanges,
        at: Timestamp,
    ) -> Result<Option<AuditEntry>, StoreError> {
        let Some(description) = request.audit_description() else {
            return Ok(None);
        };
        let entry = self
            .store
            .append(NewAuditEntry {
                subscription_id: subscription,
                transition: changes.transition().name().to_string(),
                source_state: changes.from(),
                target_state: changes.state(),
                description: description.to_string(),
                actor: request.audit_actor().map(str::to_string),
                timestamp: at,
            })
            .await?;
        tracing::debug!(
            subscription = %subscription,
            transition = %changes.transition(),
            "audit entry written"
        );
        Ok(Some(entry))
    }

    /// Every entry for `subscription`, oldest first.
    pub async fn for_subscription(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.query(subscription).await
    }
}
