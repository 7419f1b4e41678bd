//! # Subscription Lifecycle
//!
//! Applies transitions as one operation with no caller-visible intermediate
//! state:
//!
//! 1. **Validate**: plan the transition against the caller's copy. A failed
//!    guard returns [`LifecycleError::InvalidTransition`] and writes nothing.
//! 2. **Persist**: conditional write with the transition's source set as the
//!    expected states and the copy's `last_updated` as the expected stamp.
//!    If another writer touched the record first, the write does not apply and the call returns
//!    [`LifecycleError::ConcurrentModification`]; it is never retried here.
//! 3. **Commit**: the caller's copy takes the planned fields and the
//!    store-stamped `last_updated`.
//! 4. **Audit**: append an entry when a description was supplied.
//! 5. **Notify**: publish the transition's event with the persisted record.
//!    Listener failures stay inside the bus.
//!
//! Once step 2 succeeds the transition has happened: steps 3 and 5 always
//! run. A failed audit write is reported afterwards as
//! [`LifecycleError::AuditFailed`].

use std::sync::Arc;

use sublife_core::{Clock, Reference, SubscriptionId, Timestamp};
use sublife_state::{Subscription, SubscriptionState, TransitionNote, TransitionRequest};
use sublife_store::{AuditEntry, AuditStore, SubscriptionStore};

use crate::audit::AuditLog;
use crate::error::LifecycleError;
use crate::events::EventBus;

/// Transition service over a subscription store, audit log and event bus.
#[derive(Clone)]
pub struct SubscriptionLifecycle {
    store: Arc<dyn SubscriptionStore>,
    audit: AuditLog,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SubscriptionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionLifecycle")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl SubscriptionLifecycle {
    /// Assemble the service. The bus should have its listeners registered
    /// before any trigger runs.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        audit: Arc<dyn AuditStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            audit: AuditLog::new(audit),
            events,
            clock,
        }
    }

    /// The record store.
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// The audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The clock every transition reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create an ACTIVE subscription.
    pub async fn add_subscription(
        &self,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
    ) -> Result<Subscription, LifecycleError> {
        let now = self.clock.now();
        let sub = self
            .store
            .create(SubscriptionState::Active, start, end, reference, now)
            .await?;
        tracing::info!(
            subscription = %sub.id(),
            reference = %sub.reference(),
            "subscription created"
        );
        Ok(sub)
    }

    /// Load a record.
    pub async fn get(&self, id: SubscriptionId) -> Result<Subscription, LifecycleError> {
        Ok(self.store.get(id).await?)
    }

    /// Audit history of a record, oldest first.
    pub async fn history(&self, id: SubscriptionId) -> Result<Vec<AuditEntry>, LifecycleError> {
        Ok(self.audit.for_subscription(id).await?)
    }

    /// Apply `request` to `sub`.
    ///
    /// On success `sub` reflects the persisted record. On
    /// [`LifecycleError::AuditFailed`] it does too, and the event has been
    /// published. On any other error `sub` is left exactly as it was passed
    /// in.
    pub async fn apply(
        &self,
        sub: &mut Subscription,
        request: TransitionRequest,
    ) -> Result<(), LifecycleError> {
        let transition = request.transition();
        let now = self.clock.now();
        let changes = sub.plan(&request, now)?;

        let Some(stamp) = self
            .store
            .update(sub.id(), transition.sources(), &changes, now)
            .await?
        else {
            tracing::warn!(
                subscription = %sub.id(),
                transition = transition.name(),
                "conditional write did not apply"
            );
            return Err(LifecycleError::ConcurrentModification {
                id: sub.id(),
                transition,
            });
        };
        sub.commit(&changes, stamp);

        let audited = self.audit.record(sub.id(), &request, &changes, stamp).await;
        self.events.publish(transition.event(), sub);

        tracing::info!(
            subscription = %sub.id(),
            transition = transition.name(),
            from = %changes.from(),
            to = %changes.state(),
            "transition applied"
        );
        if let Err(source) = audited {
            tracing::error!(
                subscription = %sub.id(),
                transition = transition.name(),
                error = %source,
                "audit entry not written"
            );
            return Err(LifecycleError::AuditFailed {
                id: sub.id(),
                transition,
                source,
            });
        }
        Ok(())
    }

    /// Load the record `id` and apply `request` to it.
    pub async fn apply_by_id(
        &self,
        id: SubscriptionId,
        request: TransitionRequest,
    ) -> Result<Subscription, LifecycleError> {
        let mut sub = self.get(id).await?;
        self.apply(&mut sub, request).await?;
        Ok(sub)
    }

    // ─── Per-transition entry points ─────────────────────────────────

    /// ACTIVE → EXPIRING.
    pub async fn cancel_autorenew(&self, sub: &mut Subscription) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::cancel_autorenew()).await
    }

    /// EXPIRING → ACTIVE.
    pub async fn enable_autorenew(&self, sub: &mut Subscription) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::enable_autorenew()).await
    }

    /// ACTIVE | SUSPENDED → RENEWING.
    pub async fn renew(&self, sub: &mut Subscription) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::renew()).await
    }

    /// ACTIVE | RENEWING | ERROR → ACTIVE, with a new period end and
    /// reference.
    pub async fn renewed(
        &self,
        sub: &mut Subscription,
        new_end: Timestamp,
        new_reference: Reference,
        description: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        self.apply(
            sub,
            TransitionRequest::renewed(new_end, new_reference, description),
        )
        .await
    }

    /// RENEWING | ERROR → SUSPENDED.
    pub async fn renewal_failed(
        &self,
        sub: &mut Subscription,
        note: TransitionNote,
    ) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::renewal_failed(note)).await
    }

    /// ACTIVE | SUSPENDED | EXPIRING | ERROR → ENDED, closing the period now.
    pub async fn end_subscription(
        &self,
        sub: &mut Subscription,
        note: TransitionNote,
    ) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::end_subscription(note)).await
    }

    /// RENEWING → ERROR.
    pub async fn state_unknown(
        &self,
        sub: &mut Subscription,
        note: TransitionNote,
    ) -> Result<(), LifecycleError> {
        self.apply(sub, TransitionRequest::state_unknown(note)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sublife_core::ManualClock;
    use sublife_store::{MemoryAuditStore, MemorySubscriptionStore};

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn service() -> (SubscriptionLifecycle, MemorySubscriptionStore, ManualClock) {
        let store = MemorySubscriptionStore::new();
        let clock = ManualClock::new(ts("2026-05-01T09:00:00Z"));
        let lifecycle = SubscriptionLifecycle::new(
            Arc::new(store.clone()),
            Arc::new(MemoryAuditStore::new()),
            Arc::new(EventBus::new()),
            Arc::new(clock.clone()),
        );
        (lifecycle, store, clock)
    }

    #[tokio::test]
    async fn add_subscription_starts_active() {
        let (lifecycle, _, clock) = service();
        let now = clock.now();
        let sub = lifecycle
            .add_subscription(now, now.plus_days(30), Reference::new("INV-1").unwrap())
            .await
            .unwrap();
        assert_eq!(sub.state(), SubscriptionState::Active);
        assert_eq!(sub.last_updated(), now);
        assert_eq!(sub.reason(), "");
    }

    #[tokio::test]
    async fn stale_copy_loses_to_concurrent_writer() {
        let (lifecycle, _, clock) = service();
        let now = clock.now();
        let sub = lifecycle
            .add_subscription(now, now.plus_days(1), Reference::new("INV-2").unwrap())
            .await
            .unwrap();

        let mut first = sub.clone();
        let mut second = sub.clone();
        lifecycle.renew(&mut first).await.unwrap();

        let err = lifecycle.cancel_autorenew(&mut second).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ConcurrentModification { id, .. } if id == sub.id()));
        assert_eq!(second, sub);
        assert_eq!(
            lifecycle.get(sub.id()).await.unwrap().state(),
            SubscriptionState::Renewing
        );
    }

    #[tokio::test]
    async fn apply_by_id_reports_not_found() {
        let (lifecycle, _, _) = service();
        let id = SubscriptionId::new();
        let err = lifecycle
            .apply_by_id(id, TransitionRequest::renew())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(x) if x == id));
    }

    #[tokio::test]
    async fn end_subscription_records_actor() {
        let (lifecycle, _, clock) = service();
        let now = clock.now();
        let mut sub = lifecycle
            .add_subscription(now, now.plus_days(1), Reference::new("INV-3").unwrap())
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));
        lifecycle
            .end_subscription(
                &mut sub,
                TransitionNote::reason("fraud").with_description("LetItGo").by("ops"),
            )
            .await
            .unwrap();

        assert_eq!(sub.state(), SubscriptionState::Ended);
        assert_eq!(sub.end(), clock.now());
        assert_eq!(sub.reason(), "LetItGo");

        let history = lifecycle.history(sub.id()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transition, "end_subscription");
        assert_eq!(history[0].actor.as_deref(), Some("ops"));
        assert_eq!(history[0].source_state, SubscriptionState::Active);
    }
}
