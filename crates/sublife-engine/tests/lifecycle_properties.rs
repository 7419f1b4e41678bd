//! End-to-end lifecycle behaviour over the in-memory stores.
//!
//! Time is driven by a `ManualClock`; "6 hours ago" and "4 days ago" are
//! relative to its frozen instant.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use proptest::prelude::*;
use sublife_core::{Clock, ManualClock, Reference, SubscriptionId, Timestamp};
use sublife_engine::{EventBus, LifecycleError, SubscriptionLifecycle, TriggerEngine, TriggerKind};
use sublife_state::{
    Subscription, SubscriptionChanges, SubscriptionEvent, SubscriptionParts, SubscriptionState,
    Transition, TransitionNote, TransitionRequest,
};
use sublife_store::{
    query, AuditEntry, AuditStore, MemoryAuditStore, MemorySubscriptionStore, NewAuditEntry,
    StoreError, SubscriptionQuery, SubscriptionStore,
};

use SubscriptionState::{Active, Ended, Error as ErrorState, Expiring, Renewing, Suspended};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: MemorySubscriptionStore,
    audit: MemoryAuditStore,
    bus: Arc<EventBus>,
    clock: ManualClock,
    lifecycle: SubscriptionLifecycle,
    triggers: TriggerEngine,
}

fn harness() -> Harness {
    harness_over(MemorySubscriptionStore::new(), None)
}

fn harness_over(
    store: MemorySubscriptionStore,
    front: Option<Arc<dyn SubscriptionStore>>,
) -> Harness {
    let audit = MemoryAuditStore::new();
    let bus = Arc::new(EventBus::new());
    let clock = ManualClock::new(Timestamp::parse("2026-07-15T10:30:00Z").unwrap());
    let lifecycle = SubscriptionLifecycle::new(
        front.unwrap_or_else(|| Arc::new(store.clone())),
        Arc::new(audit.clone()),
        Arc::clone(&bus),
        Arc::new(clock.clone()),
    );
    let triggers = TriggerEngine::new(lifecycle.clone());
    Harness {
        store,
        audit,
        bus,
        clock,
        lifecycle,
        triggers,
    }
}

impl Harness {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn hours_ago(&self) -> Timestamp {
        self.now().minus_hours(6)
    }

    fn days_ago(&self) -> Timestamp {
        self.now().minus_days(4)
    }

    fn yearish(&self) -> Timestamp {
        self.now().plus_days(365)
    }

    /// A record in `state`, last touched at `last_updated`.
    async fn seed(
        &self,
        state: SubscriptionState,
        end: Timestamp,
        last_updated: Timestamp,
    ) -> Subscription {
        self.store
            .create(
                state,
                self.now().minus_days(365),
                end,
                Reference::new("SUB-test").unwrap(),
                last_updated,
            )
            .await
            .unwrap()
    }

    async fn state_of(&self, id: SubscriptionId) -> SubscriptionState {
        self.store.get(id).await.unwrap().state()
    }

    /// Count every publish on `event`.
    fn record_events(&self, event: SubscriptionEvent) -> Arc<Mutex<Vec<Subscription>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        self.bus.subscribe(event, move |sub| {
            sink.lock().push(sub.clone());
            Ok(())
        });
        seen
    }
}

fn request_for(transition: Transition, h: &Harness) -> TransitionRequest {
    let note = TransitionNote::reason("because").with_description("described");
    match transition {
        Transition::CancelAutorenew => TransitionRequest::cancel_autorenew(),
        Transition::EnableAutorenew => TransitionRequest::enable_autorenew(),
        Transition::Renew => TransitionRequest::renew(),
        Transition::Renewed => TransitionRequest::renewed(
            h.yearish(),
            Reference::new("SUB-renewed").unwrap(),
            "described",
        ),
        Transition::RenewalFailed => TransitionRequest::renewal_failed(note),
        Transition::EndSubscription => TransitionRequest::end_subscription(note.by("ops")),
        Transition::StateUnknown => TransitionRequest::state_unknown(note),
    }
}

// ---------------------------------------------------------------------------
// Guards and timestamps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_transitions_change_nothing() {
    let h = harness();
    let events = h.record_events(SubscriptionEvent::SubscriptionDue);
    let mut rejected = 0;

    for state in SubscriptionState::ALL {
        for transition in Transition::ALL {
            if transition.permits(state) {
                continue;
            }
            let original = h.seed(state, h.hours_ago(), h.days_ago()).await;
            let mut copy = original.clone();

            let err = h
                .lifecycle
                .apply(&mut copy, request_for(transition, &h))
                .await
                .unwrap_err();
            assert!(
                matches!(err, LifecycleError::InvalidTransition(_)),
                "{transition} from {state}: {err}"
            );
            assert_eq!(copy, original);
            assert_eq!(h.store.get(original.id()).await.unwrap(), original);
            assert!(h.audit.query(original.id()).await.unwrap().is_empty());
            rejected += 1;
        }
    }

    assert!(rejected > 0);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn successful_transitions_hit_target_and_advance_last_updated() {
    let h = harness();

    for state in SubscriptionState::ALL {
        for transition in Transition::ALL {
            if !transition.permits(state) {
                continue;
            }
            // last_updated equal to the frozen clock: the store must still
            // move it forward.
            let original = h.seed(state, h.hours_ago(), h.now()).await;
            let mut sub = original.clone();
            h.lifecycle
                .apply(&mut sub, request_for(transition, &h))
                .await
                .unwrap();

            assert_eq!(sub.state(), transition.target());
            assert!(sub.last_updated() > original.last_updated());
            assert_eq!(h.store.get(sub.id()).await.unwrap(), sub);
        }
    }
}

#[tokio::test]
async fn last_updated_strictly_increases_across_a_chain() {
    let h = harness();
    let now = h.now();
    let mut sub = h
        .lifecycle
        .add_subscription(now, h.yearish(), Reference::new("SUB-chain").unwrap())
        .await
        .unwrap();

    let mut seen = vec![sub.last_updated()];
    h.lifecycle.cancel_autorenew(&mut sub).await.unwrap();
    seen.push(sub.last_updated());
    h.lifecycle.enable_autorenew(&mut sub).await.unwrap();
    seen.push(sub.last_updated());
    h.lifecycle.renew(&mut sub).await.unwrap();
    seen.push(sub.last_updated());
    h.lifecycle
        .renewal_failed(&mut sub, TransitionNote::reason("card"))
        .await
        .unwrap();
    seen.push(sub.last_updated());

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(sub.state(), Suspended);
    assert_eq!(sub.reason(), "card");
}

#[tokio::test]
async fn renewed_from_active_is_repeatable() {
    let h = harness();
    let mut sub = h.seed(Active, h.hours_ago(), h.days_ago()).await;
    let new_end = h.yearish();
    let new_ref = Reference::new("SUB-next").unwrap();

    h.lifecycle
        .renewed(&mut sub, new_end, new_ref.clone(), "")
        .await
        .unwrap();
    let first_stamp = sub.last_updated();
    h.lifecycle
        .renewed(&mut sub, new_end, new_ref.clone(), "")
        .await
        .unwrap();

    assert_eq!(sub.state(), Active);
    assert_eq!(sub.end(), new_end);
    assert_eq!(sub.reference(), &new_ref);
    assert_eq!(sub.reason(), "");
    assert!(sub.last_updated() > first_stamp);
}

fn any_step() -> impl Strategy<Value = (Transition, i64)> {
    (prop::sample::select(Transition::ALL.to_vec()), 0i64..3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any walk through the table: accepted steps reach their target with a
    /// strictly later `last_updated`, even when the clock does not move;
    /// rejected steps leave the record alone.
    #[test]
    fn random_walks_keep_last_updated_increasing(
        steps in prop::collection::vec(any_step(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = harness();
            let mut sub = h
                .lifecycle
                .add_subscription(h.now(), h.yearish(), Reference::new("SUB-walk").unwrap())
                .await
                .unwrap();
            for (transition, minutes) in steps {
                h.clock.advance(chrono::Duration::minutes(minutes));
                let before = sub.clone();
                let result = h.lifecycle.apply(&mut sub, request_for(transition, &h)).await;
                if transition.permits(before.state()) {
                    prop_assert!(result.is_ok(), "{} from {}", transition, before.state());
                    prop_assert_eq!(sub.state(), transition.target());
                    prop_assert!(sub.last_updated() > before.last_updated());
                    prop_assert_eq!(&h.store.get(sub.id()).await.unwrap(), &sub);
                } else {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(&sub, &before);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_renewals_counts_exactly_the_due_records() {
    let h = harness();
    let mut due = Vec::new();
    for _ in 0..3 {
        due.push(h.seed(Active, h.hours_ago(), h.days_ago()).await.id());
    }
    let future = h.seed(Active, h.yearish(), h.days_ago()).await;
    let boundary = h.seed(Active, h.now(), h.days_ago()).await;
    let expiring = h.seed(Expiring, h.hours_ago(), h.days_ago()).await;

    let expected = h
        .store
        .count(&SubscriptionQuery::new(query::renewals_due(h.now())))
        .await
        .unwrap();
    assert_eq!(expected, 3);

    assert_eq!(h.triggers.trigger_renewals().await.unwrap(), 3);
    for id in due {
        assert_eq!(h.state_of(id).await, Renewing);
    }
    assert_eq!(h.state_of(future.id()).await, Active);
    assert_eq!(h.state_of(boundary.id()).await, Active);
    assert_eq!(h.state_of(expiring.id()).await, Expiring);

    // nothing left to do
    assert_eq!(h.triggers.trigger_renewals().await.unwrap(), 0);
}

#[tokio::test]
async fn trigger_expiring_ends_lapsed_subscriptions() {
    let h = harness();
    let lapsed = h.seed(Expiring, h.hours_ago(), h.days_ago()).await;
    let current = h.seed(Expiring, h.yearish(), h.days_ago()).await;

    assert_eq!(h.triggers.trigger_expiring().await.unwrap(), 1);
    let ended = h.store.get(lapsed.id()).await.unwrap();
    assert_eq!(ended.state(), Ended);
    assert_eq!(ended.end(), h.now());
    assert_eq!(h.state_of(current.id()).await, Expiring);
}

#[tokio::test]
async fn trigger_suspended_retries_renewal() {
    let h = harness();
    let due = h.seed(Suspended, h.hours_ago(), h.hours_ago()).await;
    let events = h.record_events(SubscriptionEvent::SubscriptionDue);

    assert_eq!(h.triggers.trigger_suspended().await.unwrap(), 1);
    assert_eq!(h.state_of(due.id()).await, Renewing);
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn trigger_suspended_timeout_uses_end() {
    let h = harness();
    let old = h.seed(Suspended, h.days_ago(), h.now()).await;
    let recent = h.seed(Suspended, h.hours_ago(), h.days_ago()).await;

    assert_eq!(h.triggers.trigger_suspended_timeout(72).await.unwrap(), 1);
    assert_eq!(h.state_of(old.id()).await, Ended);
    assert_eq!(h.state_of(recent.id()).await, Suspended);
}

#[tokio::test]
async fn trigger_stuck_routes_to_error_without_retry() {
    let h = harness();
    let stale = h.seed(Renewing, h.days_ago(), h.hours_ago()).await;
    let fresh = h.seed(Renewing, h.days_ago(), h.now()).await;

    assert_eq!(h.triggers.trigger_stuck(2, false).await.unwrap(), 1);
    assert_eq!(h.state_of(stale.id()).await, ErrorState);
    assert_eq!(h.state_of(fresh.id()).await, Renewing);
}

#[tokio::test]
async fn trigger_stuck_routes_to_suspended_with_retry() {
    let h = harness();
    let stale = h.seed(Renewing, h.days_ago(), h.hours_ago()).await;
    let fresh = h.seed(Renewing, h.days_ago(), h.now()).await;

    assert_eq!(h.triggers.trigger_stuck(2, true).await.unwrap(), 1);
    assert_eq!(h.state_of(stale.id()).await, Suspended);
    assert_eq!(h.state_of(fresh.id()).await, Renewing);
}

#[tokio::test]
async fn triggers_process_oldest_first() {
    let h = harness();
    let newer = h.seed(Active, h.hours_ago(), h.now().minus_hours(1)).await;
    let oldest = h.seed(Active, h.hours_ago(), h.days_ago()).await;
    let middle = h.seed(Active, h.hours_ago(), h.hours_ago()).await;
    let events = h.record_events(SubscriptionEvent::SubscriptionDue);

    h.triggers.trigger_renewals().await.unwrap();
    let order: Vec<_> = events.lock().iter().map(Subscription::id).collect();
    assert_eq!(order, vec![oldest.id(), middle.id(), newer.id()]);
}

#[tokio::test]
async fn trigger_dispatch_by_kind_reports_counts() {
    let h = harness();
    h.seed(Renewing, h.days_ago(), h.days_ago()).await;
    let report = h
        .triggers
        .run(TriggerKind::Stuck {
            hours: 2,
            retry: false,
        })
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 0);
}

/// What another worker does to the contested record just before our
/// conditional write reaches the store.
#[derive(Clone, Copy)]
enum Race {
    /// Its write wins outright.
    Lose,
    /// It completes a renewal and the record falls due again, ending back
    /// in RENEWING with a new period and reference.
    RenewedAndDueAgain,
}

/// A store that lets one record be contested by another worker.
struct RacingStore {
    inner: MemorySubscriptionStore,
    contested: Mutex<Option<(SubscriptionId, Race)>>,
}

impl RacingStore {
    fn new(inner: MemorySubscriptionStore) -> Self {
        Self {
            inner,
            contested: Mutex::new(None),
        }
    }

    fn contest(&self, id: SubscriptionId, race: Race) {
        *self.contested.lock() = Some((id, race));
    }

    async fn renew_behind_our_back(&self, id: SubscriptionId, now: Timestamp) {
        let mut current = self.inner.get(id).await.unwrap();
        for request in [
            TransitionRequest::renewed(now.plus_days(365), Reference::new("SUB-won").unwrap(), ""),
            TransitionRequest::renew(),
        ] {
            let changes = current.plan(&request, now).unwrap();
            let stamp = self
                .inner
                .update(id, request.transition().sources(), &changes, now)
                .await
                .unwrap()
                .unwrap();
            current.commit(&changes, stamp);
        }
    }
}

#[async_trait]
impl SubscriptionStore for RacingStore {
    async fn create(
        &self,
        state: SubscriptionState,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
        created_at: Timestamp,
    ) -> Result<Subscription, StoreError> {
        self.inner.create(state, start, end, reference, created_at).await
    }

    async fn get(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        self.inner.get(id).await
    }

    fn filter<'a>(
        &'a self,
        query: &'a SubscriptionQuery,
    ) -> BoxStream<'a, Result<Subscription, StoreError>> {
        self.inner.filter(query)
    }

    async fn count(&self, query: &SubscriptionQuery) -> Result<u64, StoreError> {
        self.inner.count(query).await
    }

    async fn update(
        &self,
        id: SubscriptionId,
        expected: &[SubscriptionState],
        changes: &SubscriptionChanges,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, StoreError> {
        let race = match *self.contested.lock() {
            Some((contested, race)) if contested == id => Some(race),
            _ => None,
        };
        match race {
            Some(Race::Lose) => return Ok(None),
            Some(Race::RenewedAndDueAgain) => {
                *self.contested.lock() = None;
                self.renew_behind_our_back(id, now).await;
            }
            None => {}
        }
        self.inner.update(id, expected, changes, now).await
    }
}

#[tokio::test]
async fn lost_races_are_skipped_not_fatal() {
    let store = MemorySubscriptionStore::new();
    let front = Arc::new(RacingStore::new(store.clone()));
    let shared: Arc<dyn SubscriptionStore> = front.clone();
    let h = harness_over(store, Some(shared));

    let first = h.seed(Active, h.hours_ago(), h.days_ago()).await;
    let contested = h.seed(Active, h.hours_ago(), h.days_ago().plus_hours(1)).await;
    let last = h.seed(Active, h.hours_ago(), h.hours_ago()).await;
    front.contest(contested.id(), Race::Lose);

    let report = h.triggers.run(TriggerKind::Renewals).await.unwrap();
    assert_eq!(report.updated, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.state_of(first.id()).await, Renewing);
    assert_eq!(h.state_of(contested.id()).await, Active);
    assert_eq!(h.state_of(last.id()).await, Renewing);
}

#[tokio::test]
async fn trigger_does_not_overwrite_a_renewal_that_landed_mid_scan() {
    let store = MemorySubscriptionStore::new();
    let front = Arc::new(RacingStore::new(store.clone()));
    let shared: Arc<dyn SubscriptionStore> = front.clone();
    let h = harness_over(store, Some(shared));

    let stuck = h.seed(Renewing, h.days_ago(), h.days_ago()).await;
    let contested = h.seed(Renewing, h.days_ago(), h.hours_ago()).await;
    front.contest(contested.id(), Race::RenewedAndDueAgain);

    let report = h
        .triggers
        .run(TriggerKind::Stuck {
            hours: 2,
            retry: true,
        })
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.state_of(stuck.id()).await, Suspended);

    let renewed = h.store.get(contested.id()).await.unwrap();
    assert_eq!(renewed.state(), Renewing);
    assert_eq!(renewed.end(), h.now().plus_days(365));
    assert_eq!(renewed.reference().as_str(), "SUB-won");
}

#[tokio::test]
async fn stale_copy_cannot_undo_a_completed_renewal() {
    let h = harness();
    let mut current = h.seed(Renewing, h.hours_ago(), h.hours_ago()).await;
    let mut stale = current.clone();

    // another handle renews, and the record falls due again
    h.lifecycle
        .renewed(&mut current, h.yearish(), Reference::new("SUB-new").unwrap(), "")
        .await
        .unwrap();
    h.lifecycle.renew(&mut current).await.unwrap();
    assert_eq!(current.state(), stale.state());

    let before = stale.clone();
    let err = h
        .lifecycle
        .renewal_failed(&mut stale, TransitionNote::described("DECLINED"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::ConcurrentModification { .. }), "{err}");
    assert_eq!(stale, before);

    let persisted = h.store.get(current.id()).await.unwrap();
    assert_eq!(persisted, current);
    assert_eq!(persisted.end(), h.yearish());
    assert_eq!(persisted.reference().as_str(), "SUB-new");
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn rows_changed_out_of_band_are_not_processed() {
    let h = harness();
    // Another writer ends the record before the trigger runs.
    let sub = h.seed(Active, h.hours_ago(), h.days_ago()).await;
    let ended = Subscription::from_parts(SubscriptionParts {
        id: sub.id(),
        state: Ended,
        start: sub.start(),
        end: sub.end(),
        reference: sub.reference().clone(),
        last_updated: sub.last_updated(),
        reason: String::new(),
    });
    h.store.replace(ended);
    assert_eq!(h.triggers.trigger_renewals().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_enable_then_renew_via_trigger() {
    let h = harness();
    let mut sub = h
        .lifecycle
        .add_subscription(h.now(), h.yearish(), Reference::new("SUB-scenario").unwrap())
        .await
        .unwrap();

    h.lifecycle.cancel_autorenew(&mut sub).await.unwrap();
    assert_eq!(sub.state(), Expiring);
    assert_eq!(sub.reason(), "");

    h.lifecycle.enable_autorenew(&mut sub).await.unwrap();
    assert_eq!(sub.state(), Active);

    // time passes: the period ended six hours ago
    let lapsed = Subscription::from_parts(SubscriptionParts {
        id: sub.id(),
        state: sub.state(),
        start: sub.start(),
        end: h.hours_ago(),
        reference: sub.reference().clone(),
        last_updated: sub.last_updated(),
        reason: sub.reason().to_string(),
    });
    h.store.replace(lapsed);

    assert_eq!(h.triggers.trigger_renewals().await.unwrap(), 1);
    assert_eq!(h.state_of(sub.id()).await, Renewing);
}

#[tokio::test]
async fn state_unknown_is_audited_and_published_once() {
    let h = harness();
    let errors = h.record_events(SubscriptionEvent::SubscriptionError);
    let mut sub = h.seed(Renewing, h.hours_ago(), h.hours_ago()).await;

    h.lifecycle
        .state_unknown(&mut sub, TransitionNote::described("WAT"))
        .await
        .unwrap();

    assert_eq!(sub.state(), ErrorState);
    assert_eq!(sub.reason(), "WAT");

    let history = h.lifecycle.history(sub.id()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "WAT");
    assert_eq!(history[0].transition, "state_unknown");
    assert_eq!(history[0].source_state, Renewing);
    assert_eq!(history[0].target_state, ErrorState);

    let delivered = errors.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0], sub);
}

#[tokio::test]
async fn undescribed_transitions_are_not_audited() {
    let h = harness();
    let mut sub = h.seed(Renewing, h.hours_ago(), h.hours_ago()).await;
    h.lifecycle
        .renewal_failed(&mut sub, TransitionNote::reason("insufficient funds"))
        .await
        .unwrap();
    assert_eq!(sub.reason(), "insufficient funds");
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn listener_failures_never_reach_the_caller() {
    let h = harness();
    h.bus
        .subscribe(SubscriptionEvent::RenewalFailed, |_| Err("mailer down".into()));
    h.bus
        .subscribe(SubscriptionEvent::RenewalFailed, |_| panic!("listener bug"));
    let after = h.record_events(SubscriptionEvent::RenewalFailed);

    let mut sub = h.seed(Renewing, h.hours_ago(), h.hours_ago()).await;
    h.lifecycle
        .renewal_failed(&mut sub, TransitionNote::described("DECLINED"))
        .await
        .unwrap();

    assert_eq!(h.state_of(sub.id()).await, Suspended);
    assert_eq!(after.lock().len(), 1);
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn payload_is_the_persisted_record() {
    let h = harness();
    let ended = h.record_events(SubscriptionEvent::SubscriptionEnded);
    let mut sub = h.seed(Suspended, h.hours_ago(), h.hours_ago()).await;
    h.lifecycle
        .end_subscription(&mut sub, TransitionNote::described("LetItGo").by("support"))
        .await
        .unwrap();

    let persisted = h.store.get(sub.id()).await.unwrap();
    assert_eq!(ended.lock().as_slice(), &[persisted]);
}

/// An audit store whose database is unreachable.
struct UnreachableAudit;

#[async_trait]
impl AuditStore for UnreachableAudit {
    async fn append(&self, _entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn query(&self, _subscription: SubscriptionId) -> Result<Vec<AuditEntry>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[tokio::test]
async fn audit_failure_still_commits_and_publishes() {
    let h = harness();
    let lifecycle = SubscriptionLifecycle::new(
        Arc::new(h.store.clone()),
        Arc::new(UnreachableAudit),
        Arc::clone(&h.bus),
        Arc::new(h.clock.clone()),
    );
    let errors = h.record_events(SubscriptionEvent::SubscriptionError);
    let mut sub = h.seed(Renewing, h.hours_ago(), h.hours_ago()).await;

    let err = lifecycle
        .state_unknown(&mut sub, TransitionNote::described("WAT"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            LifecycleError::AuditFailed { id, transition: Transition::StateUnknown, .. }
                if id == sub.id()
        ),
        "{err}"
    );
    assert!(err.was_applied());
    assert_eq!(sub.state(), ErrorState);
    assert_eq!(h.store.get(sub.id()).await.unwrap(), sub);
    assert_eq!(errors.lock().as_slice(), &[sub]);
}
