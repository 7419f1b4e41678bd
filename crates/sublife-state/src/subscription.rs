//! # Subscription Record
//!
//! The single entity of the lifecycle engine. Its fields are private: the
//! only way to change `state` is to [`plan`](Subscription::plan) a
//! transition, which checks the guard and yields a [`SubscriptionChanges`]
//! value, and then [`commit`](Subscription::commit) those changes once the
//! store has accepted them. `SubscriptionChanges` has no public
//! constructor, so a change set always comes from a passed guard.
//!
//! Records serialize for output but do not deserialize: stores rebuild
//! persisted rows through [`Subscription::from_parts`].

use serde::Serialize;
use sublife_core::{Reference, SubscriptionId, Timestamp};

use crate::state::SubscriptionState;
use crate::transition::{Transition, TransitionError, TransitionRequest};

/// A time-bounded subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    id: SubscriptionId,
    state: SubscriptionState,
    start: Timestamp,
    end: Timestamp,
    reference: Reference,
    last_updated: Timestamp,
    reason: String,
}

/// Every persisted field of a subscription, for stores rebuilding a record
/// from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParts {
    /// Record identifier.
    pub id: SubscriptionId,
    /// Persisted state.
    pub state: SubscriptionState,
    /// Start of the subscription period.
    pub start: Timestamp,
    /// End of the current period.
    pub end: Timestamp,
    /// External reference.
    pub reference: Reference,
    /// Last persisted mutation.
    pub last_updated: Timestamp,
    /// Reason set by the most recent transition.
    pub reason: String,
}

impl Subscription {
    /// Build a new record in `state` with an empty reason.
    ///
    /// Stores call this from `create`; application code normally goes
    /// through the lifecycle service, which always starts records ACTIVE.
    pub fn new(
        state: SubscriptionState,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            state,
            start,
            end,
            reference,
            last_updated: created_at,
            reason: String::new(),
        }
    }

    /// Rebuild a record exactly as persisted.
    pub fn from_parts(parts: SubscriptionParts) -> Self {
        Self {
            id: parts.id,
            state: parts.state,
            start: parts.start,
            end: parts.end,
            reference: parts.reference,
            last_updated: parts.last_updated,
            reason: parts.reason,
        }
    }

    /// Record identifier.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Start of the subscription period.
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// End of the current period.
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// External reference.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Time of the last persisted mutation.
    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    /// Reason recorded by the most recent transition.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Check the guard for `request` and compute the resulting field values.
    ///
    /// Pure: `self` is not touched, whether the guard passes or not.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidTransition`] when the current state is not
    /// one of the transition's sources.
    pub fn plan(
        &self,
        request: &TransitionRequest,
        now: Timestamp,
    ) -> Result<SubscriptionChanges, TransitionError> {
        let transition = request.transition();
        if !transition.permits(self.state) {
            return Err(TransitionError::invalid(transition, self.state));
        }

        let mut changes = SubscriptionChanges {
            transition,
            from: self.state,
            based_on: self.last_updated,
            state: transition.target(),
            end: self.end,
            reference: self.reference.clone(),
            reason: String::new(),
        };

        if transition.accepts_reason() {
            changes.reason = request.note().effective_reason().to_string();
        }
        match transition {
            Transition::Renewed => {
                if let Some((end, reference)) = request.renewal() {
                    changes.end = *end;
                    changes.reference = reference.clone();
                }
            }
            Transition::EndSubscription => changes.end = now,
            _ => {}
        }
        Ok(changes)
    }

    /// Apply a planned change set that the store has persisted.
    pub fn commit(&mut self, changes: &SubscriptionChanges, last_updated: Timestamp) {
        self.state = changes.state;
        self.end = changes.end;
        self.reference = changes.reference.clone();
        self.reason = changes.reason.clone();
        self.last_updated = last_updated;
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} to {}",
            self.state,
            self.start.date(),
            self.end.date()
        )
    }
}

/// The new values of a subscription's mutable fields after a transition.
///
/// Only produced by [`Subscription::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChanges {
    transition: Transition,
    from: SubscriptionState,
    based_on: Timestamp,
    state: SubscriptionState,
    end: Timestamp,
    reference: Reference,
    reason: String,
}

impl SubscriptionChanges {
    /// The transition that produced this change set.
    pub fn transition(&self) -> Transition {
        self.transition
    }

    /// State the record was in when planned.
    pub fn from(&self) -> SubscriptionState {
        self.from
    }

    /// `last_updated` of the copy this was planned from. Stores write the
    /// change set only while the persisted record still carries it.
    pub fn based_on(&self) -> Timestamp {
        self.based_on
    }

    /// New state (always the transition's target).
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// New period end.
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// New reference.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// New reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
