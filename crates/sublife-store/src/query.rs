//! # Query Predicates
//!
//! Composable boolean expressions over a subscription's state, timestamps
//! and reference. The same [`Predicate`] value is evaluated directly by the
//! in-memory store and compiled to a SQL `WHERE` clause by the Postgres
//! store, so both stores select exactly the same records.
//!
//! The named constructors at the bottom of this module are the predicates
//! the trigger engine runs. They take `now` explicitly; a predicate never
//! reads the clock itself.

use sublife_core::Timestamp;
use sublife_state::{Subscription, SubscriptionState};

/// A timestamp column of the subscription record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Start of the subscription period.
    Start,
    /// End of the current period.
    End,
    /// Last persisted mutation.
    LastUpdated,
}

impl Field {
    /// Read the field from a record.
    pub fn of(&self, sub: &Subscription) -> Timestamp {
        match self {
            Self::Start => sub.start(),
            Self::End => sub.end(),
            Self::LastUpdated => sub.last_updated(),
        }
    }

    /// Column name in the `subscriptions` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Start => "starts_at",
            Self::End => "ends_at",
            Self::LastUpdated => "last_updated",
        }
    }
}

/// Comparison operator between a field and an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `field < at`
    Before,
    /// `field <= at`
    AtOrBefore,
    /// `field > at`
    After,
    /// `field >= at`
    AtOrAfter,
}

impl Comparison {
    /// Evaluate `lhs <op> rhs`.
    pub fn holds(&self, lhs: Timestamp, rhs: Timestamp) -> bool {
        match self {
            Self::Before => lhs < rhs,
            Self::AtOrBefore => lhs <= rhs,
            Self::After => lhs > rhs,
            Self::AtOrAfter => lhs >= rhs,
        }
    }

    /// SQL operator.
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Before => " < ",
            Self::AtOrBefore => " <= ",
            Self::After => " > ",
            Self::AtOrAfter => " >= ",
        }
    }
}

/// A boolean expression over subscription fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every record.
    All,
    /// `state = s`
    StateIs(SubscriptionState),
    /// `state ∈ set`
    StateIn(Vec<SubscriptionState>),
    /// `field <op> at`
    Compare {
        /// Timestamp field.
        field: Field,
        /// Operator.
        op: Comparison,
        /// Right-hand side.
        at: Timestamp,
    },
    /// Reference begins with the given text.
    ReferenceStartsWith(String),
    /// Conjunction; an empty list is true.
    And(Vec<Predicate>),
    /// Disjunction; an empty list is false.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// `state = s`
    pub fn state(s: SubscriptionState) -> Self {
        Self::StateIs(s)
    }

    /// `field < at`
    pub fn before(field: Field, at: Timestamp) -> Self {
        Self::Compare {
            field,
            op: Comparison::Before,
            at,
        }
    }

    /// `field <= at`
    pub fn at_or_before(field: Field, at: Timestamp) -> Self {
        Self::Compare {
            field,
            op: Comparison::AtOrBefore,
            at,
        }
    }

    /// `field >= at`
    pub fn at_or_after(field: Field, at: Timestamp) -> Self {
        Self::Compare {
            field,
            op: Comparison::AtOrAfter,
            at,
        }
    }

    /// `self ∧ other`, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            lhs => Self::And(vec![lhs, other]),
        }
    }

    /// `self ∨ other`
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            lhs => Self::Or(vec![lhs, other]),
        }
    }

    /// `¬self`
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against a record.
    pub fn matches(&self, sub: &Subscription) -> bool {
        match self {
            Self::All => true,
            Self::StateIs(s) => sub.state() == *s,
            Self::StateIn(set) => set.contains(&sub.state()),
            Self::Compare { field, op, at } => op.holds(field.of(sub), *at),
            Self::ReferenceStartsWith(prefix) => sub.reference().starts_with(prefix),
            Self::And(parts) => parts.iter().all(|p| p.matches(sub)),
            Self::Or(parts) => parts.iter().any(|p| p.matches(sub)),
            Self::Not(inner) => !inner.matches(sub),
        }
    }
}

/// Result ordering by `last_updated` (ties broken by id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Longest-waiting records first. Used by every trigger.
    #[default]
    OldestFirst,
    /// Most recently touched first.
    NewestFirst,
}

/// A predicate plus ordering and an optional cap on results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionQuery {
    /// Which records to select.
    pub predicate: Predicate,
    /// Cursor order.
    pub order: Order,
    /// Stop after this many records.
    pub limit: Option<u64>,
}

impl SubscriptionQuery {
    /// Select records matching `predicate`, oldest `last_updated` first.
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            order: Order::OldestFirst,
            limit: None,
        }
    }

    /// Reverse the order.
    pub fn newest_first(mut self) -> Self {
        self.order = Order::NewestFirst;
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ─── Trigger predicates ──────────────────────────────────────────────

/// ACTIVE subscriptions whose period has ended.
pub fn renewals_due(now: Timestamp) -> Predicate {
    Predicate::state(SubscriptionState::Active).and(Predicate::before(Field::End, now))
}

/// EXPIRING subscriptions whose period has ended.
pub fn expiring(now: Timestamp) -> Predicate {
    Predicate::state(SubscriptionState::Expiring).and(Predicate::before(Field::End, now))
}

/// SUSPENDED subscriptions whose period has ended (retry candidates).
pub fn suspended(now: Timestamp) -> Predicate {
    Predicate::state(SubscriptionState::Suspended).and(Predicate::before(Field::End, now))
}

/// SUSPENDED subscriptions whose period ended at least `timeout_hours` ago.
///
/// Keyed off `end`, not `last_updated`: failed retries touch
/// `last_updated` and must not push the timeout back.
pub fn suspended_timeout(now: Timestamp, timeout_hours: u32) -> Predicate {
    Predicate::state(SubscriptionState::Suspended).and(Predicate::at_or_before(
        Field::End,
        now.minus_hours(i64::from(timeout_hours)),
    ))
}

/// RENEWING subscriptions untouched for at least `timeout_hours`.
pub fn stuck(now: Timestamp, timeout_hours: u32) -> Predicate {
    Predicate::state(SubscriptionState::Renewing).and(Predicate::at_or_before(
        Field::LastUpdated,
        now.minus_hours(i64::from(timeout_hours)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sublife_core::Reference;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn make(state: SubscriptionState, end: Timestamp, last_updated: Timestamp) -> Subscription {
        Subscription::new(
            state,
            ts("2025-01-01T00:00:00Z"),
            end,
            Reference::new("REF-q").unwrap(),
            last_updated,
        )
    }

    const NOW: &str = "2026-06-10T12:00:00Z";

    #[test]
    fn test_renewals_due() {
        let now = ts(NOW);
        let p = renewals_due(now);
        assert!(p.matches(&make(SubscriptionState::Active, now.minus_hours(6), now)));
        assert!(!p.matches(&make(SubscriptionState::Active, now, now)));
        assert!(!p.matches(&make(SubscriptionState::Active, now.plus_days(365), now)));
        assert!(!p.matches(&make(SubscriptionState::Expiring, now.minus_hours(6), now)));
    }

    #[test]
    fn test_suspended_timeout_uses_end() {
        let now = ts(NOW);
        let p = suspended_timeout(now, 72);
        assert!(p.matches(&make(SubscriptionState::Suspended, now.minus_days(4), now)));
        assert!(!p.matches(&make(SubscriptionState::Suspended, now.minus_hours(6), now)));
        // exactly at the boundary counts
        assert!(p.matches(&make(SubscriptionState::Suspended, now.minus_hours(72), now)));
        assert!(!p.matches(&make(SubscriptionState::Renewing, now.minus_days(4), now)));
    }

    #[test]
    fn test_stuck_uses_last_updated() {
        let now = ts(NOW);
        let p = stuck(now, 2);
        let old = now.minus_days(4);
        assert!(p.matches(&make(SubscriptionState::Renewing, old, now.minus_hours(6))));
        assert!(!p.matches(&make(SubscriptionState::Renewing, old, now)));
        assert!(!p.matches(&make(SubscriptionState::Ended, old, now.minus_hours(6))));
    }

    #[test]
    fn test_composition() {
        let now = ts(NOW);
        let sub = make(SubscriptionState::Ended, now, now);
        assert!(Predicate::All.matches(&sub));
        assert!(!Predicate::Or(vec![]).matches(&sub));
        assert!(Predicate::And(vec![]).matches(&sub));
        assert!(Predicate::state(SubscriptionState::Active)
            .or(Predicate::state(SubscriptionState::Ended))
            .matches(&sub));
        assert!(Predicate::state(SubscriptionState::Active).negate().matches(&sub));
        assert!(Predicate::StateIn(vec![SubscriptionState::Ended]).matches(&sub));
        assert!(Predicate::ReferenceStartsWith("REF-".into()).matches(&sub));
        assert!(!Predicate::ReferenceStartsWith("XYZ".into()).matches(&sub));
    }

    #[test]
    fn test_and_flattens() {
        let p = Predicate::All
            .and(Predicate::state(SubscriptionState::Active))
            .and(Predicate::state(SubscriptionState::Ended));
        match p {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected flattened And, got {other:?}"),
        }
    }
}
