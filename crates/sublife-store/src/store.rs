//! # Store Contracts
//!
//! The boundary between the lifecycle engine and durable storage.
//!
//! ## Conditional writes
//!
//! [`SubscriptionStore::update`] is the last word on a transition's guard:
//! it writes only if the persisted state is still one of `expected` *and*
//! the persisted `last_updated` is still the one the change set was planned
//! from. A record that left the source set and came back (RENEWING →
//! ACTIVE → RENEWING) therefore rejects writes planned from the older copy.
//! "Not applied" is reported as `None`, not an error. Callers must not
//! retry blindly on `None`.
//!
//! ## Lazy cursors
//!
//! [`SubscriptionStore::filter`] returns a stream, not a vector. Trigger
//! batches may match a large share of the table; implementations must not
//! materialize the whole result set.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sublife_core::{AuditEntryId, Reference, SubscriptionId, Timestamp};
use sublife_state::{Subscription, SubscriptionChanges, SubscriptionState};

use crate::error::StoreError;
use crate::query::SubscriptionQuery;

/// Durable storage for subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new record with an empty reason and
    /// `last_updated = created_at`.
    async fn create(
        &self,
        state: SubscriptionState,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
        created_at: Timestamp,
    ) -> Result<Subscription, StoreError>;

    /// Fetch a record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record has this id.
    async fn get(&self, id: SubscriptionId) -> Result<Subscription, StoreError>;

    /// Lazily stream the records matching `query`, in `query.order`.
    fn filter<'a>(
        &'a self,
        query: &'a SubscriptionQuery,
    ) -> BoxStream<'a, Result<Subscription, StoreError>>;

    /// Number of records matching `query.predicate` (ignores limit).
    async fn count(&self, query: &SubscriptionQuery) -> Result<u64, StoreError>;

    /// Conditionally persist `changes`.
    ///
    /// Applies only if the record's *persisted* state is in `expected` and
    /// its persisted `last_updated` equals [`SubscriptionChanges::based_on`].
    /// On success the store stamps `last_updated = max(now, previous + 1µs)`
    /// and returns the stamp; `None` means the write did not apply.
    async fn update(
        &self,
        id: SubscriptionId,
        expected: &[SubscriptionState],
        changes: &SubscriptionChanges,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, StoreError>;
}

/// Append-only storage for transition history.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry.
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Every entry for `subscription`, oldest first.
    async fn query(&self, subscription: SubscriptionId) -> Result<Vec<AuditEntry>, StoreError>;
}

/// An audit entry before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    /// The subscription that transitioned.
    pub subscription_id: SubscriptionId,
    /// Transition name, e.g. `"state_unknown"`.
    pub transition: String,
    /// State before the transition.
    pub source_state: SubscriptionState,
    /// State after the transition.
    pub target_state: SubscriptionState,
    /// Caller-supplied description (never empty).
    pub description: String,
    /// Who performed the transition, where recorded.
    pub actor: Option<String>,
    /// When the transition was persisted.
    pub timestamp: Timestamp,
}

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// The subscription that transitioned.
    pub subscription_id: SubscriptionId,
    /// Transition name.
    pub transition: String,
    /// State before the transition.
    pub source_state: SubscriptionState,
    /// State after the transition.
    pub target_state: SubscriptionState,
    /// Caller-supplied description.
    pub description: String,
    /// Who performed the transition.
    pub actor: Option<String>,
    /// When the transition was persisted.
    pub timestamp: Timestamp,
}

impl AuditEntry {
    /// Assign an id to a new entry.
    pub fn from_new(id: AuditEntryId, entry: NewAuditEntry) -> Self {
        Self {
            id,
            subscription_id: entry.subscription_id,
            transition: entry.transition,
            source_state: entry.source_state,
            target_state: entry.target_state,
            description: entry.description,
            actor: entry.actor,
            timestamp: entry.timestamp,
        }
    }
}

/// `max(now, previous + 1µs)`: the strictly increasing `last_updated` rule
/// shared by every store.
pub fn next_last_updated(previous: Timestamp, now: Timestamp) -> Timestamp {
    now.max(previous.next_tick())
}
