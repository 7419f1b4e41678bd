//! # In-Memory Stores
//!
//! Thread-safe, cloneable stores backed by `parking_lot::RwLock`. Clones
//! share the same data.
//!
//! All lock scopes are synchronous and never span an `.await`. The
//! conditional write runs read-validate-write under one write guard,
//! which is the row-level lock the store contract asks for: two writers
//! racing on the same record serialize, and the loser sees a state outside
//! its expected set.
//!
//! `filter` snapshots the ordered ids of matching records and then reads
//! each record lazily as the stream is polled, re-checking the predicate so
//! a record changed mid-scan is skipped rather than yielded stale.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use sublife_core::{AuditEntryId, Reference, SubscriptionId, Timestamp};
use sublife_state::{Subscription, SubscriptionChanges, SubscriptionState};

use crate::error::StoreError;
use crate::query::{Order, SubscriptionQuery};
use crate::store::{next_last_updated, AuditEntry, AuditStore, NewAuditEntry, SubscriptionStore};

// -- Subscriptions --------------------------------------------------------

/// In-memory [`SubscriptionStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriptionStore {
    rows: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl MemorySubscriptionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed record, e.g. one loaded from a fixture.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the id is already present.
    pub fn insert(&self, sub: Subscription) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&sub.id()) {
            return Err(StoreError::Duplicate(sub.id()));
        }
        rows.insert(sub.id(), sub);
        Ok(())
    }

    /// Overwrite a record wholesale, bypassing the transition guard, as an
    /// out-of-band writer (data repair, fixtures) would.
    pub fn replace(&self, sub: Subscription) {
        self.rows.write().insert(sub.id(), sub);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ordered_ids(&self, query: &SubscriptionQuery) -> Vec<SubscriptionId> {
        let rows = self.rows.read();
        let mut keyed: Vec<_> = rows
            .values()
            .filter(|sub| query.predicate.matches(sub))
            .map(|sub| (sub.last_updated(), sub.id()))
            .collect();
        keyed.sort_unstable();
        if query.order == Order::NewestFirst {
            keyed.reverse();
        }
        keyed.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create(
        &self,
        state: SubscriptionState,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
        created_at: Timestamp,
    ) -> Result<Subscription, StoreError> {
        let sub = Subscription::new(state, start, end, reference, created_at);
        self.insert(sub.clone())?;
        Ok(sub)
    }

    async fn get(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn filter<'a>(
        &'a self,
        query: &'a SubscriptionQuery,
    ) -> BoxStream<'a, Result<Subscription, StoreError>> {
        let ids = self.ordered_ids(query);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        stream::iter(ids)
            .filter_map(move |id| {
                let current = self
                    .rows
                    .read()
                    .get(&id)
                    .filter(|sub| query.predicate.matches(sub))
                    .cloned();
                futures::future::ready(current.map(Ok))
            })
            .take(limit)
            .boxed()
    }

    async fn count(&self, query: &SubscriptionQuery) -> Result<u64, StoreError> {
        let rows = self.rows.read();
        let n = rows.values().filter(|s| query.predicate.matches(s)).count();
        Ok(n as u64)
    }

    async fn update(
        &self,
        id: SubscriptionId,
        expected: &[SubscriptionState],
        changes: &SubscriptionChanges,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, StoreError> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !expected.contains(&row.state()) || row.last_updated() != changes.based_on() {
            return Ok(None);
        }
        let stamp = next_last_updated(row.last_updated(), now);
        row.commit(changes, stamp);
        Ok(Some(stamp))
    }
}

// -- Audit ----------------------------------------------------------------

/// In-memory [`AuditStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditStore {
    /// Create an empty audit store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all subscriptions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entry has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry::from_new(AuditEntryId::new(), entry);
        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, subscription: SubscriptionId) -> Result<Vec<AuditEntry>, StoreError> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.subscription_id == subscription)
            .cloned()
            .collect();
        // stable: equal timestamps keep append order
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }
}
