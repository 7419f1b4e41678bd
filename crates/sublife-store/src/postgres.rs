//! # Postgres Stores
//!
//! SQLx-backed implementations of [`SubscriptionStore`] and [`AuditStore`]
//! over the `subscriptions` and `subscription_transitions` tables created by
//! the embedded migrations.
//!
//! ## Cursors
//!
//! `filter` pages through the result set with keyset pagination on
//! `(last_updated, id)`, one query per page of `page_size` rows. No page is
//! fetched until the stream is polled past the previous one, and no
//! connection is held between pages.
//!
//! ## Conditional writes
//!
//! `update` is a single `UPDATE ... WHERE id = $id AND state = ANY($expected)
//! RETURNING last_updated`. Postgres takes the row lock, re-evaluates the
//! state predicate against the committed row, and applies or skips the
//! write atomically; there is no read-then-write window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Postgres, QueryBuilder};
use sublife_core::{AuditEntryId, Reference, SubscriptionId, Timestamp};
use sublife_state::{Subscription, SubscriptionChanges, SubscriptionParts, SubscriptionState};
use uuid::Uuid;

pub use sqlx::postgres::PgPool;

use crate::error::StoreError;
use crate::query::{Order, Predicate, SubscriptionQuery};
use crate::store::{AuditEntry, AuditStore, NewAuditEntry, SubscriptionStore};

/// Rows fetched per cursor page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 500;

const COLUMNS: &str = "id, state, starts_at, ends_at, reference, last_updated, reason";

// ─── Pool ────────────────────────────────────────────────────────────

/// Open a connection pool to `url`.
pub async fn connect(url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}

// ─── Subscriptions ───────────────────────────────────────────────────

/// Postgres [`SubscriptionStore`].
#[derive(Debug, Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
    page_size: u64,
}

impl PgSubscriptionStore {
    /// Wrap a pool, paging cursors [`DEFAULT_PAGE_SIZE`] rows at a time.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the cursor page size (minimum 1).
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_page(
        &self,
        query: &SubscriptionQuery,
        after: Option<(DateTime<Utc>, Uuid)>,
        take: u64,
    ) -> Result<Vec<SubscriptionRow>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(COLUMNS).push(" FROM subscriptions WHERE ");
        push_predicate(&mut qb, &query.predicate);

        let (cmp, dir) = match query.order {
            Order::OldestFirst => (" > ", "ASC"),
            Order::NewestFirst => (" < ", "DESC"),
        };
        if let Some((last_updated, id)) = after {
            qb.push(" AND (last_updated, id)")
                .push(cmp)
                .push("(")
                .push_bind(last_updated)
                .push(", ")
                .push_bind(id)
                .push(")");
        }
        qb.push(format!(" ORDER BY last_updated {dir}, id {dir} LIMIT "))
            .push_bind(i64::try_from(take).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<SubscriptionRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

struct Cursor {
    after: Option<(DateTime<Utc>, Uuid)>,
    fetched: u64,
    exhausted: bool,
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn create(
        &self,
        state: SubscriptionState,
        start: Timestamp,
        end: Timestamp,
        reference: Reference,
        created_at: Timestamp,
    ) -> Result<Subscription, StoreError> {
        let sub = Subscription::new(state, start, end, reference, created_at);
        let result = sqlx::query(
            "INSERT INTO subscriptions
             (id, state, starts_at, ends_at, reference, last_updated, reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(sub.id().0)
        .bind(sub.state().code())
        .bind(sub.start().into_datetime())
        .bind(sub.end().into_datetime())
        .bind(sub.reference().as_str())
        .bind(sub.last_updated().into_datetime())
        .bind(sub.reason())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(sub),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(sub.id()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.into_record()
    }

    fn filter<'a>(
        &'a self,
        query: &'a SubscriptionQuery,
    ) -> BoxStream<'a, Result<Subscription, StoreError>> {
        let start = Cursor {
            after: None,
            fetched: 0,
            exhausted: false,
        };
        stream::try_unfold(start, move |mut cursor| async move {
            if cursor.exhausted {
                return Ok(None);
            }
            let remaining = query.limit.map(|l| l.saturating_sub(cursor.fetched));
            if remaining == Some(0) {
                return Ok(None);
            }
            let take = remaining.map_or(self.page_size, |r| r.min(self.page_size));

            let rows = self.fetch_page(query, cursor.after, take).await?;
            let Some(last) = rows.last() else {
                return Ok(None);
            };
            cursor.after = Some((last.last_updated, last.id));
            cursor.fetched += rows.len() as u64;
            cursor.exhausted = (rows.len() as u64) < take;

            let page: Vec<_> = rows.into_iter().map(SubscriptionRow::into_record).collect();
            Ok::<_, StoreError>(Some((stream::iter(page), cursor)))
        })
        .try_flatten()
        .boxed()
    }

    async fn count(&self, query: &SubscriptionQuery) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM subscriptions WHERE ");
        push_predicate(&mut qb, &query.predicate);
        let (n,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn update(
        &self,
        id: SubscriptionId,
        expected: &[SubscriptionState],
        changes: &SubscriptionChanges,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, StoreError> {
        let codes: Vec<i16> = expected.iter().map(SubscriptionState::code).collect();
        let stamped: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "UPDATE subscriptions
             SET state = $1, ends_at = $2, reference = $3, reason = $4,
                 last_updated = GREATEST($5, last_updated + interval '1 microsecond')
             WHERE id = $6 AND state = ANY($7) AND last_updated = $8
             RETURNING last_updated",
        )
        .bind(changes.state().code())
        .bind(changes.end().into_datetime())
        .bind(changes.reference().as_str())
        .bind(changes.reason())
        .bind(now.into_datetime())
        .bind(id.0)
        .bind(&codes)
        .bind(changes.based_on().into_datetime())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((at,)) = stamped {
            return Ok(Some(Timestamp::from_utc(at)));
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = $1)")
                .bind(id.0)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(None)
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

/// Append `predicate` as a boolean SQL expression.
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::All => {
            qb.push("TRUE");
        }
        Predicate::StateIs(state) => {
            qb.push("state = ").push_bind(state.code());
        }
        Predicate::StateIn(states) => {
            let codes: Vec<i16> = states.iter().map(SubscriptionState::code).collect();
            qb.push("state = ANY(").push_bind(codes).push(")");
        }
        Predicate::Compare { field, op, at } => {
            qb.push(field.column())
                .push(op.sql())
                .push_bind(at.into_datetime());
        }
        Predicate::ReferenceStartsWith(prefix) => {
            qb.push("starts_with(reference, ")
                .push_bind(prefix.clone())
                .push(")");
        }
        Predicate::And(parts) => push_joined(qb, parts, " AND ", "TRUE"),
        Predicate::Or(parts) => push_joined(qb, parts, " OR ", "FALSE"),
        Predicate::Not(inner) => {
            qb.push("NOT (");
            push_predicate(qb, inner);
            qb.push(")");
        }
    }
}

fn push_joined(qb: &mut QueryBuilder<'_, Postgres>, parts: &[Predicate], sep: &str, empty: &str) {
    if parts.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(sep);
        }
        push_predicate(qb, part);
    }
    qb.push(")");
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    state: i16,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    reference: String,
    last_updated: DateTime<Utc>,
    reason: String,
}

impl SubscriptionRow {
    fn into_record(self) -> Result<Subscription, StoreError> {
        let id = SubscriptionId(self.id);
        let corrupt = |source| {
            tracing::warn!(%id, error = %source, "unreadable subscription row");
            StoreError::Corrupt { id, source }
        };
        let state = SubscriptionState::from_code(self.state).map_err(corrupt)?;
        let reference = Reference::new(self.reference).map_err(corrupt)?;
        Ok(Subscription::from_parts(SubscriptionParts {
            id,
            state,
            start: Timestamp::from_utc(self.starts_at),
            end: Timestamp::from_utc(self.ends_at),
            reference,
            last_updated: Timestamp::from_utc(self.last_updated),
            reason: self.reason,
        }))
    }
}

// ─── Audit ───────────────────────────────────────────────────────────

/// Postgres [`AuditStore`].
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    /// Wrap a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry::from_new(AuditEntryId::new(), entry);
        sqlx::query(
            "INSERT INTO subscription_transitions
             (id, subscription_id, transition, source_state, target_state,
              description, actor, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.0)
        .bind(entry.subscription_id.0)
        .bind(&entry.transition)
        .bind(entry.source_state.code())
        .bind(entry.target_state.code())
        .bind(&entry.description)
        .bind(entry.actor.as_deref())
        .bind(entry.timestamp.into_datetime())
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn query(&self, subscription: SubscriptionId) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, subscription_id, transition, source_state, target_state,
                    description, actor, created_at
             FROM subscription_transitions
             WHERE subscription_id = $1
             ORDER BY created_at, seq",
        )
        .bind(subscription.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    subscription_id: Uuid,
    transition: String,
    source_state: i16,
    target_state: i16,
    description: String,
    actor: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let id = SubscriptionId(self.subscription_id);
        let corrupt = |source| StoreError::Corrupt { id, source };
        Ok(AuditEntry {
            id: AuditEntryId(self.id),
            subscription_id: id,
            transition: self.transition,
            source_state: SubscriptionState::from_code(self.source_state).map_err(corrupt)?,
            target_state: SubscriptionState::from_code(self.target_state).map_err(corrupt)?,
            description: self.description,
            actor: self.actor,
            timestamp: Timestamp::from_utc(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{stuck, Field};

    fn sql_for(predicate: &Predicate) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_predicate(&mut qb, predicate);
        qb.sql().to_string()
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn test_predicate_sql_shapes() {
        assert_eq!(sql_for(&Predicate::All), "TRUE");
        assert_eq!(sql_for(&Predicate::Or(vec![])), "FALSE");
        assert_eq!(
            sql_for(&Predicate::state(SubscriptionState::Active)),
            "state = $1"
        );
        assert_eq!(
            sql_for(&Predicate::StateIn(vec![SubscriptionState::Renewing])),
            "state = ANY($1)"
        );
        assert_eq!(
            sql_for(&Predicate::before(Field::End, ts("2026-01-01T00:00:00Z"))),
            "ends_at < $1"
        );
        assert_eq!(
            sql_for(&Predicate::ReferenceStartsWith("INV".into()).negate()),
            "NOT (starts_with(reference, $1))"
        );
    }

    #[test]
    fn test_trigger_predicate_compiles_to_conjunction() {
        let sql = sql_for(&stuck(ts("2026-01-01T00:00:00Z"), 2));
        assert_eq!(sql, "(state = $1 AND last_updated <= $2)");
    }
}
