//! # sublife-store — Subscription and Audit Storage
//!
//! Storage contracts the lifecycle engine is written against, plus two
//! implementations of each:
//!
//! - **Contracts** (`store.rs`): [`SubscriptionStore`] with conditional
//!   writes and lazy cursors, and the append-only [`AuditStore`].
//! - **Queries** (`query.rs`): composable [`Predicate`]s and the named
//!   trigger predicates.
//! - **Memory** (`memory.rs`): `parking_lot`-guarded maps for tests and
//!   single-process use.
//! - **Postgres** (`postgres.rs`): SQLx stores over the embedded
//!   migrations in `migrations/`.
//!
//! Every store stamps `last_updated` itself on a successful write, so the
//! value strictly increases per record regardless of clock resolution.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::StoreError;
pub use memory::{MemoryAuditStore, MemorySubscriptionStore};
pub use postgres::{PgAuditStore, PgSubscriptionStore, DEFAULT_PAGE_SIZE};
pub use query::{Comparison, Field, Order, Predicate, SubscriptionQuery};
pub use store::{next_last_updated, AuditEntry, AuditStore, NewAuditEntry, SubscriptionStore};
