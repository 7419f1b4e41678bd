//! Store errors.

use sublife_core::{SubscriptionId, SublifeError};
use thiserror::Error;

/// Errors surfaced by subscription and audit stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("subscription {0} not found")]
    NotFound(SubscriptionId),

    /// A record with the same identifier already exists.
    #[error("subscription {0} already exists")]
    Duplicate(SubscriptionId),

    /// A persisted row could not be turned back into a record.
    #[error("corrupt row for subscription {id}: {source}")]
    Corrupt {
        /// The offending row.
        id: SubscriptionId,
        /// What failed to validate.
        source: SublifeError,
    },

    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
