//! Engine errors.

use sublife_core::{SubscriptionId, SublifeError};
use sublife_state::{Transition, TransitionError};
use sublife_store::StoreError;
use thiserror::Error;

/// Errors surfaced by lifecycle operations and triggers.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The record's state is not a source of the requested transition.
    /// Nothing was written.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The conditional write found the record had changed since the
    /// caller's copy was read. Nothing was written; the copy is stale.
    #[error("subscription {id} changed concurrently; {transition} did not apply")]
    ConcurrentModification {
        /// The contested record.
        id: SubscriptionId,
        /// The transition that lost the race.
        transition: Transition,
    },

    /// The transition was persisted and its event published, but the audit
    /// entry could not be written. The record is in its new state.
    #[error("{transition} applied to subscription {id} but was not audited: {source}")]
    AuditFailed {
        /// The transitioned record.
        id: SubscriptionId,
        /// The applied transition.
        transition: Transition,
        /// Why the audit write failed.
        #[source]
        source: StoreError,
    },

    /// No record has this id.
    #[error("subscription {0} not found")]
    NotFound(SubscriptionId),

    /// A caller-supplied value failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] SublifeError),

    /// The store failed.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    /// Whether the transition took effect despite the error.
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::AuditFailed { .. })
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Invalid environment configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to a value that does not parse.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required variable is not set.
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_becomes_lifecycle_not_found() {
        let id = SubscriptionId::new();
        let err: LifecycleError = StoreError::NotFound(id).into();
        assert!(matches!(err, LifecycleError::NotFound(x) if x == id));

        let err: LifecycleError = StoreError::Duplicate(id).into();
        assert!(matches!(err, LifecycleError::Store(StoreError::Duplicate(_))));
        assert!(!err.was_applied());
    }

    #[test]
    fn audit_failure_reports_the_applied_transition() {
        let id = SubscriptionId::new();
        let err = LifecycleError::AuditFailed {
            id,
            transition: Transition::StateUnknown,
            source: StoreError::Duplicate(id),
        };
        assert!(err.was_applied());
        let text = err.to_string();
        assert!(text.contains("state_unknown"), "{text}");
        assert!(text.contains(&id.to_string()), "{text}");
    }
}
