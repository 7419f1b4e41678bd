//! # Time-Based Triggers
//!
//! Batch jobs a scheduler runs periodically. Each trigger selects records
//! with a time-based predicate, walks them through a lazy cursor ordered by
//! ascending `last_updated`, and applies exactly one transition per match.
//!
//! | Trigger | Selects | Applies |
//! |---|---|---|
//! | renewals | ACTIVE, end < now | `renew` |
//! | expiring | EXPIRING, end < now | `end_subscription` |
//! | suspended | SUSPENDED, end < now | `renew` |
//! | suspended_timeout(h) | SUSPENDED, end ≤ now − h | `end_subscription` |
//! | stuck(h, retry) | RENEWING, last_updated ≤ now − h | see below |
//!
//! Stuck renewals go through `renewal_failed` when `retry` is set and
//! through `state_unknown` otherwise.
//!
//! A record that fails (lost a race, stale guard, unreadable row) is logged
//! and skipped; it never aborts the batch. A record whose transition was
//! persisted but not audited counts as updated. Only a failure of the cursor
//! itself ends the run early.

use futures::StreamExt;
use sublife_core::{Clock, SublifeError, Timestamp};
use sublife_state::{TransitionNote, TransitionRequest};
use sublife_store::{query, Predicate, StoreError, SubscriptionQuery};

use crate::config::EngineConfig;
use crate::error::LifecycleError;
use crate::lifecycle::SubscriptionLifecycle;

/// A trigger together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Start renewal of ACTIVE subscriptions past their end.
    Renewals,
    /// End EXPIRING subscriptions past their end.
    Expiring,
    /// Retry renewal of SUSPENDED subscriptions past their end.
    Suspended,
    /// End SUSPENDED subscriptions whose end is `hours` in the past.
    SuspendedTimeout {
        /// Grace period after `end`.
        hours: u32,
    },
    /// Resolve RENEWING subscriptions untouched for `hours`.
    Stuck {
        /// Staleness threshold on `last_updated`.
        hours: u32,
        /// Route to SUSPENDED for another attempt instead of ERROR.
        retry: bool,
    },
}

impl TriggerKind {
    /// Trigger names accepted by [`TriggerKind::parse`].
    pub const NAMES: [&'static str; 5] =
        ["renewals", "expiring", "suspended", "suspended_timeout", "stuck"];

    /// Resolve a trigger by name, taking timeouts and policy from `config`.
    pub fn parse(name: &str, config: &EngineConfig) -> Result<Self, SublifeError> {
        match name.trim() {
            "renewals" => Ok(Self::Renewals),
            "expiring" => Ok(Self::Expiring),
            "suspended" => Ok(Self::Suspended),
            "suspended_timeout" => Ok(Self::SuspendedTimeout {
                hours: config.suspended_timeout_hours,
            }),
            "stuck" => Ok(Self::Stuck {
                hours: config.stuck_timeout_hours,
                retry: config.stuck_retry,
            }),
            other => Err(SublifeError::UnknownName {
                kind: "trigger",
                name: other.to_string(),
            }),
        }
    }

    /// The trigger's name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Renewals => "renewals",
            Self::Expiring => "expiring",
            Self::Suspended => "suspended",
            Self::SuspendedTimeout { .. } => "suspended_timeout",
            Self::Stuck { .. } => "stuck",
        }
    }

    /// Records this trigger acts on at `now`.
    pub fn predicate(&self, now: Timestamp) -> Predicate {
        match *self {
            Self::Renewals => query::renewals_due(now),
            Self::Expiring => query::expiring(now),
            Self::Suspended => query::suspended(now),
            Self::SuspendedTimeout { hours } => query::suspended_timeout(now, hours),
            Self::Stuck { hours, .. } => query::stuck(now, hours),
        }
    }

    /// The transition applied to each match.
    pub fn request(&self) -> TransitionRequest {
        match *self {
            Self::Renewals | Self::Suspended => TransitionRequest::renew(),
            Self::Expiring | Self::SuspendedTimeout { .. } => {
                TransitionRequest::end_subscription(TransitionNote::default())
            }
            Self::Stuck { retry: true, .. } => {
                TransitionRequest::renewal_failed(TransitionNote::default())
            }
            Self::Stuck { retry: false, .. } => {
                TransitionRequest::state_unknown(TransitionNote::default())
            }
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one trigger run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerReport {
    /// Records transitioned.
    pub updated: usize,
    /// Records matched but not transitioned.
    pub skipped: usize,
}

/// Runs triggers against a lifecycle service.
#[derive(Debug, Clone)]
pub struct TriggerEngine {
    lifecycle: SubscriptionLifecycle,
}

impl TriggerEngine {
    /// Wrap a lifecycle service.
    pub fn new(lifecycle: SubscriptionLifecycle) -> Self {
        Self { lifecycle }
    }

    /// The wrapped service.
    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    /// ACTIVE, end < now → RENEWING.
    pub async fn trigger_renewals(&self) -> Result<usize, LifecycleError> {
        self.count(TriggerKind::Renewals).await
    }

    /// EXPIRING, end < now → ENDED.
    pub async fn trigger_expiring(&self) -> Result<usize, LifecycleError> {
        self.count(TriggerKind::Expiring).await
    }

    /// SUSPENDED, end < now → RENEWING.
    pub async fn trigger_suspended(&self) -> Result<usize, LifecycleError> {
        self.count(TriggerKind::Suspended).await
    }

    /// SUSPENDED, end ≤ now − `timeout_hours` → ENDED.
    pub async fn trigger_suspended_timeout(
        &self,
        timeout_hours: u32,
    ) -> Result<usize, LifecycleError> {
        self.count(TriggerKind::SuspendedTimeout {
            hours: timeout_hours,
        })
        .await
    }

    /// RENEWING, last_updated ≤ now − `timeout_hours` → SUSPENDED if
    /// `retry`, else ERROR.
    pub async fn trigger_stuck(
        &self,
        timeout_hours: u32,
        retry: bool,
    ) -> Result<usize, LifecycleError> {
        self.count(TriggerKind::Stuck {
            hours: timeout_hours,
            retry,
        })
        .await
    }

    async fn count(&self, kind: TriggerKind) -> Result<usize, LifecycleError> {
        Ok(self.run(kind).await?.updated)
    }

    /// Run one trigger to completion.
    ///
    /// # Errors
    ///
    /// Only when the cursor itself fails. Per-record failures are counted
    /// in [`TriggerReport::skipped`].
    pub async fn run(&self, kind: TriggerKind) -> Result<TriggerReport, LifecycleError> {
        let now = self.lifecycle.clock().now();
        let selection = SubscriptionQuery::new(kind.predicate(now));
        let mut cursor = self.lifecycle.store().filter(&selection);
        let mut report = TriggerReport::default();

        while let Some(next) = cursor.next().await {
            let mut sub = match next {
                Ok(sub) => sub,
                Err(StoreError::Corrupt { id, source }) => {
                    tracing::warn!(
                        trigger = kind.name(),
                        subscription = %id,
                        error = %source,
                        "skipping unreadable record"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match self.lifecycle.apply(&mut sub, kind.request()).await {
                Ok(()) => report.updated += 1,
                Err(e) if e.was_applied() => report.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        trigger = kind.name(),
                        subscription = %sub.id(),
                        error = %e,
                        "trigger skipped record"
                    );
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            trigger = kind.name(),
            updated = report.updated,
            skipped = report.skipped,
            "Trigger [{}] updated [{}] records",
            kind.name(),
            report.updated
        );
        Ok(report)
    }
}
