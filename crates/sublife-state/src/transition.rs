//! # Transition Table
//!
//! The seven lifecycle transitions as data. Each [`Transition`] declares a
//! source-state set, a single target, and the event published after it is
//! persisted. One generic routine ([`crate::Subscription::plan`]) checks the
//! guard and computes field effects for all of them, so there is no
//! per-transition guard logic to drift out of sync with this table.
//!
//! | Transition | Sources | Target | Event |
//! |---|---|---|---|
//! | `cancel_autorenew` | ACTIVE | EXPIRING | `autorenew_canceled` |
//! | `enable_autorenew` | EXPIRING | ACTIVE | `autorenew_enabled` |
//! | `renew` | ACTIVE, SUSPENDED | RENEWING | `subscription_due` |
//! | `renewed` | ACTIVE, RENEWING, ERROR | ACTIVE | `subscription_renewed` |
//! | `renewal_failed` | RENEWING, ERROR | SUSPENDED | `renewal_failed` |
//! | `end_subscription` | ACTIVE, SUSPENDED, EXPIRING, ERROR | ENDED | `subscription_ended` |
//! | `state_unknown` | RENEWING | ERROR | `subscription_error` |

use serde::{Deserialize, Serialize};
use sublife_core::{Reference, SublifeError, Timestamp};
use thiserror::Error;

use crate::state::SubscriptionState;
use SubscriptionState::{Active, Ended, Error as ErrorState, Expiring, Renewing, Suspended};

// ─── Transition ──────────────────────────────────────────────────────

/// A named, guarded lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Stop automatic renewal at the end of the period.
    CancelAutorenew,
    /// Resume automatic renewal.
    EnableAutorenew,
    /// Begin a renewal attempt.
    Renew,
    /// A renewal succeeded; extend the period.
    Renewed,
    /// A renewal attempt failed.
    RenewalFailed,
    /// Finish the subscription.
    EndSubscription,
    /// A renewal was interrupted and its outcome is unknown.
    StateUnknown,
}

impl Transition {
    /// Every transition, in table order.
    pub const ALL: [Transition; 7] = [
        Self::CancelAutorenew,
        Self::EnableAutorenew,
        Self::Renew,
        Self::Renewed,
        Self::RenewalFailed,
        Self::EndSubscription,
        Self::StateUnknown,
    ];

    /// The transition name as recorded in the audit log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CancelAutorenew => "cancel_autorenew",
            Self::EnableAutorenew => "enable_autorenew",
            Self::Renew => "renew",
            Self::Renewed => "renewed",
            Self::RenewalFailed => "renewal_failed",
            Self::EndSubscription => "end_subscription",
            Self::StateUnknown => "state_unknown",
        }
    }

    /// States from which this transition may be taken.
    pub fn sources(&self) -> &'static [SubscriptionState] {
        match self {
            Self::CancelAutorenew => &[Active],
            Self::EnableAutorenew => &[Expiring],
            Self::Renew => &[Active, Suspended],
            Self::Renewed => &[Active, Renewing, ErrorState],
            Self::RenewalFailed => &[Renewing, ErrorState],
            Self::EndSubscription => &[Active, Suspended, Expiring, ErrorState],
            Self::StateUnknown => &[Renewing],
        }
    }

    /// The state every successful application lands in.
    pub fn target(&self) -> SubscriptionState {
        match self {
            Self::CancelAutorenew => Expiring,
            Self::EnableAutorenew => Active,
            Self::Renew => Renewing,
            Self::Renewed => Active,
            Self::RenewalFailed => Suspended,
            Self::EndSubscription => Ended,
            Self::StateUnknown => ErrorState,
        }
    }

    /// The event published once the transition is persisted.
    pub fn event(&self) -> SubscriptionEvent {
        match self {
            Self::CancelAutorenew => SubscriptionEvent::AutorenewCanceled,
            Self::EnableAutorenew => SubscriptionEvent::AutorenewEnabled,
            Self::Renew => SubscriptionEvent::SubscriptionDue,
            Self::Renewed => SubscriptionEvent::SubscriptionRenewed,
            Self::RenewalFailed => SubscriptionEvent::RenewalFailed,
            Self::EndSubscription => SubscriptionEvent::SubscriptionEnded,
            Self::StateUnknown => SubscriptionEvent::SubscriptionError,
        }
    }

    /// Whether the guard admits `from`.
    pub fn permits(&self, from: SubscriptionState) -> bool {
        self.sources().contains(&from)
    }

    /// Whether the audit entry records who performed the transition.
    pub fn accepts_actor(&self) -> bool {
        matches!(self, Self::EndSubscription)
    }

    /// Whether the caller may supply a free-text reason.
    pub fn accepts_reason(&self) -> bool {
        matches!(
            self,
            Self::RenewalFailed | Self::EndSubscription | Self::StateUnknown
        )
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Transition {
    type Err = SublifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| SublifeError::UnknownName {
                kind: "transition",
                name: s.to_string(),
            })
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// Event topics, one per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEvent {
    /// Published after `cancel_autorenew`.
    AutorenewCanceled,
    /// Published after `enable_autorenew`.
    AutorenewEnabled,
    /// Published after `renew`: a renewal should now be attempted.
    SubscriptionDue,
    /// Published after `renewed`.
    SubscriptionRenewed,
    /// Published after `renewal_failed`.
    RenewalFailed,
    /// Published after `end_subscription`.
    SubscriptionEnded,
    /// Published after `state_unknown`.
    SubscriptionError,
}

impl SubscriptionEvent {
    /// Every topic.
    pub const ALL: [SubscriptionEvent; 7] = [
        Self::AutorenewCanceled,
        Self::AutorenewEnabled,
        Self::SubscriptionDue,
        Self::SubscriptionRenewed,
        Self::RenewalFailed,
        Self::SubscriptionEnded,
        Self::SubscriptionError,
    ];

    /// Topic name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AutorenewCanceled => "autorenew_canceled",
            Self::AutorenewEnabled => "autorenew_enabled",
            Self::SubscriptionDue => "subscription_due",
            Self::SubscriptionRenewed => "subscription_renewed",
            Self::RenewalFailed => "renewal_failed",
            Self::SubscriptionEnded => "subscription_ended",
            Self::SubscriptionError => "subscription_error",
        }
    }
}

impl std::fmt::Display for SubscriptionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Requests ────────────────────────────────────────────────────────

/// Free-text context supplied with a transition call.
///
/// A non-empty `description` produces an audit entry and, for transitions
/// that take a reason, becomes the record's `reason`. `actor` is only kept
/// for transitions where [`Transition::accepts_actor`] holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionNote {
    /// Short reason stored on the record when no description is given.
    pub reason: String,
    /// Operational description; written to the audit log when non-empty.
    pub description: String,
    /// Who performed the transition.
    pub actor: Option<String>,
}

impl TransitionNote {
    /// A note with only a reason.
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// A note with only a description.
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Attach the acting user or system.
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The value a reason-taking transition stores in `reason`: the
    /// description when present, otherwise the reason.
    pub fn effective_reason(&self) -> &str {
        if self.description.is_empty() {
            &self.reason
        } else {
            &self.description
        }
    }
}

/// A fully-specified request to apply one transition.
///
/// Built through the per-transition constructors, so a `renewed` request
/// always carries its new period end and reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    transition: Transition,
    renewal: Option<(Timestamp, Reference)>,
    note: TransitionNote,
}

impl TransitionRequest {
    fn bare(transition: Transition, note: TransitionNote) -> Self {
        Self {
            transition,
            renewal: None,
            note,
        }
    }

    /// `cancel_autorenew`.
    pub fn cancel_autorenew() -> Self {
        Self::bare(Transition::CancelAutorenew, TransitionNote::default())
    }

    /// `enable_autorenew`.
    pub fn enable_autorenew() -> Self {
        Self::bare(Transition::EnableAutorenew, TransitionNote::default())
    }

    /// `renew`.
    pub fn renew() -> Self {
        Self::bare(Transition::Renew, TransitionNote::default())
    }

    /// `renewed(new_end, new_reference, description?)`.
    pub fn renewed(
        new_end: Timestamp,
        new_reference: Reference,
        description: impl Into<String>,
    ) -> Self {
        Self {
            transition: Transition::Renewed,
            renewal: Some((new_end, new_reference)),
            note: TransitionNote::described(description),
        }
    }

    /// `renewal_failed(reason?, description?)`.
    pub fn renewal_failed(note: TransitionNote) -> Self {
        Self::bare(Transition::RenewalFailed, note)
    }

    /// `end_subscription(reason?, by?, description?)`.
    pub fn end_subscription(note: TransitionNote) -> Self {
        Self::bare(Transition::EndSubscription, note)
    }

    /// `state_unknown(reason?, description?)`.
    pub fn state_unknown(note: TransitionNote) -> Self {
        Self::bare(Transition::StateUnknown, note)
    }

    /// The transition being requested.
    pub fn transition(&self) -> Transition {
        self.transition
    }

    /// New period end and reference, for `renewed`.
    pub fn renewal(&self) -> Option<&(Timestamp, Reference)> {
        self.renewal.as_ref()
    }

    /// The note supplied by the caller.
    pub fn note(&self) -> &TransitionNote {
        &self.note
    }

    /// Description to audit, if any.
    pub fn audit_description(&self) -> Option<&str> {
        let d = self.note.description.as_str();
        (!d.is_empty()).then_some(d)
    }

    /// Actor to audit, dropped for transitions that do not take one.
    pub fn audit_actor(&self) -> Option<&str> {
        if self.transition.accepts_actor() {
            self.note.actor.as_deref()
        } else {
            None
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised while planning a transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The record's current state is not in the transition's source set.
    #[error("cannot {transition} from {from}: allowed from {allowed}")]
    InvalidTransition {
        /// The rejected transition.
        transition: Transition,
        /// The record's state at the time of the call.
        from: SubscriptionState,
        /// Comma-separated source states, for the message.
        allowed: String,
    },
}

impl TransitionError {
    pub(crate) fn invalid(transition: Transition, from: SubscriptionState) -> Self {
        let allowed = transition
            .sources()
            .iter()
            .map(SubscriptionState::name)
            .collect::<Vec<_>>()
            .join(", ");
        Self::InvalidTransition {
            transition,
            from,
            allowed,
        }
    }
}
