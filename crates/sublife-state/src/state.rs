//! # Subscription States
//!
//! ```text
//! ACTIVE                             ──cancel_autorenew──▶ EXPIRING
//! EXPIRING                           ──enable_autorenew──▶ ACTIVE
//! ACTIVE, SUSPENDED                  ──renew────────────▶ RENEWING
//! ACTIVE, RENEWING, ERROR            ──renewed──────────▶ ACTIVE
//! RENEWING, ERROR                    ──renewal_failed───▶ SUSPENDED
//! ACTIVE, SUSPENDED, EXPIRING, ERROR ──end_subscription─▶ ENDED
//! RENEWING                           ──state_unknown────▶ ERROR
//! ```
//!
//! ENDED and ERROR are never left by an automatic trigger. ERROR is
//! recoverable by an operator through `renewed`, `renewal_failed` or
//! `end_subscription`.

use serde::{Deserialize, Serialize};
use sublife_core::SublifeError;

/// The lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// Running, will be renewed when the period ends.
    Active,
    /// Running, will end when the period ends.
    Expiring,
    /// A renewal attempt has started and has no outcome yet.
    Renewing,
    /// The last renewal attempt failed; eligible for a retry.
    Suspended,
    /// Finished (terminal).
    Ended,
    /// A renewal was interrupted and its outcome is unknown. Needs an
    /// operator.
    Error,
}

impl SubscriptionState {
    /// All six states, in storage-code order.
    pub const ALL: [SubscriptionState; 6] = [
        Self::Error,
        Self::Active,
        Self::Expiring,
        Self::Renewing,
        Self::Suspended,
        Self::Ended,
    ];

    /// Stable integer code used by persistent stores.
    pub fn code(&self) -> i16 {
        match self {
            Self::Active => 1,
            Self::Expiring => 2,
            Self::Renewing => 3,
            Self::Suspended => 4,
            Self::Ended => 5,
            Self::Error => -1,
        }
    }

    /// Inverse of [`SubscriptionState::code`].
    pub fn from_code(code: i16) -> Result<Self, SublifeError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(SublifeError::UnknownStateCode(code))
    }

    /// Upper-case display name (e.g. `"RENEWING"`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expiring => "EXPIRING",
            Self::Renewing => "RENEWING",
            Self::Suspended => "SUSPENDED",
            Self::Ended => "ENDED",
            Self::Error => "ERROR",
        }
    }

    /// Whether automatic triggers leave this state alone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SubscriptionState {
    type Err = SublifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SublifeError::UnknownName {
                kind: "state",
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for state in SubscriptionState::ALL {
            assert_eq!(SubscriptionState::from_code(state.code()).unwrap(), state);
        }
    }

    #[test]
    fn test_error_code_is_negative() {
        assert_eq!(SubscriptionState::Error.code(), -1);
        assert_eq!(SubscriptionState::Active.code(), 1);
        assert_eq!(SubscriptionState::Ended.code(), 5);
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(
            SubscriptionState::from_code(0),
            Err(SublifeError::UnknownStateCode(0))
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "suspended".parse::<SubscriptionState>().unwrap(),
            SubscriptionState::Suspended
        );
        assert_eq!(
            "ERROR".parse::<SubscriptionState>().unwrap(),
            SubscriptionState::Error
        );
        assert!("paused".parse::<SubscriptionState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = SubscriptionState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![SubscriptionState::Error, SubscriptionState::Ended]);
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&SubscriptionState::Renewing).unwrap();
        assert_eq!(json, "\"RENEWING\"");
        let parsed: SubscriptionState = serde_json::from_str("\"EXPIRING\"").unwrap();
        assert_eq!(parsed, SubscriptionState::Expiring);
    }
}
