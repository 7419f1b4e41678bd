//! # Identity Newtypes
//!
//! Newtype wrappers for the identifiers of the lifecycle engine. You cannot
//! pass an `AuditEntryId` where a `SubscriptionId` is expected, and a
//! [`Reference`] is length-checked at construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SublifeError;

/// Maximum length of a subscription reference, in characters.
pub const REFERENCE_MAX_CHARS: usize = 100;

/// Unique identifier for a subscription record.
///
/// Assigned at creation and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

/// Unique identifier for an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub Uuid);

impl SubscriptionId {
    /// Generate a new random subscription identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse an identifier from its textual UUID form.
    pub fn parse(s: &str) -> Result<Self, SublifeError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| SublifeError::InvalidId(s.to_string()))
    }
}

impl AuditEntryId {
    /// Generate a new random audit entry identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubscriptionId {
    type Err = SublifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Free-form external reference attached to a subscription.
///
/// At most [`REFERENCE_MAX_CHARS`] characters. Deserialization goes through
/// the same check as [`Reference::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(String);

impl Reference {
    /// Validate and wrap a reference string.
    ///
    /// # Errors
    ///
    /// Returns [`SublifeError::ReferenceTooLong`] when the input has more than
    /// [`REFERENCE_MAX_CHARS`] characters.
    pub fn new(value: impl Into<String>) -> Result<Self, SublifeError> {
        let value = value.into();
        let len = value.chars().count();
        if len > REFERENCE_MAX_CHARS {
            return Err(SublifeError::ReferenceTooLong {
                len,
                max: REFERENCE_MAX_CHARS,
            });
        }
        Ok(Self(value))
    }

    /// Borrow the reference text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference begins with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for Reference {
    type Error = SublifeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for Reference {
    type Err = SublifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<Reference> for String {
    fn from(value: Reference) -> Self {
        value.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn test_subscription_id_parse_roundtrip() {
        let id = SubscriptionId::new();
        let parsed: SubscriptionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_subscription_id_parse_rejects_garbage() {
        assert!(matches!(
            SubscriptionId::parse("not-a-uuid"),
            Err(SublifeError::InvalidId(_))
        ));
    }

    #[test]
    fn test_reference_at_limit_accepted() {
        let r = Reference::new("x".repeat(REFERENCE_MAX_CHARS)).unwrap();
        assert_eq!(r.as_str().len(), REFERENCE_MAX_CHARS);
    }

    #[test]
    fn test_reference_over_limit_rejected() {
        let err = Reference::new("x".repeat(REFERENCE_MAX_CHARS + 1)).unwrap_err();
        assert_eq!(
            err,
            SublifeError::ReferenceTooLong {
                len: REFERENCE_MAX_CHARS + 1,
                max: REFERENCE_MAX_CHARS
            }
        );
    }

    #[test]
    fn test_reference_counts_characters_not_bytes() {
        // 100 two-byte characters is 200 bytes but still within the limit.
        assert!(Reference::new("é".repeat(REFERENCE_MAX_CHARS)).is_ok());
    }

    #[test]
    fn test_reference_deserialize_validates() {
        let long = format!("\"{}\"", "y".repeat(REFERENCE_MAX_CHARS + 1));
        assert!(serde_json::from_str::<Reference>(&long).is_err());
        let ok: Reference = serde_json::from_str("\"REF-123\"").unwrap();
        assert_eq!(ok.as_str(), "REF-123");
    }

    #[test]
    fn test_reference_prefix() {
        let r = Reference::new("REF-abc").unwrap();
        assert!(r.starts_with("REF-"));
        assert!(!r.starts_with("abc"));
    }
}
