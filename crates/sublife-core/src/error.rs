//! # Error Types
//!
//! Validation failures for the primitives defined in this crate. Higher
//! crates wrap [`SublifeError`] in their own `thiserror` enums.

use thiserror::Error;

/// Top-level error type for primitive validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SublifeError {
    /// A timestamp string could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A subscription reference exceeded the maximum length.
    #[error("reference is {len} characters long; at most {max} are allowed")]
    ReferenceTooLong {
        /// Length of the rejected reference, in characters.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// A persisted state code does not map to any lifecycle state.
    #[error("unknown subscription state code: {0}")]
    UnknownStateCode(i16),

    /// A state or transition name could not be parsed.
    #[error("unknown {kind} name: {name:?}")]
    UnknownName {
        /// What was being parsed ("state", "transition", "event").
        kind: &'static str,
        /// The rejected input.
        name: String,
    },

    /// An identifier string was not a valid UUID.
    #[error("invalid identifier {0:?}")]
    InvalidId(String),
}
