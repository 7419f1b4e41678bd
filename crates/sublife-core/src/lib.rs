//! # sublife-core — Foundational Types for the Subscription Lifecycle Engine
//!
//! Every other crate in the workspace depends on `sublife-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `SubscriptionId`,
//!    `AuditEntryId` and `Reference` are newtypes. A `Reference` can only be
//!    built through its validating constructor, so an over-long reference
//!    never reaches the store.
//!
//! 2. **UTC-only timestamps.** `Timestamp` is UTC with microsecond
//!    precision, which is exactly what a Postgres `timestamptz` column holds.
//!    A value read back from the database compares equal to the value that
//!    was written.
//!
//! 3. **Injected time.** Everything that needs "now" asks a [`Clock`].
//!    Production code uses [`SystemClock`]; tests drive a [`ManualClock`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `sublife-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod clock;
pub mod error;
pub mod identity;
pub mod temporal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SublifeError;
pub use identity::{AuditEntryId, Reference, SubscriptionId, REFERENCE_MAX_CHARS};
pub use temporal::Timestamp;
