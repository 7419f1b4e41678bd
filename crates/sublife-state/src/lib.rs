//! # sublife-state — Subscription Lifecycle State Machine
//!
//! Runtime-checked state machine for subscription records.
//!
//! - **States** (`state.rs`): the six lifecycle states and their storage
//!   codes.
//! - **Transitions** (`transition.rs`): the transition table as data,
//!   event topics, and typed transition requests.
//! - **Subscription** (`subscription.rs`): the record and the single
//!   generic guard-and-plan routine.
//!
//! ## Design
//!
//! Unlike a typestate machine, a subscription's state is read back from
//! storage at runtime, so the guard is a runtime check against the table.
//! It is the only check: [`Subscription::plan`] consults
//! [`Transition::sources`] for every transition, and the engine hands the
//! same source set to the store's conditional write. This crate performs no
//! I/O; persistence, auditing and notification live in `sublife-engine`.

pub mod state;
pub mod subscription;
pub mod transition;

pub use state::SubscriptionState;
pub use subscription::{Subscription, SubscriptionChanges, SubscriptionParts};
pub use transition::{
    SubscriptionEvent, Transition, TransitionError, TransitionNote, TransitionRequest,
};
