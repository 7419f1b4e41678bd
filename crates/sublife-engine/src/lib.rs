//! # sublife-engine — Subscription Lifecycle Engine
//!
//! Ties the state machine to storage, auditing and notification.
//!
//! - **Lifecycle** (`lifecycle.rs`): validate → persist → audit → notify,
//!   one call per transition.
//! - **Triggers** (`triggers.rs`): scheduled batch transitions over lazy
//!   store cursors.
//! - **Events** (`events.rs`): the topic-based bus with per-listener
//!   failure isolation.
//! - **Audit** (`audit.rs`): described transitions, append-only.
//! - **Config** (`config.rs`): trigger timeouts and policy from the
//!   environment.
//!
//! ## Concurrency
//!
//! No lock is held across records. Two workers may race on the same
//! record; the store's conditional write lets exactly one win, and the
//! other sees [`LifecycleError::ConcurrentModification`] (counted as a skip
//! inside a trigger).

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod triggers;

pub use audit::AuditLog;
pub use config::{EngineConfig, DEFAULT_STUCK_TIMEOUT_HOURS, DEFAULT_SUSPENDED_TIMEOUT_HOURS};
pub use error::{ConfigError, LifecycleError};
pub use events::{DeliveryReport, EventBus, Listener, ListenerError, ListenerFailure, ListenerId};
pub use lifecycle::SubscriptionLifecycle;
pub use triggers::{TriggerEngine, TriggerKind, TriggerReport};
