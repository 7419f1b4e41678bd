//! # Runtime Context
//!
//! Wires the Postgres stores, the event bus and the system clock into a
//! lifecycle service. Built once per invocation; listeners are registered
//! here, before any command runs.

use std::sync::Arc;

use sublife_core::SystemClock;
use sublife_engine::{ConfigError, EngineConfig, EventBus, SubscriptionLifecycle, TriggerEngine};
use sublife_state::SubscriptionEvent;
use sublife_store::postgres::{self, PgAuditStore, PgPool, PgSubscriptionStore};

/// Everything a command needs.
#[derive(Debug)]
pub struct Context {
    /// Engine configuration loaded from the environment.
    pub config: EngineConfig,
    /// Shared connection pool.
    pub pool: PgPool,
    /// The lifecycle service.
    pub lifecycle: SubscriptionLifecycle,
}

impl Context {
    /// Connect to `DATABASE_URL` and assemble the service.
    pub async fn connect(config: EngineConfig) -> anyhow::Result<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let pool = postgres::connect(&url).await?;

        let events = Arc::new(EventBus::new());
        register_logging_listeners(&events);

        let store = PgSubscriptionStore::new(pool.clone()).with_page_size(config.page_size);
        let lifecycle = SubscriptionLifecycle::new(
            Arc::new(store),
            Arc::new(PgAuditStore::new(pool.clone())),
            events,
            Arc::new(SystemClock),
        );
        Ok(Self {
            config,
            pool,
            lifecycle,
        })
    }

    /// A trigger engine over this context's service.
    pub fn triggers(&self) -> TriggerEngine {
        TriggerEngine::new(self.lifecycle.clone())
    }
}

/// Log every published event. Stands in for the renewal, mailing and
/// billing hooks a deployment attaches.
pub fn register_logging_listeners(bus: &EventBus) {
    for event in SubscriptionEvent::ALL {
        bus.subscribe(event, move |sub| {
            tracing::info!(
                event = event.name(),
                subscription = %sub.id(),
                state = %sub.state(),
                reference = %sub.reference(),
                "subscription event"
            );
            Ok(())
        });
    }
}
