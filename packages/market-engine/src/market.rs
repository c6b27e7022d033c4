//! The settlement core handle.
//!
//! Operations are split across modules as `impl Market` blocks: accounts in
//! `ledger`, assets and instances in `registry`, and the trading flows in
//! `listing`, `settlement` and `offer`.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use market_types::{Decimal, FeeSchedule, InstanceId};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::events::{EventLog, EventSink, NewEvent, Notification, Notifier, TracingNotifier};
use crate::lock::{instance_lock_key, LockCoordinator, LockPolicy};
use crate::store::Store;
use crate::MarketError;

/// Values read at call time that are not part of the fee schedule.
#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub offer_expiry: chrono::Duration,
    pub initial_points: Decimal,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            offer_expiry: chrono::Duration::days(7),
            initial_points: Decimal::new(100, 0),
        }
    }
}

pub struct Market {
    pub(crate) store: Store,
    pub(crate) locks: LockCoordinator,
    fees: RwLock<FeeSchedule>,
    pub(crate) settings: MarketSettings,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl Market {
    pub fn new(
        store: Store,
        fees: FeeSchedule,
        settings: MarketSettings,
        locks: LockCoordinator,
    ) -> Result<Self, MarketError> {
        fees.validate()?;
        store.set_scale(fees.scale);
        Ok(Self {
            store,
            locks,
            fees: RwLock::new(fees),
            settings,
            notifier: Arc::new(TracingNotifier),
            events: Arc::new(EventLog::new()),
            clock: Arc::new(SystemClock),
        })
    }

    /// Private in-memory database and in-process locks with default fees
    /// and settings.
    pub fn in_memory() -> Result<Self, MarketError> {
        Self::new(
            Store::open_in_memory()?,
            FeeSchedule::default(),
            MarketSettings::default(),
            LockCoordinator::in_memory(LockPolicy::default()),
        )
    }

    pub async fn from_config(config: &Config) -> Result<Self, MarketError> {
        config.validate()?;
        let store = Store::open(&config.database_path)?;
        let locks = LockCoordinator::from_config(config).await?;
        Self::new(store, config.fee_schedule(), config.market_settings(), locks)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        *self.fees.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the fee schedule for subsequent trades. Trades already
    /// reserved keep the split they were priced with. The decimal scale is
    /// fixed for the life of the ledger.
    pub fn update_fee_schedule(&self, fees: FeeSchedule) -> Result<(), MarketError> {
        fees.validate()?;
        let current = self.fee_schedule().scale;
        if fees.scale != current {
            return Err(MarketError::Config(format!(
                "decimal scale is fixed at {current} and cannot change to {}",
                fees.scale
            )));
        }
        *self.fees.write().unwrap_or_else(PoisonError::into_inner) = fees;
        info!(
            platform_fee_rate = %fees.platform_fee_rate,
            creator_royalty_rate = %fees.creator_royalty_rate,
            scale = fees.scale,
            "Fee schedule updated"
        );
        Ok(())
    }

    pub fn lock_backend(&self) -> &'static str {
        self.locks.backend_name()
    }

    /// Runs `f` while holding the instance's mutual-exclusion token.
    /// The token is released on every exit path of `f`.
    pub(crate) async fn with_instance_lock<T>(
        &self,
        instance_id: InstanceId,
        f: impl FnOnce() -> Result<T, MarketError>,
    ) -> Result<T, MarketError> {
        let token = self.locks.acquire(&instance_lock_key(instance_id)).await?;
        let result = f();
        self.locks.release(token).await;
        result
    }

    pub(crate) fn emit(&self, event: NewEvent) {
        let kind = event.kind;
        if let Err(e) = self.events.record(event) {
            warn!(error = %e, kind = ?kind, "Failed to record community event");
        }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification) {
            warn!(
                error = %e,
                user_id = notification.user_id,
                "Failed to deliver notification"
            );
        }
    }
}
