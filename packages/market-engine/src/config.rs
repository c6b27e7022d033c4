//! Engine configuration.

use std::time::Duration;

use market_types::{Decimal, FeeSchedule, MAX_SCALE};
use serde::Deserialize;

use crate::lock::LockPolicy;
use crate::market::MarketSettings;
use crate::MarketError;

/// Ten years.
pub const MAX_OFFER_EXPIRY_DAYS: u32 = 3650;

/// Configuration for the marketplace engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// SQLite database file holding every table.
    #[serde(default = "defaults::database_path")]
    pub database_path: String,

    /// When set, per-instance locks live in Redis; otherwise in process memory.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "defaults::platform_fee_rate")]
    pub platform_fee_rate: Decimal,

    #[serde(default = "defaults::creator_royalty_rate")]
    pub creator_royalty_rate: Decimal,

    #[serde(default = "defaults::decimal_scale")]
    pub decimal_scale: u32,

    #[serde(default = "defaults::offer_expiry_days")]
    pub offer_expiry_days: u32,

    /// Points granted when an account is opened.
    #[serde(default = "defaults::initial_points")]
    pub initial_points: Decimal,

    #[serde(default = "defaults::lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    #[serde(default = "defaults::lock_retry_attempts")]
    pub lock_retry_attempts: u32,

    #[serde(default = "defaults::lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,

    #[serde(default = "defaults::offer_sweep_interval_secs")]
    pub offer_sweep_interval_secs: u64,

    #[serde(default = "defaults::reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: defaults::bind_address(),
            database_path: defaults::database_path(),
            redis_url: None,
            platform_fee_rate: defaults::platform_fee_rate(),
            creator_royalty_rate: defaults::creator_royalty_rate(),
            decimal_scale: defaults::decimal_scale(),
            offer_expiry_days: defaults::offer_expiry_days(),
            initial_points: defaults::initial_points(),
            lock_ttl_ms: defaults::lock_ttl_ms(),
            lock_retry_attempts: defaults::lock_retry_attempts(),
            lock_retry_delay_ms: defaults::lock_retry_delay_ms(),
            offer_sweep_interval_secs: defaults::offer_sweep_interval_secs(),
            reconcile_interval_secs: defaults::reconcile_interval_secs(),
        }
    }
}

impl Config {
    /// Layered load: optional `market.toml`, then `MARKET_*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("market").required(false))
            .add_source(config::Environment::with_prefix("MARKET"))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        self.fee_schedule().validate()?;
        if self.decimal_scale > MAX_SCALE {
            return Err(MarketError::Config(format!(
                "decimal_scale {} exceeds {MAX_SCALE}",
                self.decimal_scale
            )));
        }
        if self.offer_expiry_days == 0 || self.offer_expiry_days > MAX_OFFER_EXPIRY_DAYS {
            return Err(MarketError::Config(format!(
                "offer_expiry_days must be between 1 and {MAX_OFFER_EXPIRY_DAYS}"
            )));
        }
        if self.lock_retry_attempts == 0 {
            return Err(MarketError::Config(
                "lock_retry_attempts must be at least 1".into(),
            ));
        }
        if self.lock_ttl_ms == 0 {
            return Err(MarketError::Config("lock_ttl_ms must be positive".into()));
        }
        if self.initial_points < Decimal::ZERO {
            return Err(MarketError::Config(
                "initial_points cannot be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            platform_fee_rate: self.platform_fee_rate,
            creator_royalty_rate: self.creator_royalty_rate,
            scale: self.decimal_scale,
        }
    }

    pub fn market_settings(&self) -> MarketSettings {
        MarketSettings {
            offer_expiry: chrono::Duration::days(i64::from(self.offer_expiry_days)),
            initial_points: self.initial_points,
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            ttl: Duration::from_millis(self.lock_ttl_ms),
            attempts: self.lock_retry_attempts,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }
}

mod defaults {
    use market_types::{Decimal, DEFAULT_SCALE};

    pub fn bind_address() -> String {
        "0.0.0.0:3050".into()
    }

    pub fn database_path() -> String {
        "market.db".into()
    }

    pub fn platform_fee_rate() -> Decimal {
        Decimal::new(25, 3)
    }

    pub fn creator_royalty_rate() -> Decimal {
        Decimal::new(25, 3)
    }

    pub fn decimal_scale() -> u32 {
        DEFAULT_SCALE
    }

    pub fn offer_expiry_days() -> u32 {
        7
    }

    pub fn initial_points() -> Decimal {
        Decimal::new(100, 0)
    }

    pub fn lock_ttl_ms() -> u64 {
        30_000
    }

    pub fn lock_retry_attempts() -> u32 {
        3
    }

    pub fn lock_retry_delay_ms() -> u64 {
        100
    }

    pub fn offer_sweep_interval_secs() -> u64 {
        60
    }

    pub fn reconcile_interval_secs() -> u64 {
        30
    }
}
