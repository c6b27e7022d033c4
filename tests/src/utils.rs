use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use market_engine::clock::ManualClock;
use market_engine::lock::{LockCoordinator, LockPolicy};
use market_engine::models::{Instance, NewAsset, Reason};
use market_engine::{Market, MarketSettings, Store};
use market_types::{Decimal, FeeSchedule, UserId};

pub const CREATOR: UserId = 100;

pub struct World {
    pub market: Arc<Market>,
    pub clock: Arc<ManualClock>,
}

/// Market on an in-memory database and in-process locks with a hand-driven
/// clock and no registration grant.
pub fn setup_market() -> Result<World> {
    build_world(Store::open_in_memory()?)
}

/// Same as [`setup_market`] but over the database file at `path`. Opening the
/// same path again models a restart.
pub fn open_market_at(path: &Path) -> Result<World> {
    build_world(Store::open(path)?)
}

pub fn temp_db_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("market-it-{}-{name}.db", std::process::id()))
}

fn build_world(store: Store) -> Result<World> {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
    let locks = LockCoordinator::in_memory(LockPolicy {
        ttl: Duration::from_secs(30),
        attempts: 20,
        retry_delay: Duration::from_millis(2),
    });
    let settings = MarketSettings {
        offer_expiry: chrono::Duration::days(7),
        initial_points: Decimal::ZERO,
    };
    let market =
        Market::new(store, FeeSchedule::default(), settings, locks)?.with_clock(clock.clone());
    Ok(World {
        market: Arc::new(market),
        clock,
    })
}

/// Opens an account and funds it with `points`.
pub fn fund(market: &Market, user_id: UserId, points: Decimal) -> Result<()> {
    market.open_account(user_id)?;
    if !points.is_zero() {
        market.credit_points(user_id, points, Reason::new("Integration test funding"))?;
    }
    Ok(())
}

/// Submits and approves an asset by [`CREATOR`], whose account must exist.
pub fn approved_asset(market: &Market, supply: u32) -> Result<Vec<Instance>> {
    let asset = market.submit_asset(
        CREATOR,
        NewAsset {
            name: "Harbor at Dusk".into(),
            description: "Limited print".into(),
            media_url: "https://media.test/harbor.png".into(),
            total_supply: supply,
        },
    )?;
    market.review_asset(asset.id, true)?;
    Ok(market
        .instances_owned_by(CREATOR, market_engine::models::Page::new(1, 100))
        .items
        .into_iter()
        .filter(|i| i.asset_id == asset.id)
        .collect())
}

/// Moves one of the creator's instances to `owner` through a zero-friction sale.
pub async fn hand_over(market: &Market, instance: &Instance, owner: UserId) -> Result<()> {
    let listing = market.create_listing(CREATOR, instance.id, Decimal::new(1, 2))?;
    market.execute_trade(listing.id, owner).await?;
    Ok(())
}
