use anyhow::Result;
use market_engine::models::{Page, TradeSide};
use market_types::{InstanceStatus, OfferStatus, TradeStatus};
use rust_decimal_macros::dec;

use crate::utils::{approved_asset, fund, open_market_at, temp_db_path, CREATOR};

#[tokio::test]
async fn test_settled_state_survives_restart() -> Result<()> {
    let path = temp_db_path("settled");
    let _ = std::fs::remove_file(&path);

    let (instance_id, trade_id) = {
        let world = open_market_at(&path)?;
        let market = &world.market;
        fund(market, CREATOR, dec!(0))?;
        fund(market, 401, dec!(120))?;
        let instance = approved_asset(market, 2)?.remove(0);
        let listing = market.create_listing(CREATOR, instance.id, dec!(40))?;
        let trade = market.execute_trade(listing.id, 401).await?;
        assert_eq!(trade.status, TradeStatus::Completed);
        (instance.id, trade.id)
    };

    let world = open_market_at(&path)?;
    let market = &world.market;
    assert_eq!(market.account(401)?.balance, dec!(80));
    assert_eq!(market.account(CREATOR)?.balance, dec!(39));
    assert_eq!(market.platform_account().total_balance, dec!(1));
    let instance = market.instance(instance_id)?;
    assert_eq!((instance.owner_id, instance.status), (401, InstanceStatus::InWallet));
    assert_eq!(market.trade(trade_id, 401)?.status, TradeStatus::Completed);
    assert_eq!(
        market.trade_history(401, TradeSide::Buy, Page::default()).total,
        1
    );
    assert_eq!(market.point_transactions(401, Page::default()).total, 4);

    // Id sequences continue after the restart.
    let next = market.create_listing(401, instance_id, dec!(50))?;
    assert!(next.id > 1);
    assert_eq!(market.pending_trade_count(), 0);

    drop(world);
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_pending_offer_hold_survives_restart() -> Result<()> {
    let path = temp_db_path("offer-hold");
    let _ = std::fs::remove_file(&path);

    let offer_id = {
        let world = open_market_at(&path)?;
        let market = &world.market;
        fund(market, CREATOR, dec!(0))?;
        fund(market, 402, dec!(100))?;
        let instance = approved_asset(market, 1)?.remove(0);
        market.create_offer(402, instance.id, dec!(60))?.id
    };

    let world = open_market_at(&path)?;
    let market = &world.market;
    assert_eq!(market.account(402)?.frozen, dec!(60));
    assert_eq!(market.offer(offer_id)?.status, OfferStatus::Pending);

    let trade = market.accept_offer(offer_id, CREATOR).await?;
    assert_eq!(trade.status, TradeStatus::Completed);
    assert_eq!(market.account(402)?.balance, dec!(40));
    assert_eq!(market.account(402)?.frozen, dec!(0));

    drop(world);
    let _ = std::fs::remove_file(&path);
    Ok(())
}
