use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use market_engine::models::{Page, TradeSide};
use market_engine::MarketError;
use market_types::{Decimal, InstanceStatus, ListingStatus, TradeStatus, UserId};
use rust_decimal_macros::dec;

use crate::utils::{approved_asset, fund, setup_market, CREATOR};

const BUYERS: [UserId; 6] = [201, 202, 203, 204, 205, 206];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_buyers_never_double_sell() -> Result<()> {
    let world = setup_market()?;
    let market = &world.market;
    fund(market, CREATOR, dec!(0))?;
    for buyer in BUYERS {
        fund(market, buyer, dec!(500))?;
    }
    let instances = approved_asset(market, 8)?;
    let mut listings = Vec::new();
    for (i, instance) in instances.iter().enumerate() {
        let price = Decimal::from(10 + i as u32);
        listings.push(market.create_listing(CREATOR, instance.id, price)?);
    }
    let everyone: Vec<UserId> = std::iter::once(CREATOR).chain(BUYERS).collect();
    let total_before: Decimal = everyone
        .iter()
        .map(|u| market.account(*u).map(|a| a.balance))
        .sum::<Result<Decimal, _>>()?;

    let mut handles = Vec::new();
    for listing in &listings {
        for buyer in BUYERS {
            let market = Arc::clone(market);
            let listing_id = listing.id;
            handles.push(tokio::spawn(async move {
                (listing_id, market.execute_trade(listing_id, buyer).await)
            }));
        }
    }

    let mut wins: HashMap<u64, u64> = HashMap::new();
    for handle in handles {
        let (listing_id, outcome) = handle.await?;
        match outcome {
            Ok(trade) => {
                assert_eq!(trade.status, TradeStatus::Completed);
                *wins.entry(listing_id).or_default() += 1;
            }
            Err(MarketError::Conflict(_)) | Err(MarketError::ResourceBusy(_)) => {}
            Err(other) => anyhow::bail!("unexpected purchase error: {other}"),
        }
    }

    assert!(wins.values().all(|n| *n == 1), "a listing sold twice: {wins:?}");
    for listing in &listings {
        let stored = market.listing(listing.id)?;
        let instance = market.instance(listing.instance_id)?;
        if wins.contains_key(&listing.id) {
            assert_eq!(stored.status, ListingStatus::Sold);
            assert_eq!(instance.status, InstanceStatus::InWallet);
            assert_ne!(instance.owner_id, CREATOR);
        } else {
            assert_eq!(stored.status, ListingStatus::Active);
            assert_eq!(instance.status, InstanceStatus::OnSale);
        }
    }

    let mut total_after = market.platform_account().total_balance;
    for user in &everyone {
        let account = market.account(*user)?;
        assert_eq!(account.frozen, Decimal::ZERO);
        total_after += account.balance;
    }
    assert_eq!(total_after, total_before);

    let bought: u64 = BUYERS
        .iter()
        .map(|b| market.trade_history(*b, TradeSide::Buy, Page::default()).total as u64)
        .sum();
    assert_eq!(bought, wins.len() as u64);
    assert_eq!(market.pending_trade_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_resale_pays_the_original_creator() -> Result<()> {
    let world = setup_market()?;
    let market = &world.market;
    fund(market, CREATOR, dec!(0))?;
    fund(market, 201, dec!(100))?;
    fund(market, 202, dec!(300))?;
    let instance = approved_asset(market, 1)?.remove(0);

    let first = market.create_listing(CREATOR, instance.id, dec!(80))?;
    market.execute_trade(first.id, 201).await?;
    let resale = market.create_listing(201, instance.id, dec!(200))?;
    let trade = market.execute_trade(resale.id, 202).await?;

    assert_eq!(trade.creator_id, CREATOR);
    assert_eq!(trade.creator_royalty, dec!(5));
    // 76 + 2 royalty from the first sale, 5 royalty from the resale.
    assert_eq!(market.account(CREATOR)?.balance, dec!(83));
    assert_eq!(market.account(201)?.balance, dec!(210));
    assert_eq!(market.account(202)?.balance, dec!(100));
    assert_eq!(market.platform_account().fee_income, dec!(7));
    assert_eq!(market.instance(instance.id)?.owner_id, 202);
    Ok(())
}

#[tokio::test]
async fn test_settlement_writes_an_audit_trail() -> Result<()> {
    let world = setup_market()?;
    let market = &world.market;
    fund(market, CREATOR, dec!(0))?;
    fund(market, 201, dec!(50))?;
    let instance = approved_asset(market, 1)?.remove(0);
    let listing = market.create_listing(CREATOR, instance.id, dec!(40))?;
    let trade = market.execute_trade(listing.id, 201).await?;

    let log = market.point_transactions(201, Page::default());
    // funding, freeze, unfreeze, spend; newest first
    assert_eq!(log.total, 4);
    assert!(log.items[..3]
        .iter()
        .all(|tx| tx.related_id == Some(trade.id)));
    assert_eq!(log.items[0].balance_after, dec!(10));
    assert_eq!(log.items[0].frozen_after, dec!(0));
    Ok(())
}
