use std::sync::Arc;

use crate::events::{MockNotifier, NotificationKind};
use crate::models::Page;
use crate::tests::test_utils::*;
use crate::MarketError;
use market_types::{InstanceStatus, OfferStatus, TradeStatus};
use rust_decimal_macros::dec;

// --- Create ---

#[test]
fn create_offer_freezes_the_bid() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();

    assert_eq!(offer.status, OfferStatus::Pending);
    assert_eq!(offer.expires_at, start_time() + chrono::Duration::days(7));
    assert_eq!(offer.price.scale(), 8);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(40)));
    assert_eq!(h.market.account(BUYER).unwrap().available(), dec!(110));
}

#[test]
fn offer_on_own_instance_is_self_trade() {
    let h = harness().with_parties();
    let id = h.mint_one(BUYER);
    let err = h.market.create_offer(BUYER, id, dec!(1)).unwrap_err();
    assert!(matches!(err, MarketError::SelfTrade(_)));
}

#[test]
fn offer_on_listed_instance_is_refused() {
    let h = harness().with_parties();
    let listing = h.listed(SELLER, dec!(10));
    let err = h
        .market
        .create_offer(BUYER, listing.instance_id, dec!(8))
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
}

#[test]
fn offer_beyond_available_balance_fails() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let err = h.market.create_offer(BUYER, id, dec!(150.00000001)).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientFunds(_)));
    assert!(h.market.offers_made(BUYER, None, Page::default()).items.is_empty());
}

#[test]
fn offer_price_must_be_positive() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let err = h.market.create_offer(BUYER, id, dec!(0)).unwrap_err();
    assert!(matches!(err, MarketError::InvalidPrice(_)));
}

#[test]
fn unrepresentable_expiry_is_a_config_error() {
    let h = harness_with_settings(crate::MarketSettings {
        offer_expiry: chrono::Duration::days(200_000_000),
        initial_points: rust_decimal::Decimal::ZERO,
    })
    .with_parties();
    let id = h.mint_one(SELLER);

    let err = h.market.create_offer(BUYER, id, dec!(5)).unwrap_err();
    assert!(matches!(err, MarketError::Config(_)));
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
    assert!(h.market.offers_made(BUYER, None, Page::default()).items.is_empty());
}

#[test]
fn owner_is_notified_of_new_offer() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|n| n.user_id == SELLER && n.kind == NotificationKind::Offer)
        .times(1)
        .returning(|_| Ok(()));
    let h = harness_with_sinks(Arc::new(notifier), Arc::new(crate::events::EventLog::new()))
        .with_parties();
    let id = h.mint_one(SELLER);
    h.market.create_offer(BUYER, id, dec!(5)).unwrap();
}

// --- Accept ---

#[tokio::test]
async fn accepting_settles_with_royalty() {
    let h = harness().with_parties();
    let before = h.total_points(&[CREATOR, SELLER, BUYER]);
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();

    let trade = h.market.accept_offer(offer.id, SELLER).await.unwrap();

    assert_eq!(trade.status, TradeStatus::Completed);
    assert_eq!(trade.offer_id, Some(offer.id));
    assert_eq!(trade.listing_id, None);
    assert_eq!(trade.creator_royalty, dec!(1));
    assert_eq!(h.balance(BUYER), (dec!(110), dec!(0)));
    assert_eq!(trade.seller_received, dec!(38));
    assert_eq!(h.balance(SELLER), (dec!(48), dec!(0)));
    assert_eq!(h.balance(CREATOR), (dec!(1), dec!(0)));
    assert_eq!(h.platform_balance(), dec!(1));
    assert_eq!(h.total_points(&[CREATOR, SELLER, BUYER]), before);

    let instance = h.market.instance(id).unwrap();
    assert_eq!((instance.owner_id, instance.status), (BUYER, InstanceStatus::InWallet));
    let offer = h.market.offer(offer.id).unwrap();
    assert_eq!(offer.status, OfferStatus::Accepted);
    assert_eq!(offer.responded_at, Some(start_time()));
}

#[tokio::test]
async fn only_the_owner_can_accept() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();

    let err = h.market.accept_offer(offer.id, OTHER).await.unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));
    assert_eq!(h.market.offer(offer.id).unwrap().status, OfferStatus::Pending);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(40)));
}

#[tokio::test]
async fn accepting_while_listed_is_refused() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.market.create_listing(SELLER, id, dec!(60)).unwrap();

    let err = h.market.accept_offer(offer.id, SELLER).await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
    assert_eq!(h.market.instance(id).unwrap().status, InstanceStatus::OnSale);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(40)));
}

#[tokio::test]
async fn accepted_offer_cannot_be_cancelled() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.market.accept_offer(offer.id, SELLER).await.unwrap();

    let err = h.market.cancel_offer(offer.id, BUYER).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
    assert_eq!(h.balance(BUYER), (dec!(110), dec!(0)));
}

// --- Reject / cancel ---

#[test]
fn reject_releases_the_hold() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();

    assert!(matches!(
        h.market.reject_offer(offer.id, BUYER).unwrap_err(),
        MarketError::Forbidden(_)
    ));
    let rejected = h.market.reject_offer(offer.id, SELLER).unwrap();
    assert_eq!(rejected.status, OfferStatus::Rejected);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));

    let err = h.market.reject_offer(offer.id, SELLER).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
}

#[test]
fn cancel_is_for_the_bidder_only() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();

    assert!(matches!(
        h.market.cancel_offer(offer.id, SELLER).unwrap_err(),
        MarketError::Forbidden(_)
    ));
    let cancelled = h.market.cancel_offer(offer.id, BUYER).unwrap();
    assert_eq!(cancelled.status, OfferStatus::Cancelled);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
}

// --- Expiry ---

#[tokio::test]
async fn accepting_an_expired_offer_expires_it() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.clock.advance(chrono::Duration::days(7) + chrono::Duration::seconds(1));

    let err = h.market.accept_offer(offer.id, SELLER).await.unwrap_err();
    assert!(matches!(err, MarketError::Expired(_)));
    assert_eq!(h.market.offer(offer.id).unwrap().status, OfferStatus::Expired);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
    assert_eq!(h.market.instance(id).unwrap().owner_id, SELLER);

    // Already terminal: the sweep has nothing to release.
    assert_eq!(h.market.expire_offers(), 0);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
}

#[test]
fn rejecting_an_expired_offer_reports_expiry() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.clock.advance(chrono::Duration::days(8));

    let err = h.market.reject_offer(offer.id, SELLER).unwrap_err();
    assert!(matches!(err, MarketError::Expired(_)));
    let err = h.market.cancel_offer(offer.id, BUYER).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(0)));
}

#[tokio::test]
async fn strangers_cannot_expire_an_offer() {
    let h = harness().with_parties();
    h.open(OTHER, dec!(0));
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.clock.advance(chrono::Duration::days(8));

    let err = h.market.accept_offer(offer.id, OTHER).await.unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));
    let err = h.market.reject_offer(offer.id, OTHER).unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));
    let err = h.market.cancel_offer(offer.id, SELLER).unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));

    assert_eq!(h.market.offer(offer.id).unwrap().status, OfferStatus::Pending);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(40)));
    assert_eq!(h.market.expire_offers(), 1);
}

#[test]
fn offer_is_still_live_at_its_deadline() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    let offer = h.market.create_offer(BUYER, id, dec!(40)).unwrap();
    h.clock.advance(chrono::Duration::days(7));

    assert_eq!(h.market.expire_offers(), 0);
    assert_eq!(
        h.market.cancel_offer(offer.id, BUYER).unwrap().status,
        OfferStatus::Cancelled
    );
}

#[test]
fn expiry_sweep_is_idempotent() {
    let h = harness().with_parties();
    let first = h.mint_one(SELLER);
    let second = h.mint_one(SELLER);
    h.market.create_offer(BUYER, first, dec!(10)).unwrap();
    h.clock.advance(chrono::Duration::days(1));
    let fresh = h.market.create_offer(BUYER, second, dec!(20)).unwrap();
    h.clock.advance(chrono::Duration::days(6) + chrono::Duration::hours(1));

    assert_eq!(h.market.expire_offers(), 1);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(20)));
    assert_eq!(h.market.expire_offers(), 0);
    assert_eq!(h.balance(BUYER), (dec!(150), dec!(20)));
    assert_eq!(h.market.offer(fresh.id).unwrap().status, OfferStatus::Pending);
}

// --- Queries ---

#[test]
fn offers_made_and_received() {
    let h = harness().with_parties();
    h.open(OTHER, dec!(50));
    let a = h.mint_one(SELLER);
    let b = h.mint_one(OTHER);
    h.market.create_offer(BUYER, a, dec!(1)).unwrap();
    let on_b = h.market.create_offer(BUYER, b, dec!(2)).unwrap();
    h.market.create_offer(OTHER, a, dec!(3)).unwrap();
    h.market.cancel_offer(on_b.id, BUYER).unwrap();

    let made = h.market.offers_made(BUYER, None, Page::default());
    assert_eq!(made.total, 2);
    assert_eq!(made.items[0].id, on_b.id);
    let pending = h.market.offers_made(BUYER, Some(OfferStatus::Pending), Page::default());
    assert_eq!(pending.total, 1);

    let received = h.market.offers_received(SELLER, None, Page::default());
    assert_eq!(received.total, 2);
    assert!(received.items.iter().all(|o| o.instance_id == a));
    assert_eq!(h.market.offers_received(OTHER, None, Page::default()).total, 1);
}
