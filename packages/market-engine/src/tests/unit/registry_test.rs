use crate::events::EventKind;
use crate::models::{NewAsset, Page};
use crate::tests::test_utils::*;
use crate::MarketError;
use market_types::{AssetStatus, InstanceStatus};
use rust_decimal_macros::dec;

fn new_asset(supply: u32) -> NewAsset {
    NewAsset {
        name: "Harbor at Dusk".into(),
        description: "Oil on canvas".into(),
        media_url: "https://media.test/harbor.png".into(),
        total_supply: supply,
    }
}

// --- Submission and review ---

#[test]
fn submitted_asset_waits_for_review() {
    let h = harness();
    h.open(CREATOR, dec!(0));
    let asset = h.market.submit_asset(CREATOR, new_asset(3)).unwrap();
    assert_eq!(asset.status, AssetStatus::PendingReview);
    assert_eq!(asset.minted_count, 0);
    assert_eq!(h.market.instances_owned_by(CREATOR, Page::default()).total, 0);
}

#[test]
fn submit_rejects_blank_name_and_zero_supply() {
    let h = harness();
    let blank = NewAsset {
        name: "   ".into(),
        ..new_asset(1)
    };
    assert!(matches!(
        h.market.submit_asset(CREATOR, blank).unwrap_err(),
        MarketError::InvalidInput(_)
    ));
    assert!(matches!(
        h.market.submit_asset(CREATOR, new_asset(0)).unwrap_err(),
        MarketError::InvalidInput(_)
    ));
}

#[test]
fn approval_mints_full_supply_to_creator() {
    let h = harness();
    h.open(CREATOR, dec!(0));
    let asset = h.market.submit_asset(CREATOR, new_asset(3)).unwrap();
    let reviewed = h.market.review_asset(asset.id, true).unwrap();
    assert_eq!(reviewed.status, AssetStatus::Active);
    assert_eq!(reviewed.minted_count, 3);

    let owned = h.market.instances_owned_by(CREATOR, Page::default());
    assert_eq!(owned.total, 3);
    let mut serials: Vec<u32> = owned.items.iter().map(|i| i.serial).collect();
    serials.sort_unstable();
    assert_eq!(serials, vec![1, 2, 3]);
    assert!(owned.items.iter().all(|i| i.status == InstanceStatus::InWallet));

    let mints = h.events.list(Some(EventKind::Mint), Page::default());
    assert_eq!(mints.total, 1);
}

#[test]
fn rejection_mints_nothing_and_review_is_one_shot() {
    let h = harness();
    h.open(CREATOR, dec!(0));
    let asset = h.market.submit_asset(CREATOR, new_asset(2)).unwrap();
    let reviewed = h.market.review_asset(asset.id, false).unwrap();
    assert_eq!(reviewed.status, AssetStatus::Rejected);
    assert_eq!(h.market.instances_owned_by(CREATOR, Page::default()).total, 0);

    let err = h.market.review_asset(asset.id, true).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
}

#[test]
fn submit_requires_creator_account() {
    let h = harness();
    let err = h.market.submit_asset(CREATOR, new_asset(3)).unwrap_err();
    assert!(matches!(err, MarketError::NotFound(_)));
    assert!(matches!(
        h.market.asset(1).unwrap_err(),
        MarketError::NotFound(_)
    ));
}

// --- Minting ---

#[test]
fn minting_respects_supply_and_status() {
    let h = harness();
    h.open(CREATOR, dec!(0));
    let asset = h.market.submit_asset(CREATOR, new_asset(2)).unwrap();
    let err = h.market.mint_instances(asset.id, SELLER, 1).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));

    h.market.review_asset(asset.id, true).unwrap();
    let err = h.market.mint_instances(asset.id, SELLER, 1).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
}

#[test]
fn token_ids_are_unique() {
    let h = harness();
    let minted = h.mint_to(SELLER, 50);
    let mut ids: Vec<&str> = minted.iter().map(|i| i.token_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50);
    assert!(minted[0].token_id.starts_with(&format!("tk-{}-1-", minted[0].asset_id)));
}

// --- Status compare-and-set ---

#[test]
fn status_cas_rejects_unexpected_current_status() {
    let h = harness();
    let id = h.mint_one(SELLER);
    let err = h
        .market
        .set_instance_status(id, InstanceStatus::OnSale, InstanceStatus::InWallet)
        .unwrap_err();
    assert!(matches!(err, MarketError::ConcurrentModification(_)));

    let updated = h
        .market
        .set_instance_status(id, InstanceStatus::InWallet, InstanceStatus::OnSale)
        .unwrap();
    assert_eq!(updated.status, InstanceStatus::OnSale);
}

#[test]
fn unknown_instance_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.market.instance(404).unwrap_err(),
        MarketError::NotFound(_)
    ));
}

// --- Burn ---

#[test]
fn owner_can_burn_wallet_instance() {
    let h = harness();
    let id = h.mint_one(SELLER);
    let burned = h.market.burn_instance(id, SELLER).unwrap();
    assert_eq!(burned.status, InstanceStatus::Burned);
    assert_eq!(h.market.instances_owned_by(SELLER, Page::default()).total, 0);
    assert_eq!(h.events.list(Some(EventKind::Burn), Page::default()).total, 1);
}

#[test]
fn burn_requires_owner_and_wallet_status() {
    let h = harness().with_parties();
    let id = h.mint_one(SELLER);
    assert!(matches!(
        h.market.burn_instance(id, BUYER).unwrap_err(),
        MarketError::NotOwner(_)
    ));

    h.market.create_listing(SELLER, id, dec!(5)).unwrap();
    assert!(matches!(
        h.market.burn_instance(id, SELLER).unwrap_err(),
        MarketError::InvalidState(_)
    ));
}

#[test]
fn burned_instance_cannot_be_listed() {
    let h = harness();
    let id = h.mint_one(SELLER);
    h.market.burn_instance(id, SELLER).unwrap();
    let err = h.market.create_listing(SELLER, id, dec!(1)).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)));
}
