use crate::models::{IncomeKind, Page, PlatformTxKind};
use crate::tests::test_utils::*;
use crate::MarketError;
use rust_decimal_macros::dec;

#[test]
fn platform_starts_empty() {
    let h = harness();
    let platform = h.market.platform_account();
    assert_eq!(platform.total_balance, dec!(0));
    assert_eq!(platform.updated_at, None);
    assert_eq!(h.market.platform_transactions(None, Page::default()).total, 0);
}

#[test]
fn income_is_tracked_by_kind() {
    let h = harness();
    h.market
        .record_platform_income(IncomeKind::Fee, dec!(2.5), "Listing fee", Some(7))
        .unwrap();
    let platform = h
        .market
        .record_platform_income(IncomeKind::Commission, dec!(4), "Partner commission", None)
        .unwrap();

    assert_eq!(platform.total_balance, dec!(6.5));
    assert_eq!(platform.fee_income, dec!(2.5));
    assert_eq!(platform.commission_income, dec!(4));
    assert_eq!(platform.updated_at, Some(start_time()));

    let log = h.market.platform_transactions(None, Page::default());
    assert_eq!(log.total, 2);
    assert_eq!(log.items[0].kind, PlatformTxKind::Commission);
    assert_eq!(log.items[0].balance_after, dec!(6.5));
    assert_eq!(log.items[1].related_id, Some(7));
}

#[test]
fn expense_cannot_overdraw_the_treasury() {
    let h = harness();
    h.market
        .record_platform_income(IncomeKind::Fee, dec!(10), "Fees", None)
        .unwrap();

    let err = h.market.record_platform_expense(dec!(10.5), "Server bill").unwrap_err();
    assert!(matches!(err, MarketError::InsufficientFunds(_)));
    assert_eq!(h.platform_balance(), dec!(10));

    let platform = h.market.record_platform_expense(dec!(4), "Server bill").unwrap();
    assert_eq!(platform.total_balance, dec!(6));
    assert_eq!(platform.total_expense, dec!(4));
    assert_eq!(platform.fee_income, dec!(10));
}

#[test]
fn non_positive_amounts_are_refused() {
    let h = harness();
    assert!(matches!(
        h.market
            .record_platform_income(IncomeKind::Fee, dec!(-1), "Refund", None)
            .unwrap_err(),
        MarketError::InvalidPrice(_)
    ));
    assert!(matches!(
        h.market.record_platform_expense(dec!(0), "Nothing").unwrap_err(),
        MarketError::InvalidPrice(_)
    ));
}

#[tokio::test]
async fn transactions_filter_by_kind() {
    let h = harness().with_parties();
    let listing = h.listed(SELLER, dec!(40));
    h.market.execute_trade(listing.id, BUYER).await.unwrap();
    h.market
        .record_platform_income(IncomeKind::Commission, dec!(1), "Partner", None)
        .unwrap();
    h.market.record_platform_expense(dec!(0.5), "Hosting").unwrap();

    let fees = h.market.platform_transactions(Some(PlatformTxKind::Fee), Page::default());
    assert_eq!(fees.total, 1);
    assert_eq!(fees.items[0].amount, dec!(1));
    assert_eq!(fees.items[0].related_id, Some(1));
    let expenses = h
        .market
        .platform_transactions(Some(PlatformTxKind::Expense), Page::default());
    assert_eq!(expenses.total, 1);
    assert_eq!(h.platform_balance(), dec!(1.5));
}
