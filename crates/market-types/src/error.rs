use rust_decimal::Decimal;

/// Validation failures of the pure money and fee logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("invalid rate: {0}")]
    InvalidRate(String),
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    /// Fee parts do not add up to the price after reconciliation. A logic bug, never user input.
    #[error("fee split of {price} does not reconcile: {fee} + {royalty} + {seller} = {total}")]
    SplitMismatch {
        price: Decimal,
        fee: Decimal,
        royalty: Decimal,
        seller: Decimal,
        total: Decimal,
    },
}
