//! Shared types and pure-logic utilities for the collectibles marketplace.
//! No I/O and no async runtime: fixed-point amounts, fee splits, lifecycle states.

mod amount;
mod error;
mod fees;
mod status;

pub use amount::{check_price, round_half_even, to_scale, DEFAULT_SCALE, MAX_SCALE};
pub use error::TypesError;
pub use fees::{FeeSchedule, FeeSplit};
pub use status::{
    AssetStatus, InstanceStatus, ListingStatus, OfferStatus, TradeStatus,
};

pub use rust_decimal::Decimal;

pub type UserId = u64;
pub type AssetId = u64;
pub type InstanceId = u64;
pub type ListingId = u64;
pub type TradeId = u64;
pub type OfferId = u64;
