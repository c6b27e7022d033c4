//! Fee schedule and the three-way split of a sale price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{to_scale, DEFAULT_SCALE, MAX_SCALE};
use crate::TypesError;

/// Rates applied to every settled trade. `0.025` = 2.5%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub platform_fee_rate: Decimal,
    pub creator_royalty_rate: Decimal,
    /// Fractional digits every part is rounded to.
    pub scale: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(25, 3),
            creator_royalty_rate: Decimal::new(25, 3),
            scale: DEFAULT_SCALE,
        }
    }
}

/// How a price is divided. Invariant: `platform_fee + creator_royalty + seller_received == price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub price: Decimal,
    pub platform_fee: Decimal,
    pub creator_royalty: Decimal,
    pub seller_received: Decimal,
}

impl FeeSchedule {
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.platform_fee_rate < Decimal::ZERO {
            return Err(TypesError::InvalidRate(format!(
                "platform fee rate cannot be negative ({})",
                self.platform_fee_rate
            )));
        }
        if self.creator_royalty_rate < Decimal::ZERO {
            return Err(TypesError::InvalidRate(format!(
                "creator royalty rate cannot be negative ({})",
                self.creator_royalty_rate
            )));
        }
        if self.platform_fee_rate + self.creator_royalty_rate > Decimal::ONE {
            return Err(TypesError::InvalidRate(
                "platform fee rate + creator royalty rate cannot exceed 1".into(),
            ));
        }
        if self.scale > MAX_SCALE {
            return Err(TypesError::InvalidRate(format!(
                "decimal scale {} exceeds {MAX_SCALE}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Fee and royalty are rounded half-to-even independently; the seller takes the remainder,
    /// so any rounding difference lands on the seller's share.
    pub fn split(&self, price: Decimal) -> Result<FeeSplit, TypesError> {
        if price <= Decimal::ZERO {
            return Err(TypesError::InvalidPrice(format!(
                "price must be greater than zero, got {price}"
            )));
        }
        let price = to_scale(price, self.scale);
        let platform_fee = to_scale(price * self.platform_fee_rate, self.scale);
        let creator_royalty = to_scale(price * self.creator_royalty_rate, self.scale);
        let mut seller_received = price - platform_fee - creator_royalty;

        let distributed = platform_fee + creator_royalty + seller_received;
        if distributed != price {
            seller_received += price - distributed;
        }

        let split = FeeSplit {
            price,
            platform_fee,
            creator_royalty,
            seller_received: to_scale(seller_received, self.scale),
        };
        split.check()?;
        Ok(split)
    }
}

impl FeeSplit {
    /// Re-verifies the sum invariant and that no part went negative.
    pub fn check(&self) -> Result<(), TypesError> {
        let total = self.platform_fee + self.creator_royalty + self.seller_received;
        let negative = self.platform_fee < Decimal::ZERO
            || self.creator_royalty < Decimal::ZERO
            || self.seller_received < Decimal::ZERO;
        if total != self.price || negative {
            return Err(TypesError::SplitMismatch {
                price: self.price,
                fee: self.platform_fee,
                royalty: self.creator_royalty,
                seller: self.seller_received,
                total,
            });
        }
        Ok(())
    }
}
