//! Listing lifecycle: standing sell orders on owned instances.

use market_types::{check_price, Decimal, InstanceId, InstanceStatus, ListingId, ListingStatus, UserId};
use tracing::info;

use crate::market::Market;
use crate::models::{Listing, Page, Paged};
use crate::store::Tables;
use crate::MarketError;

impl Tables {
    pub(crate) fn listing(&self, listing_id: ListingId) -> Result<&Listing, MarketError> {
        self.listings
            .get(&listing_id)
            .ok_or_else(|| MarketError::listing_not_found(listing_id))
    }

    pub(crate) fn active_listing_for(&self, instance_id: InstanceId) -> Option<&Listing> {
        self.listings
            .values()
            .find(|l| l.instance_id == instance_id && l.status == ListingStatus::Active)
    }

    pub(crate) fn set_listing_status(
        &mut self,
        listing_id: ListingId,
        status: ListingStatus,
    ) -> Result<(), MarketError> {
        let now = self.now;
        let listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| MarketError::listing_not_found(listing_id))?;
        listing.status = status;
        listing.updated_at = now;
        Ok(())
    }
}

impl Market {
    /// Listing insert and the instance's move to `on_sale` commit together.
    pub fn create_listing(
        &self,
        seller_id: UserId,
        instance_id: InstanceId,
        price: Decimal,
    ) -> Result<Listing, MarketError> {
        let price = check_price(price, self.fee_schedule().scale)?;
        let listing = self.store.transaction(self.now(), |t| {
            let instance = t.instance(instance_id)?;
            if instance.owner_id != seller_id {
                return Err(MarketError::NotOwner(format!(
                    "You do not own instance #{instance_id}"
                )));
            }
            if instance.status != InstanceStatus::InWallet {
                return Err(MarketError::InvalidState(format!(
                    "Instance #{instance_id} is {} and cannot be listed",
                    instance.status
                )));
            }
            if let Some(existing) = t.active_listing_for(instance_id) {
                return Err(MarketError::Internal(format!(
                    "Instance #{instance_id} is in_wallet but listing #{} is active",
                    existing.id
                )));
            }
            t.set_instance_status(instance_id, InstanceStatus::InWallet, InstanceStatus::OnSale)?;
            let listing = Listing {
                id: t.next_listing_id(),
                instance_id,
                seller_id,
                price,
                status: ListingStatus::Active,
                created_at: t.now,
                updated_at: t.now,
            };
            t.listings.insert(listing.id, listing.clone());
            Ok(listing)
        })?;
        info!(listing_id = listing.id, instance_id, seller_id, %price, "Listing created");
        Ok(listing)
    }

    pub fn cancel_listing(
        &self,
        listing_id: ListingId,
        user_id: UserId,
    ) -> Result<Listing, MarketError> {
        let listing = self.store.transaction(self.now(), |t| {
            let listing = t.listing(listing_id)?;
            if listing.seller_id != user_id {
                return Err(MarketError::Forbidden(format!(
                    "Only the seller can cancel listing #{listing_id}"
                )));
            }
            if listing.status != ListingStatus::Active {
                return Err(MarketError::InvalidState(format!(
                    "Listing #{listing_id} is {}",
                    listing.status
                )));
            }
            let instance_id = listing.instance_id;
            t.set_listing_status(listing_id, ListingStatus::Canceled)?;
            t.set_instance_status(instance_id, InstanceStatus::OnSale, InstanceStatus::InWallet)?;
            t.listing(listing_id).cloned()
        })?;
        info!(listing_id, user_id, "Listing canceled");
        Ok(listing)
    }

    pub fn listing(&self, listing_id: ListingId) -> Result<Listing, MarketError> {
        self.store.read(|t| t.listing(listing_id).cloned())
    }

    /// Public market view. Defaults to every status when `status` is `None`.
    pub fn listings(&self, status: Option<ListingStatus>, page: Page) -> Paged<Listing> {
        self.store.read(|t| {
            page.paginate(
                t.listings
                    .values()
                    .filter(|l| status.map_or(true, |s| l.status == s)),
            )
        })
    }

    pub fn my_listings(
        &self,
        seller_id: UserId,
        status: Option<ListingStatus>,
        page: Page,
    ) -> Paged<Listing> {
        self.store.read(|t| {
            page.paginate(t.listings.values().filter(|l| {
                l.seller_id == seller_id && status.map_or(true, |s| l.status == s)
            }))
        })
    }
}
