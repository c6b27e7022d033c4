//! Offer lifecycle: bids on instances that are not listed.
//!
//! The buyer's funds are frozen when the offer is created and the hold is
//! released exactly once, by whichever terminal transition comes first.
//! Acceptance settles through the same primitive as listing purchases.

use std::sync::atomic::Ordering;

use market_types::{
    check_price, Decimal, FeeSchedule, InstanceId, InstanceStatus, OfferId, OfferStatus,
    TradeStatus, UserId,
};
use tracing::{error, info};

use crate::events::{Notification, NotificationKind};
use crate::market::Market;
use crate::metrics::METRICS;
use crate::models::{Offer, Page, Paged, Reason, RelatedType, Trade};
use crate::store::Tables;
use crate::MarketError;

/// What a responding transaction did. `Expired` commits the expiry and is
/// surfaced to the caller as [`MarketError::Expired`].
enum Resolution<T> {
    Done(T),
    Expired(Offer),
}

impl Tables {
    pub(crate) fn offer(&self, offer_id: OfferId) -> Result<&Offer, MarketError> {
        self.offers
            .get(&offer_id)
            .ok_or_else(|| MarketError::offer_not_found(offer_id))
    }

    /// Moves a pending offer to a terminal status and releases its hold.
    fn close_offer(&mut self, offer_id: OfferId, status: OfferStatus) -> Result<Offer, MarketError> {
        let offer = self.offer(offer_id)?.clone();
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "Offer #{offer_id} is already {}",
                offer.status
            )));
        }
        self.unfreeze(
            offer.buyer_id,
            offer.price,
            Reason::new(format!("Offer #{offer_id} {status}, hold released"))
                .related(RelatedType::Offer, offer_id),
        )?;
        self.set_offer_status(offer_id, status)
    }

    fn set_offer_status(
        &mut self,
        offer_id: OfferId,
        status: OfferStatus,
    ) -> Result<Offer, MarketError> {
        let now = self.now;
        let offer = self
            .offers
            .get_mut(&offer_id)
            .ok_or_else(|| MarketError::offer_not_found(offer_id))?;
        offer.status = status;
        offer.responded_at = Some(now);
        Ok(offer.clone())
    }

    /// Common guard for accept/reject/cancel. `authorize` vets the caller
    /// before anything is written; an expired offer is then expired here.
    fn pending_offer(
        &mut self,
        offer_id: OfferId,
        authorize: impl FnOnce(&Tables, &Offer) -> Result<(), MarketError>,
    ) -> Result<Resolution<Offer>, MarketError> {
        let offer = self.offer(offer_id)?.clone();
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "Offer #{offer_id} is already {}",
                offer.status
            )));
        }
        authorize(self, &offer)?;
        if offer.is_expired_at(self.now) {
            let expired = self.close_offer(offer_id, OfferStatus::Expired)?;
            return Ok(Resolution::Expired(expired));
        }
        Ok(Resolution::Done(offer))
    }

    fn accept_offer(
        &mut self,
        offer_id: OfferId,
        seller_id: UserId,
        fees: &FeeSchedule,
    ) -> Result<Resolution<(Offer, Trade)>, MarketError> {
        let authorize = |t: &Tables, offer: &Offer| {
            if t.instance(offer.instance_id)?.owner_id != seller_id {
                return Err(MarketError::Forbidden(format!(
                    "Only the owner of instance #{} can accept offer #{offer_id}",
                    offer.instance_id
                )));
            }
            Ok(())
        };
        let offer = match self.pending_offer(offer_id, authorize)? {
            Resolution::Done(offer) => offer,
            Resolution::Expired(offer) => return Ok(Resolution::Expired(offer)),
        };
        let instance = self.instance(offer.instance_id)?.clone();
        if offer.buyer_id == seller_id {
            return Err(MarketError::SelfTrade(
                "You already own this item; cancel your offer instead".into(),
            ));
        }
        if instance.status != InstanceStatus::InWallet {
            return Err(MarketError::InvalidState(format!(
                "Instance #{} is {}, cancel the listing before accepting offers",
                instance.id, instance.status
            )));
        }
        let creator_id = self.asset(instance.asset_id)?.creator_id;

        let split = fees.split(offer.price)?;
        let trade = Trade {
            id: self.next_trade_id(),
            listing_id: None,
            offer_id: Some(offer_id),
            instance_id: instance.id,
            buyer_id: offer.buyer_id,
            seller_id,
            creator_id,
            price: split.price,
            platform_fee: split.platform_fee,
            creator_royalty: split.creator_royalty,
            seller_received: split.seller_received,
            status: TradeStatus::Pending,
            created_at: self.now,
            completed_at: None,
        };
        self.trades.insert(trade.id, trade.clone());
        self.set_instance_status(instance.id, InstanceStatus::InWallet, InstanceStatus::PendingTrade)?;
        let trade = self.settle_trade(trade.id)?;
        let offer = self.set_offer_status(offer_id, OfferStatus::Accepted)?;
        Ok(Resolution::Done((offer, trade)))
    }
}

impl Market {
    /// Freezes `price` on the buyer's account until the offer resolves.
    pub fn create_offer(
        &self,
        buyer_id: UserId,
        instance_id: InstanceId,
        price: Decimal,
    ) -> Result<Offer, MarketError> {
        let price = check_price(price, self.fee_schedule().scale)?;
        let expiry = self.settings.offer_expiry;
        let (offer, owner_id) = self.store.transaction(self.now(), |t| {
            let instance = t.instance(instance_id)?;
            let owner_id = instance.owner_id;
            if owner_id == buyer_id {
                return Err(MarketError::SelfTrade(
                    "You cannot make an offer on your own item".into(),
                ));
            }
            match instance.status {
                InstanceStatus::InWallet => {}
                InstanceStatus::OnSale => {
                    return Err(MarketError::InvalidState(format!(
                        "Instance #{instance_id} is listed for sale, buy it directly"
                    )))
                }
                other => {
                    return Err(MarketError::InvalidState(format!(
                        "Instance #{instance_id} is {other} and cannot receive offers"
                    )))
                }
            }

            let expires_at = t.now.checked_add_signed(expiry).ok_or_else(|| {
                MarketError::Config(format!("offer expiry of {expiry} overflows the calendar"))
            })?;
            let id = t.next_offer_id();
            t.freeze(
                buyer_id,
                price,
                Reason::new(format!("Hold for offer #{id}")).related(RelatedType::Offer, id),
            )?;
            let offer = Offer {
                id,
                buyer_id,
                instance_id,
                price,
                status: OfferStatus::Pending,
                expires_at,
                responded_at: None,
                created_at: t.now,
            };
            t.offers.insert(id, offer.clone());
            Ok((offer, owner_id))
        })?;

        METRICS.offers_created.fetch_add(1, Ordering::Relaxed);
        info!(offer_id = offer.id, instance_id, buyer_id, %price, "Offer created");
        self.notify(Notification::new(
            owner_id,
            NotificationKind::Offer,
            "New offer",
            format!("Instance #{instance_id} received an offer of {price} points"),
            offer.id,
        ));
        Ok(offer)
    }

    /// Settles the offer into a completed trade under the instance lock.
    pub async fn accept_offer(
        &self,
        offer_id: OfferId,
        seller_id: UserId,
    ) -> Result<Trade, MarketError> {
        let instance_id = self.store.read(|t| t.offer(offer_id).map(|o| o.instance_id))?;
        let fees = self.fee_schedule();
        let resolution = self
            .with_instance_lock(instance_id, || {
                self.store
                    .transaction(self.now(), |t| t.accept_offer(offer_id, seller_id, &fees))
            })
            .await?;

        let (offer, trade) = match resolution {
            Resolution::Done(done) => done,
            Resolution::Expired(offer) => return Err(self.offer_expired(offer)),
        };
        METRICS.offers_accepted.fetch_add(1, Ordering::Relaxed);
        METRICS.trades_completed.fetch_add(1, Ordering::Relaxed);
        info!(offer_id, trade_id = trade.id, seller_id, buyer_id = offer.buyer_id, "Offer accepted");
        self.notify(Notification::new(
            offer.buyer_id,
            NotificationKind::Offer,
            "Offer accepted",
            format!("Your offer on instance #{} was accepted", offer.instance_id),
            offer_id,
        ));
        self.announce_trade(&trade);
        Ok(trade)
    }

    pub fn reject_offer(&self, offer_id: OfferId, seller_id: UserId) -> Result<Offer, MarketError> {
        let resolution = self.store.transaction(self.now(), |t| {
            let authorize = |t: &Tables, offer: &Offer| {
                if t.instance(offer.instance_id)?.owner_id != seller_id {
                    return Err(MarketError::Forbidden(format!(
                        "Only the owner can reject offer #{offer_id}"
                    )));
                }
                Ok(())
            };
            match t.pending_offer(offer_id, authorize)? {
                Resolution::Done(_) => {}
                Resolution::Expired(offer) => return Ok(Resolution::Expired(offer)),
            }
            t.close_offer(offer_id, OfferStatus::Rejected).map(Resolution::Done)
        })?;
        let offer = match resolution {
            Resolution::Done(offer) => offer,
            Resolution::Expired(offer) => return Err(self.offer_expired(offer)),
        };
        METRICS.offers_rejected.fetch_add(1, Ordering::Relaxed);
        info!(offer_id, seller_id, "Offer rejected");
        self.notify(Notification::new(
            offer.buyer_id,
            NotificationKind::Offer,
            "Offer rejected",
            format!("Your offer was rejected and {} points were released", offer.price),
            offer_id,
        ));
        Ok(offer)
    }

    pub fn cancel_offer(&self, offer_id: OfferId, buyer_id: UserId) -> Result<Offer, MarketError> {
        let resolution = self.store.transaction(self.now(), |t| {
            let authorize = |_: &Tables, offer: &Offer| {
                if offer.buyer_id != buyer_id {
                    return Err(MarketError::Forbidden(format!(
                        "Only the bidder can cancel offer #{offer_id}"
                    )));
                }
                Ok(())
            };
            match t.pending_offer(offer_id, authorize)? {
                Resolution::Done(_) => {}
                Resolution::Expired(offer) => return Ok(Resolution::Expired(offer)),
            }
            t.close_offer(offer_id, OfferStatus::Cancelled).map(Resolution::Done)
        })?;
        let offer = match resolution {
            Resolution::Done(offer) => offer,
            Resolution::Expired(offer) => return Err(self.offer_expired(offer)),
        };
        METRICS.offers_cancelled.fetch_add(1, Ordering::Relaxed);
        info!(offer_id, buyer_id, "Offer cancelled");
        Ok(offer)
    }

    /// Expires every pending offer past its deadline. Re-running is a no-op.
    pub fn expire_offers(&self) -> usize {
        let now = self.now();
        let due: Vec<OfferId> = self.store.read(|t| {
            t.offers
                .values()
                .filter(|o| o.status == OfferStatus::Pending && o.is_expired_at(now))
                .map(|o| o.id)
                .collect()
        });

        let mut expired = 0;
        for offer_id in due {
            let result = self.store.transaction(now, |t| {
                let offer = t.offer(offer_id)?;
                if offer.status != OfferStatus::Pending || !offer.is_expired_at(now) {
                    return Ok(None);
                }
                t.close_offer(offer_id, OfferStatus::Expired).map(Some)
            });
            match result {
                Ok(Some(offer)) => {
                    expired += 1;
                    self.announce_expiry(&offer);
                }
                Ok(None) => {}
                Err(e) => error!(offer_id, error = %e, "Failed to expire offer"),
            }
        }
        if expired > 0 {
            info!(expired, "Expired offers");
        }
        expired
    }

    fn offer_expired(&self, offer: Offer) -> MarketError {
        self.announce_expiry(&offer);
        MarketError::offer_expired(offer.id)
    }

    fn announce_expiry(&self, offer: &Offer) {
        METRICS.offers_expired.fetch_add(1, Ordering::Relaxed);
        info!(offer_id = offer.id, buyer_id = offer.buyer_id, "Offer expired");
        self.notify(Notification::new(
            offer.buyer_id,
            NotificationKind::Offer,
            "Offer expired",
            format!("Your offer expired and {} points were released", offer.price),
            offer.id,
        ));
    }

    pub fn offer(&self, offer_id: OfferId) -> Result<Offer, MarketError> {
        self.store.read(|t| t.offer(offer_id).cloned())
    }

    pub fn offers_made(
        &self,
        buyer_id: UserId,
        status: Option<OfferStatus>,
        page: Page,
    ) -> Paged<Offer> {
        self.store.read(|t| {
            page.paginate(t.offers.values().filter(|o| {
                o.buyer_id == buyer_id && status.map_or(true, |s| o.status == s)
            }))
        })
    }

    /// Offers on instances `owner_id` currently owns.
    pub fn offers_received(
        &self,
        owner_id: UserId,
        status: Option<OfferStatus>,
        page: Page,
    ) -> Paged<Offer> {
        self.store.read(|t| {
            page.paginate(t.offers.values().filter(|o| {
                status.map_or(true, |s| o.status == s)
                    && t.instances
                        .get(&o.instance_id)
                        .is_some_and(|i| i.owner_id == owner_id)
            }))
        })
    }
}
