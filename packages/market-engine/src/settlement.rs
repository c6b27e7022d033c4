//! Settlement engine.
//!
//! A listing purchase runs in two transactions. The reservation (under the
//! instance lock) re-validates the listing, prices the split, records a
//! `pending` trade, holds the buyer's funds and parks the instance in
//! `pending_trade`. Payment completion then consumes the hold, pays every
//! party and hands the instance over. A completion failure leaves the trade
//! `pending` for [`Market::reconcile_pending_trades`].

use std::sync::atomic::Ordering;

use market_types::{
    FeeSchedule, InstanceStatus, ListingId, ListingStatus, TradeId, TradeStatus, UserId,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::events::{EventKind, NewEvent, Notification, NotificationKind};
use crate::market::Market;
use crate::metrics::METRICS;
use crate::models::{IncomeKind, Page, Paged, Reason, RelatedType, Trade, TradeSide};
use crate::store::Tables;
use crate::MarketError;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub completed: usize,
    pub still_pending: Vec<TradeId>,
}

impl Tables {
    pub(crate) fn trade(&self, trade_id: TradeId) -> Result<&Trade, MarketError> {
        self.trades
            .get(&trade_id)
            .ok_or_else(|| MarketError::trade_not_found(trade_id))
    }

    /// Re-validates under the lock and reserves the instance for `buyer_id`.
    pub(crate) fn reserve_listing_trade(
        &mut self,
        listing_id: ListingId,
        buyer_id: UserId,
        fees: &FeeSchedule,
    ) -> Result<Trade, MarketError> {
        let listing = self.listing(listing_id)?.clone();
        match listing.status {
            ListingStatus::Active => {}
            ListingStatus::Sold => return Err(MarketError::already_sold(listing_id)),
            ListingStatus::Canceled => {
                return Err(MarketError::Conflict(format!(
                    "Listing #{listing_id} was canceled by the seller"
                )))
            }
        }
        if listing.seller_id == buyer_id {
            return Err(MarketError::SelfTrade("You cannot buy your own listing".into()));
        }

        let instance = self.instance(listing.instance_id)?.clone();
        if instance.status != InstanceStatus::OnSale || instance.owner_id != listing.seller_id {
            return Err(MarketError::Conflict(format!(
                "Instance #{} changed and can no longer be bought",
                instance.id
            )));
        }
        let creator_id = self.asset(instance.asset_id)?.creator_id;
        self.account(listing.seller_id)?;
        self.account(creator_id)?;

        let split = fees.split(listing.price)?;
        let trade = Trade {
            id: self.next_trade_id(),
            listing_id: Some(listing_id),
            offer_id: None,
            instance_id: instance.id,
            buyer_id,
            seller_id: listing.seller_id,
            creator_id,
            price: split.price,
            platform_fee: split.platform_fee,
            creator_royalty: split.creator_royalty,
            seller_received: split.seller_received,
            status: TradeStatus::Pending,
            created_at: self.now,
            completed_at: None,
        };

        self.freeze(
            buyer_id,
            trade.price,
            Reason::new(format!("Hold for trade #{}", trade.id)).related(RelatedType::Trade, trade.id),
        )?;
        self.set_listing_status(listing_id, ListingStatus::Sold)?;
        self.set_instance_status(instance.id, InstanceStatus::OnSale, InstanceStatus::PendingTrade)?;
        self.trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    /// Payment completion shared by listing and offer trades. The buyer must
    /// already hold `price` frozen and the instance must be `pending_trade`.
    pub(crate) fn settle_trade(&mut self, trade_id: TradeId) -> Result<Trade, MarketError> {
        let trade = self.trade(trade_id)?.clone();
        if trade.status != TradeStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "Trade #{trade_id} is {}",
                trade.status
            )));
        }
        trade.split().check()?;

        let reason = |what: &str| {
            Reason::new(format!("Trade #{trade_id} {what}")).related(RelatedType::Trade, trade_id)
        };
        self.unfreeze(trade.buyer_id, trade.price, reason("hold released"))?;
        self.debit(trade.buyer_id, trade.price, reason("purchase"))?;
        self.credit(trade.seller_id, trade.seller_received, reason("sale proceeds"))?;
        self.credit(trade.creator_id, trade.creator_royalty, reason("creator royalty"))?;
        self.platform_income(
            IncomeKind::Fee,
            trade.platform_fee,
            format!("Trade #{trade_id} platform fee"),
            Some(trade_id),
        )?;
        self.transfer_ownership(trade.instance_id, trade.buyer_id)?;
        self.set_instance_status(
            trade.instance_id,
            InstanceStatus::PendingTrade,
            InstanceStatus::InWallet,
        )?;

        let now = self.now;
        let stored = self
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| MarketError::trade_not_found(trade_id))?;
        stored.status = TradeStatus::Completed;
        stored.completed_at = Some(now);
        Ok(stored.clone())
    }
}

impl Market {
    /// Buys an active listing. Returns the trade, which is `completed` unless
    /// payment completion failed and it was left `pending`.
    pub async fn execute_trade(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Trade, MarketError> {
        let instance_id = self.store.read(|t| {
            let listing = t.listing(listing_id)?;
            match listing.status {
                ListingStatus::Active => {}
                ListingStatus::Sold => return Err(MarketError::already_sold(listing_id)),
                ListingStatus::Canceled => {
                    return Err(MarketError::InvalidState(format!(
                        "Listing #{listing_id} is canceled"
                    )))
                }
            }
            if listing.seller_id == buyer_id {
                return Err(MarketError::SelfTrade("You cannot buy your own listing".into()));
            }
            let instance = t.instance(listing.instance_id)?;
            let creator_id = t.asset(instance.asset_id)?.creator_id;
            t.account(listing.seller_id)?;
            t.account(creator_id)?;
            let buyer = t.account(buyer_id)?;
            if buyer.available() < listing.price {
                return Err(MarketError::InsufficientFunds(format!(
                    "Listing costs {} points, you have {} available",
                    listing.price,
                    buyer.available()
                )));
            }
            Ok(listing.instance_id)
        })?;

        let fees = self.fee_schedule();
        let reserved = self
            .with_instance_lock(instance_id, || {
                self.store
                    .transaction(self.now(), |t| t.reserve_listing_trade(listing_id, buyer_id, &fees))
            })
            .await;
        let trade = match reserved {
            Ok(trade) => trade,
            Err(e) => {
                if matches!(e, MarketError::Conflict(_)) {
                    METRICS.trade_conflicts.fetch_add(1, Ordering::Relaxed);
                    warn!(listing_id, buyer_id, error = %e, "Purchase lost the race");
                }
                return Err(e);
            }
        };
        METRICS.trades_reserved.fetch_add(1, Ordering::Relaxed);
        info!(
            trade_id = trade.id,
            listing_id,
            instance_id,
            buyer_id,
            price = %trade.price,
            "Trade reserved"
        );

        Ok(self.complete_trade_payment(trade))
    }

    /// Never fails the caller: a failed completion is reported and the
    /// trade is returned as it stands.
    pub(crate) fn complete_trade_payment(&self, trade: Trade) -> Trade {
        let trade_id = trade.id;
        match self.store.transaction(self.now(), move |t| t.settle_trade(trade_id)) {
            Ok(done) => {
                METRICS.trades_completed.fetch_add(1, Ordering::Relaxed);
                self.announce_trade(&done);
                done
            }
            Err(e) => {
                let current = self.store.read(|t| t.trade(trade_id).cloned()).unwrap_or(trade);
                if current.status == TradeStatus::Completed {
                    return current;
                }
                METRICS.trades_stuck.fetch_add(1, Ordering::Relaxed);
                error!(
                    trade_id = current.id,
                    error = %e,
                    "Trade payment failed, left pending for reconciliation"
                );
                current
            }
        }
    }

    pub(crate) fn announce_trade(&self, trade: &Trade) {
        info!(
            trade_id = trade.id,
            instance_id = trade.instance_id,
            buyer_id = trade.buyer_id,
            seller_id = trade.seller_id,
            seller_received = %trade.seller_received,
            platform_fee = %trade.platform_fee,
            creator_royalty = %trade.creator_royalty,
            "Trade completed"
        );
        self.emit(NewEvent {
            kind: EventKind::Trade,
            user_id: trade.buyer_id,
            description: format!(
                "User {} bought instance #{} for {} points",
                trade.buyer_id, trade.instance_id, trade.price
            ),
            related: Some((RelatedType::Trade, trade.id)),
            at: trade.completed_at.unwrap_or(trade.created_at),
        });
        self.notify(Notification::new(
            trade.seller_id,
            NotificationKind::Trade,
            "Item sold",
            format!(
                "Instance #{} sold for {} points, you received {}",
                trade.instance_id, trade.price, trade.seller_received
            ),
            trade.id,
        ));
        self.notify(Notification::new(
            trade.buyer_id,
            NotificationKind::Trade,
            "Purchase completed",
            format!("Instance #{} is now in your wallet", trade.instance_id),
            trade.id,
        ));
    }

    /// Retries payment completion for every `pending` trade.
    pub fn reconcile_pending_trades(&self) -> ReconcileReport {
        let pending: Vec<Trade> = self.store.read(|t| {
            t.trades
                .values()
                .filter(|trade| trade.status == TradeStatus::Pending)
                .cloned()
                .collect()
        });

        let mut report = ReconcileReport {
            attempted: pending.len(),
            ..ReconcileReport::default()
        };
        for trade in pending {
            let id = trade.id;
            if self.complete_trade_payment(trade).status == TradeStatus::Completed {
                report.completed += 1;
            } else {
                report.still_pending.push(id);
            }
        }
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                completed = report.completed,
                still_pending = report.still_pending.len(),
                "Reconciled pending trades"
            );
        }
        report
    }

    pub fn pending_trade_count(&self) -> usize {
        self.store.read(|t| {
            t.trades
                .values()
                .filter(|trade| trade.status == TradeStatus::Pending)
                .count()
        })
    }

    /// Visible to the buyer and the seller only.
    pub fn trade(&self, trade_id: TradeId, viewer_id: UserId) -> Result<Trade, MarketError> {
        let trade = self.store.read(|t| t.trade(trade_id).cloned())?;
        if trade.buyer_id != viewer_id && trade.seller_id != viewer_id {
            return Err(MarketError::Forbidden(format!(
                "Trade #{trade_id} does not involve you"
            )));
        }
        Ok(trade)
    }

    pub fn trade_history(&self, user_id: UserId, side: TradeSide, page: Page) -> Paged<Trade> {
        self.store.read(|t| {
            page.paginate(t.trades.values().filter(|trade| match side {
                TradeSide::Buy => trade.buyer_id == user_id,
                TradeSide::Sell => trade.seller_id == user_id,
                TradeSide::All => trade.buyer_id == user_id || trade.seller_id == user_id,
            }))
        })
    }
}
