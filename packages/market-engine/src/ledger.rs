//! Points ledger. All balance mutation funnels through the four primitives
//! on `Tables`, each of which appends an audit row.

use market_types::{check_price, Decimal, UserId};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::events::{EventKind, NewEvent, Notification, NotificationKind};
use crate::market::Market;
use crate::models::{Account, Page, Paged, PointTransaction, PointTxKind, Reason};
use crate::store::Tables;
use crate::MarketError;

impl Tables {
    pub(crate) fn account(&self, user_id: UserId) -> Result<&Account, MarketError> {
        self.accounts
            .get(&user_id)
            .ok_or_else(|| MarketError::account_not_found(user_id))
    }

    fn account_mut(&mut self, user_id: UserId) -> Result<&mut Account, MarketError> {
        self.accounts
            .get_mut(&user_id)
            .ok_or_else(|| MarketError::account_not_found(user_id))
    }

    pub(crate) fn insert_account(&mut self, user_id: UserId) -> Result<(), MarketError> {
        if self.accounts.get(&user_id).is_some() {
            return Err(MarketError::InvalidState(format!(
                "User {user_id} already has a points account"
            )));
        }
        let now = self.now;
        self.accounts.insert(
            user_id,
            Account {
                user_id,
                balance: Decimal::ZERO,
                frozen: Decimal::ZERO,
                total_earned: Decimal::ZERO,
                total_spent: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    /// Returns `Ok(false)` for a zero amount so callers can skip the mutation.
    /// Amounts finer than the ledger scale are refused, never rounded.
    fn check_amount(&self, amount: Decimal) -> Result<bool, MarketError> {
        if amount < Decimal::ZERO {
            error!(%amount, "Negative ledger amount");
            return Err(MarketError::Internal(format!(
                "ledger amount cannot be negative ({amount})"
            )));
        }
        if amount.normalize().scale() > self.scale {
            return Err(MarketError::InvalidPrice(format!(
                "amount {amount} has more than {} decimal places",
                self.scale
            )));
        }
        Ok(!amount.is_zero())
    }

    pub(crate) fn credit(
        &mut self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        self.credit_as(user_id, PointTxKind::Earn, amount, reason)
    }

    fn credit_as(
        &mut self,
        user_id: UserId,
        kind: PointTxKind,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        if !self.check_amount(amount)? {
            return Ok(());
        }
        let now = self.now;
        let account = self.account_mut(user_id)?;
        account.balance += amount;
        account.total_earned += amount;
        account.updated_at = now;
        self.log_point_tx(user_id, kind, amount, reason)
    }

    /// Spends from funds that are not frozen.
    pub(crate) fn debit(
        &mut self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        if !self.check_amount(amount)? {
            return Ok(());
        }
        let now = self.now;
        let account = self.account_mut(user_id)?;
        if account.available() < amount {
            return Err(MarketError::InsufficientFunds(format!(
                "Need {amount} points, {} available",
                account.available()
            )));
        }
        account.balance -= amount;
        account.total_spent += amount;
        account.updated_at = now;
        self.log_point_tx(user_id, PointTxKind::Spend, amount, reason)
    }

    pub(crate) fn freeze(
        &mut self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        if !self.check_amount(amount)? {
            return Ok(());
        }
        let now = self.now;
        let account = self.account_mut(user_id)?;
        if account.available() < amount {
            return Err(MarketError::InsufficientFunds(format!(
                "Cannot hold {amount} points, {} available",
                account.available()
            )));
        }
        account.frozen += amount;
        account.updated_at = now;
        self.log_point_tx(user_id, PointTxKind::Freeze, amount, reason)
    }

    pub(crate) fn unfreeze(
        &mut self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        if !self.check_amount(amount)? {
            return Ok(());
        }
        let now = self.now;
        let account = self.account_mut(user_id)?;
        if account.frozen < amount {
            return Err(MarketError::InvalidState(format!(
                "Cannot release {amount} points, only {} held",
                account.frozen
            )));
        }
        account.frozen -= amount;
        account.updated_at = now;
        self.log_point_tx(user_id, PointTxKind::Unfreeze, amount, reason)
    }

    fn log_point_tx(
        &mut self,
        user_id: UserId,
        kind: PointTxKind,
        amount: Decimal,
        reason: Reason,
    ) -> Result<(), MarketError> {
        let (balance_after, frozen_after) = {
            let account = self.account(user_id)?;
            (account.balance, account.frozen)
        };
        let id = self.next_point_tx_id();
        let (related_type, related_id) = match reason.related {
            Some((kind, id)) => (Some(kind), Some(id)),
            None => (None, None),
        };
        self.point_log.push(PointTransaction {
            id,
            user_id,
            kind,
            amount,
            balance_after,
            frozen_after,
            description: reason.description,
            related_id,
            related_type,
            created_at: self.now,
        });
        Ok(())
    }
}

impl Market {
    /// Opens a points account seeded with the configured registration grant.
    pub fn open_account(&self, user_id: UserId) -> Result<Account, MarketError> {
        let grant = self.settings.initial_points;
        let account = self.store.transaction(self.now(), |t| {
            t.insert_account(user_id)?;
            t.credit(user_id, grant, Reason::new("Registration grant"))?;
            t.account(user_id).cloned()
        })?;
        info!(user_id, %grant, "Points account opened");
        Ok(account)
    }

    pub fn account(&self, user_id: UserId) -> Result<Account, MarketError> {
        self.store.read(|t| t.account(user_id).cloned())
    }

    pub fn point_transactions(&self, user_id: UserId, page: Page) -> Paged<PointTransaction> {
        self.store
            .read(|t| page.paginate(t.point_log.iter().filter(|tx| tx.user_id == user_id)))
    }

    pub fn credit_points(
        &self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<Account, MarketError> {
        self.store.transaction(self.now(), |t| {
            t.credit(user_id, amount, reason)?;
            t.account(user_id).cloned()
        })
    }

    pub fn debit_points(
        &self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<Account, MarketError> {
        self.store.transaction(self.now(), |t| {
            t.debit(user_id, amount, reason)?;
            t.account(user_id).cloned()
        })
    }

    pub fn freeze_points(
        &self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<Account, MarketError> {
        self.store.transaction(self.now(), |t| {
            t.freeze(user_id, amount, reason)?;
            t.account(user_id).cloned()
        })
    }

    pub fn unfreeze_points(
        &self,
        user_id: UserId,
        amount: Decimal,
        reason: Reason,
    ) -> Result<Account, MarketError> {
        self.store.transaction(self.now(), |t| {
            t.unfreeze(user_id, amount, reason)?;
            t.account(user_id).cloned()
        })
    }

    /// Admin grant. Recorded in the ledger log and as a public event.
    pub fn airdrop_points(
        &self,
        user_id: UserId,
        amount: Decimal,
        reason: &str,
    ) -> Result<Account, MarketError> {
        let amount = check_price(amount, self.fee_schedule().scale)?;
        let description = format!("Airdrop: {reason}");
        let now = self.now();
        let account = self.store.transaction(now, |t| {
            t.credit_as(
                user_id,
                PointTxKind::Airdrop,
                amount,
                Reason::new(description.clone()),
            )?;
            t.account(user_id).cloned()
        })?;

        info!(user_id, %amount, "Points airdropped");
        self.emit(NewEvent {
            kind: EventKind::AirdropPoints,
            user_id,
            description: format!("Received {amount} points. {description}"),
            related: None,
            at: now,
        });
        self.notify(Notification {
            user_id,
            kind: NotificationKind::Points,
            title: "Points received".into(),
            content: format!("You received {amount} points. {description}"),
            related_id: None,
        });
        Ok(account)
    }

    /// Airdrops `amount` to each user in its own transaction. A user without
    /// an account is skipped and reported; the rest still receive points.
    pub fn batch_airdrop_points(
        &self,
        user_ids: &[UserId],
        amount: Decimal,
        reason: &str,
    ) -> Result<AirdropBatch, MarketError> {
        check_price(amount, self.fee_schedule().scale)?;
        let mut batch = AirdropBatch::default();
        for &user_id in user_ids {
            match self.airdrop_points(user_id, amount, reason) {
                Ok(_) => batch.credited += 1,
                Err(e) => {
                    warn!(user_id, error = %e, "Airdrop skipped");
                    batch.failed.push(user_id);
                }
            }
        }
        info!(
            credited = batch.credited,
            failed = batch.failed.len(),
            %amount,
            "Batch airdrop finished"
        );
        Ok(batch)
    }

    /// Airdrop ledger rows, newest first, optionally for one user.
    pub fn airdrop_history(&self, user_id: Option<UserId>, page: Page) -> Paged<PointTransaction> {
        self.store.read(|t| {
            page.paginate(t.point_log.iter().filter(|tx| {
                tx.kind == PointTxKind::Airdrop && user_id.map_or(true, |u| tx.user_id == u)
            }))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AirdropBatch {
    pub credited: usize,
    pub failed: Vec<UserId>,
}
