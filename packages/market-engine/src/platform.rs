//! Platform treasury: a singleton row fed by trade fees and commissions.

use market_types::{check_price, Decimal};
use tracing::info;

use crate::market::Market;
use crate::models::{IncomeKind, Page, Paged, PlatformAccount, PlatformTransaction, PlatformTxKind};
use crate::store::Tables;
use crate::MarketError;

impl Tables {
    pub(crate) fn platform_income(
        &mut self,
        kind: IncomeKind,
        amount: Decimal,
        description: String,
        related_id: Option<u64>,
    ) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Ok(());
        }
        if amount < Decimal::ZERO {
            return Err(MarketError::Internal(format!(
                "platform income cannot be negative ({amount})"
            )));
        }
        let now = self.now;
        let row = self.platform_account_mut();
        row.total_balance += amount;
        let tx_kind = match kind {
            IncomeKind::Fee => {
                row.fee_income += amount;
                PlatformTxKind::Fee
            }
            IncomeKind::Commission => {
                row.commission_income += amount;
                PlatformTxKind::Commission
            }
        };
        row.updated_at = Some(now);
        let balance_after = row.total_balance;
        self.log_platform_tx(tx_kind, amount, balance_after, description, related_id);
        Ok(())
    }

    pub(crate) fn platform_expense(
        &mut self,
        amount: Decimal,
        description: String,
    ) -> Result<(), MarketError> {
        let now = self.now;
        let row = self.platform_account_mut();
        if row.total_balance < amount {
            return Err(MarketError::InsufficientFunds(format!(
                "Platform balance {} cannot cover expense {amount}",
                row.total_balance
            )));
        }
        row.total_balance -= amount;
        row.total_expense += amount;
        row.updated_at = Some(now);
        let balance_after = row.total_balance;
        self.log_platform_tx(PlatformTxKind::Expense, amount, balance_after, description, None);
        Ok(())
    }

    fn log_platform_tx(
        &mut self,
        kind: PlatformTxKind,
        amount: Decimal,
        balance_after: Decimal,
        description: String,
        related_id: Option<u64>,
    ) {
        let id = self.next_platform_tx_id();
        self.platform_log.push(PlatformTransaction {
            id,
            kind,
            amount,
            balance_after,
            description,
            related_id,
            created_at: self.now,
        });
    }
}

impl Market {
    pub fn platform_account(&self) -> PlatformAccount {
        self.store.read(|t| t.platform_account())
    }

    pub fn platform_transactions(
        &self,
        kind: Option<PlatformTxKind>,
        page: Page,
    ) -> Paged<PlatformTransaction> {
        self.store.read(|t| {
            page.paginate(
                t.platform_log
                    .iter()
                    .filter(|tx| kind.map_or(true, |k| tx.kind == k)),
            )
        })
    }

    pub fn record_platform_income(
        &self,
        kind: IncomeKind,
        amount: Decimal,
        description: &str,
        related_id: Option<u64>,
    ) -> Result<PlatformAccount, MarketError> {
        let amount = check_price(amount, self.fee_schedule().scale)?;
        let account = self.store.transaction(self.now(), |t| {
            t.platform_income(kind, amount, description.to_string(), related_id)?;
            Ok(t.platform_account())
        })?;
        info!(kind = ?kind, %amount, "Platform income recorded");
        Ok(account)
    }

    /// Fails with `InsufficientFunds` rather than overdrawing the treasury.
    pub fn record_platform_expense(
        &self,
        amount: Decimal,
        description: &str,
    ) -> Result<PlatformAccount, MarketError> {
        let amount = check_price(amount, self.fee_schedule().scale)?;
        let account = self.store.transaction(self.now(), |t| {
            t.platform_expense(amount, description.to_string())?;
            Ok(t.platform_account())
        })?;
        info!(%amount, "Platform expense recorded");
        Ok(account)
    }
}
