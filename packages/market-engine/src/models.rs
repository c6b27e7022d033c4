//! Stored rows and query shapes.

use chrono::{DateTime, Utc};
use market_types::{
    AssetId, AssetStatus, Decimal, FeeSplit, InstanceId, InstanceStatus, ListingId, ListingStatus,
    OfferId, OfferStatus, TradeId, TradeStatus, UserId,
};
use serde::{Deserialize, Serialize};

// --- Ledger ---

/// Points account. `balance` includes `frozen`; spendable funds are `balance - frozen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub balance: Decimal,
    pub frozen: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn available(&self) -> Decimal {
        self.balance - self.frozen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointTxKind {
    Earn,
    Airdrop,
    Spend,
    Freeze,
    Unfreeze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedType {
    Trade,
    Listing,
    Offer,
    Instance,
    Asset,
    PointTransaction,
}

/// Immutable audit row appended by every ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: u64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: PointTxKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub frozen_after: Decimal,
    pub description: String,
    pub related_id: Option<u64>,
    pub related_type: Option<RelatedType>,
    pub created_at: DateTime<Utc>,
}

/// Why a ledger row moved; copied into the audit log.
#[derive(Debug, Clone)]
pub struct Reason {
    pub description: String,
    pub related: Option<(RelatedType, u64)>,
}

impl Reason {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            related: None,
        }
    }

    pub fn related(mut self, kind: RelatedType, id: u64) -> Self {
        self.related = Some((kind, id));
        self
    }
}

// --- Platform treasury ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformAccount {
    pub total_balance: Decimal,
    pub fee_income: Decimal,
    pub commission_income: Decimal,
    pub total_expense: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PlatformAccount {
    fn default() -> Self {
        Self {
            total_balance: Decimal::ZERO,
            fee_income: Decimal::ZERO,
            commission_income: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTxKind {
    Commission,
    Fee,
    Expense,
}

/// Income categories the treasury accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeKind {
    Fee,
    Commission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTransaction {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: PlatformTxKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub related_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

// --- Registry ---

/// A collectible definition; instances are numbered copies of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub id: AssetId,
    pub creator_id: UserId,
    pub name: String,
    pub description: String,
    pub media_url: String,
    pub total_supply: u32,
    pub minted_count: u32,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAsset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub media_url: String,
    pub total_supply: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub asset_id: AssetId,
    /// 1-based copy number within the asset.
    pub serial: u32,
    /// Opaque and unique; not an on-chain identifier.
    pub token_id: String,
    pub owner_id: UserId,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Trading ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub instance_id: InstanceId,
    pub seller_id: UserId,
    pub price: Decimal,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Settlement record. Listing trades carry `listing_id`, offer trades carry `offer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub listing_id: Option<ListingId>,
    pub offer_id: Option<OfferId>,
    pub instance_id: InstanceId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub creator_id: UserId,
    pub price: Decimal,
    pub platform_fee: Decimal,
    pub creator_royalty: Decimal,
    pub seller_received: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn split(&self) -> FeeSplit {
        FeeSplit {
            price: self.price,
            platform_fee: self.platform_fee,
            creator_royalty: self.creator_royalty,
            seller_received: self.seller_received,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub buyer_id: UserId,
    pub instance_id: InstanceId,
    pub price: Decimal,
    pub status: OfferStatus,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
    #[default]
    All,
}

// --- Paging ---

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: first_page(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl Page {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    fn size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE) as usize
    }

    fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.size()
    }

    /// Rows arrive in ascending id order; pages are served newest first.
    pub(crate) fn paginate<'a, T, I>(&self, rows: I) -> Paged<T>
    where
        T: Clone + 'a,
        I: DoubleEndedIterator<Item = &'a T>,
    {
        let rows: Vec<&T> = rows.rev().collect();
        let total = rows.len();
        let items = rows
            .into_iter()
            .skip(self.offset())
            .take(self.size())
            .cloned()
            .collect();
        Paged { items, total }
    }
}
