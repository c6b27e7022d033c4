//! Transactional store backed by SQLite.
//!
//! Rows are served from journaled in-memory tables: the first write to a row
//! inside a transaction saves its prior value, so rollback restores exactly
//! the touched rows. Commit writes the touched rows to SQLite in one database
//! transaction and only then drops the journal; a failed write rolls the
//! tables back. Transactions are serialized by one mutex and run as
//! synchronous closures; nothing awaits while the tables are held.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use market_types::{AssetId, InstanceId, ListingId, OfferId, TradeId, UserId, DEFAULT_SCALE};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{
    Account, AssetDefinition, Instance, Listing, Offer, PlatformAccount, PlatformTransaction,
    PointTransaction, Trade,
};
use crate::persistence::Database;
use crate::MarketError;

/// Key-ordered rows plus an undo journal for the open transaction.
#[derive(Debug)]
pub(crate) struct Journaled<K: Ord + Clone, V: Clone> {
    rows: BTreeMap<K, V>,
    undo: BTreeMap<K, Option<V>>,
}

impl<K: Ord + Clone, V: Clone> Default for Journaled<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            undo: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> Journaled<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.rows.values()
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.touch(key);
        self.rows.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.touch(&key);
        self.rows.insert(key, value);
    }

    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.touch(&key);
        self.rows.entry(key).or_default()
    }

    /// Rows written since the last commit, with their current value.
    pub(crate) fn dirty(&self) -> impl Iterator<Item = (K, Option<&V>)> + '_ {
        self.undo
            .keys()
            .map(move |key| (key.clone(), self.rows.get(key)))
    }

    /// Inserts a committed row without journaling it.
    pub(crate) fn load(&mut self, key: K, value: V) {
        self.rows.insert(key, value);
    }

    fn touch(&mut self, key: &K) {
        if !self.undo.contains_key(key) {
            self.undo.insert(key.clone(), self.rows.get(key).cloned());
        }
    }

    fn commit(&mut self) {
        self.undo.clear();
    }

    fn rollback(&mut self) {
        for (key, prior) in std::mem::take(&mut self.undo) {
            match prior {
                Some(value) => {
                    self.rows.insert(key, value);
                }
                None => {
                    self.rows.remove(&key);
                }
            }
        }
    }
}

/// Append-only rows; rollback truncates back to the last commit.
#[derive(Debug)]
pub(crate) struct AppendLog<T> {
    rows: Vec<T>,
    committed: usize,
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            committed: 0,
        }
    }
}

impl<T> AppendLog<T> {
    pub fn push(&mut self, row: T) {
        self.rows.push(row);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub(crate) fn uncommitted(&self) -> &[T] {
        &self.rows[self.committed..]
    }

    pub(crate) fn load(&mut self, row: T) {
        self.rows.push(row);
        self.committed = self.rows.len();
    }

    fn commit(&mut self) {
        self.committed = self.rows.len();
    }

    fn rollback(&mut self) {
        self.rows.truncate(self.committed);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Sequences {
    point_tx: u64,
    platform_tx: u64,
    asset: u64,
    instance: u64,
    listing: u64,
    trade: u64,
    offer: u64,
}

const PLATFORM_ROW: u8 = 1;

/// Every table of the marketplace. Mutated only inside [`Store::transaction`].
#[derive(Debug)]
pub(crate) struct Tables {
    /// Timestamp of the running transaction.
    pub now: DateTime<Utc>,
    /// Fractional digits every ledger amount must fit in.
    pub scale: u32,
    pub accounts: Journaled<UserId, Account>,
    pub point_log: AppendLog<PointTransaction>,
    pub platform: Journaled<u8, PlatformAccount>,
    pub platform_log: AppendLog<PlatformTransaction>,
    pub assets: Journaled<AssetId, AssetDefinition>,
    pub instances: Journaled<InstanceId, Instance>,
    pub listings: Journaled<ListingId, Listing>,
    pub trades: Journaled<TradeId, Trade>,
    pub offers: Journaled<OfferId, Offer>,
    seq: Sequences,
    seq_at_begin: Sequences,
}

impl Tables {
    pub(crate) fn new() -> Self {
        Self {
            now: Utc::now(),
            scale: DEFAULT_SCALE,
            accounts: Journaled::default(),
            point_log: AppendLog::default(),
            platform: Journaled::default(),
            platform_log: AppendLog::default(),
            assets: Journaled::default(),
            instances: Journaled::default(),
            listings: Journaled::default(),
            trades: Journaled::default(),
            offers: Journaled::default(),
            seq: Sequences::default(),
            seq_at_begin: Sequences::default(),
        }
    }

    pub fn platform_account(&self) -> PlatformAccount {
        self.platform.get(&PLATFORM_ROW).cloned().unwrap_or_default()
    }

    pub fn platform_account_mut(&mut self) -> &mut PlatformAccount {
        self.platform.get_or_default(PLATFORM_ROW)
    }

    pub fn next_point_tx_id(&mut self) -> u64 {
        self.seq.point_tx += 1;
        self.seq.point_tx
    }

    pub fn next_platform_tx_id(&mut self) -> u64 {
        self.seq.platform_tx += 1;
        self.seq.platform_tx
    }

    pub fn next_asset_id(&mut self) -> AssetId {
        self.seq.asset += 1;
        self.seq.asset
    }

    pub fn next_instance_id(&mut self) -> InstanceId {
        self.seq.instance += 1;
        self.seq.instance
    }

    pub fn next_listing_id(&mut self) -> ListingId {
        self.seq.listing += 1;
        self.seq.listing
    }

    pub fn next_trade_id(&mut self) -> TradeId {
        self.seq.trade += 1;
        self.seq.trade
    }

    pub fn next_offer_id(&mut self) -> OfferId {
        self.seq.offer += 1;
        self.seq.offer
    }

    pub(crate) fn restore_sequences(&mut self, seq: Sequences) {
        self.seq = seq;
        self.seq_at_begin = seq;
    }

    /// Id counters, when the open transaction allocated any.
    pub(crate) fn changed_sequences(&self) -> Option<Sequences> {
        (self.seq != self.seq_at_begin).then_some(self.seq)
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        self.now = now;
        self.seq_at_begin = self.seq;
    }

    fn commit(&mut self) {
        self.accounts.commit();
        self.point_log.commit();
        self.platform.commit();
        self.platform_log.commit();
        self.assets.commit();
        self.instances.commit();
        self.listings.commit();
        self.trades.commit();
        self.offers.commit();
        self.seq_at_begin = self.seq;
    }

    fn rollback(&mut self) {
        self.accounts.rollback();
        self.point_log.rollback();
        self.platform.rollback();
        self.platform_log.rollback();
        self.assets.rollback();
        self.instances.rollback();
        self.listings.rollback();
        self.trades.rollback();
        self.offers.rollback();
        self.seq = self.seq_at_begin;
    }
}

struct Inner {
    tables: Tables,
    db: Database,
}

pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Opens (creating if needed) the database file and loads every table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarketError> {
        let path = path.as_ref();
        let store = Self::with_database(Database::open(path)?)?;
        info!(path = %path.display(), "Opened market database");
        Ok(store)
    }

    /// A private database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self, MarketError> {
        Self::with_database(Database::open_in_memory()?)
    }

    fn with_database(db: Database) -> Result<Self, MarketError> {
        let tables = db.load()?;
        Ok(Self {
            inner: Mutex::new(Inner { tables, db }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A transaction panicked mid-way; its journal is still open.
                warn!("Store mutex poisoned, rolling back the interrupted transaction");
                let mut guard = poisoned.into_inner();
                guard.tables.rollback();
                self.inner.clear_poison();
                guard
            }
        }
    }

    pub(crate) fn set_scale(&self, scale: u32) {
        self.lock().tables.scale = scale;
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let inner = self.lock();
        f(&inner.tables)
    }

    /// Runs `f` atomically: every write commits together, or none do.
    pub(crate) fn transaction<T>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Tables) -> Result<T, MarketError>,
    ) -> Result<T, MarketError> {
        let mut inner = self.lock();
        let Inner { tables, db } = &mut *inner;
        tables.begin(now);
        let value = match f(&mut *tables) {
            Ok(value) => value,
            Err(e) => {
                tables.rollback();
                return Err(e);
            }
        };
        if let Err(e) = db.persist(&*tables) {
            error!(error = %e, "Failed to persist transaction, rolled back");
            tables.rollback();
            return Err(e);
        }
        tables.commit();
        Ok(value)
    }
}
