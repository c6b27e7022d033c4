//! SQLite durability for the store.
//!
//! Each table keeps one row per entity keyed by id with the entity as a JSON
//! payload. A store commit writes every row touched by the transaction plus
//! the new audit rows inside one SQLite transaction; opening the database
//! loads everything back into memory.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::store::{AppendLog, Journaled, Sequences, Tables};
use crate::MarketError;

impl From<rusqlite::Error> for MarketError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(format!("sqlite: {err}"))
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("row encoding: {err}"))
    }
}

const ACCOUNTS: &str = "accounts";
const POINT_TRANSACTIONS: &str = "point_transactions";
const PLATFORM_ACCOUNT: &str = "platform_account";
const PLATFORM_TRANSACTIONS: &str = "platform_transactions";
const ASSETS: &str = "assets";
const INSTANCES: &str = "instances";
const LISTINGS: &str = "listings";
const TRADES: &str = "trades";
const OFFERS: &str = "offers";

const ENTITY_TABLES: [&str; 9] = [
    ACCOUNTS,
    POINT_TRANSACTIONS,
    PLATFORM_ACCOUNT,
    PLATFORM_TRANSACTIONS,
    ASSETS,
    INSTANCES,
    LISTINGS,
    TRADES,
    OFFERS,
];

const SEQUENCES_KEY: &str = "sequences";

#[derive(Debug)]
pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarketError> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.configure()?;
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, MarketError> {
        let mut db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    fn configure(&mut self) -> Result<(), MarketError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), MarketError> {
        for table in ENTITY_TABLES {
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    payload_json TEXT NOT NULL
                );"
            ))?;
        }
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Reads every table into a fresh [`Tables`].
    pub fn load(&self) -> Result<Tables, MarketError> {
        let mut tables = Tables::new();
        load_rows(&self.conn, ACCOUNTS, &mut tables.accounts)?;
        load_log(&self.conn, POINT_TRANSACTIONS, &mut tables.point_log)?;
        load_rows(&self.conn, PLATFORM_ACCOUNT, &mut tables.platform)?;
        load_log(&self.conn, PLATFORM_TRANSACTIONS, &mut tables.platform_log)?;
        load_rows(&self.conn, ASSETS, &mut tables.assets)?;
        load_rows(&self.conn, INSTANCES, &mut tables.instances)?;
        load_rows(&self.conn, LISTINGS, &mut tables.listings)?;
        load_rows(&self.conn, TRADES, &mut tables.trades)?;
        load_rows(&self.conn, OFFERS, &mut tables.offers)?;

        let sequences: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM meta WHERE key = ?1",
                params![SEQUENCES_KEY],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(raw) = sequences {
            tables.restore_sequences(serde_json::from_str::<Sequences>(&raw)?);
        }
        Ok(tables)
    }

    /// Writes the open transaction's changes. Nothing is written on error.
    pub fn persist(&mut self, tables: &Tables) -> Result<(), MarketError> {
        let tx = self.conn.transaction()?;

        let mut written = 0;
        written += upsert_rows(&tx, ACCOUNTS, &tables.accounts)?;
        written += append_rows(&tx, POINT_TRANSACTIONS, &tables.point_log, |row| row.id)?;
        written += upsert_rows(&tx, PLATFORM_ACCOUNT, &tables.platform)?;
        written += append_rows(&tx, PLATFORM_TRANSACTIONS, &tables.platform_log, |row| row.id)?;
        written += upsert_rows(&tx, ASSETS, &tables.assets)?;
        written += upsert_rows(&tx, INSTANCES, &tables.instances)?;
        written += upsert_rows(&tx, LISTINGS, &tables.listings)?;
        written += upsert_rows(&tx, TRADES, &tables.trades)?;
        written += upsert_rows(&tx, OFFERS, &tables.offers)?;

        if let Some(sequences) = tables.changed_sequences() {
            tx.execute(
                "INSERT INTO meta (key, value_json) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
                params![SEQUENCES_KEY, serde_json::to_string(&sequences)?],
            )?;
        }

        tx.commit()?;
        if written > 0 {
            debug!(rows = written, "Persisted transaction");
        }
        Ok(())
    }
}

fn sql_id(id: u64) -> Result<i64, MarketError> {
    i64::try_from(id).map_err(|_| MarketError::Storage(format!("id {id} exceeds the sqlite range")))
}

fn upsert_rows<K, V>(
    tx: &Transaction<'_>,
    table: &str,
    rows: &Journaled<K, V>,
) -> Result<usize, MarketError>
where
    K: Ord + Copy + Into<u64>,
    V: Clone + Serialize,
{
    let mut written = 0;
    for (key, row) in rows.dirty() {
        let id = sql_id(key.into())?;
        match row {
            Some(value) => {
                let mut stmt = tx.prepare_cached(&format!(
                    "INSERT INTO {table} (id, payload_json) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET payload_json = excluded.payload_json"
                ))?;
                stmt.execute(params![id, serde_json::to_string(value)?])?;
            }
            None => {
                let mut stmt = tx.prepare_cached(&format!("DELETE FROM {table} WHERE id = ?1"))?;
                stmt.execute(params![id])?;
            }
        }
        written += 1;
    }
    Ok(written)
}

fn append_rows<T: Serialize>(
    tx: &Transaction<'_>,
    table: &str,
    log: &AppendLog<T>,
    id: impl Fn(&T) -> u64,
) -> Result<usize, MarketError> {
    let pending = log.uncommitted();
    for row in pending {
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {table} (id, payload_json) VALUES (?1, ?2)"
        ))?;
        stmt.execute(params![sql_id(id(row))?, serde_json::to_string(row)?])?;
    }
    Ok(pending.len())
}

fn load_payloads(conn: &Connection, table: &str) -> Result<Vec<(u64, String)>, MarketError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, payload_json FROM {table} ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut payloads = Vec::new();
    for row in rows {
        let (id, payload) = row?;
        let id = u64::try_from(id)
            .map_err(|_| MarketError::Storage(format!("{table} holds negative id {id}")))?;
        payloads.push((id, payload));
    }
    Ok(payloads)
}

fn load_rows<K, V>(
    conn: &Connection,
    table: &str,
    rows: &mut Journaled<K, V>,
) -> Result<(), MarketError>
where
    K: Ord + Clone + TryFrom<u64>,
    V: Clone + DeserializeOwned,
{
    for (id, payload) in load_payloads(conn, table)? {
        let key = K::try_from(id)
            .ok()
            .ok_or_else(|| MarketError::Storage(format!("{table} holds out-of-range id {id}")))?;
        rows.load(key, serde_json::from_str(&payload)?);
    }
    Ok(())
}

fn load_log<T: DeserializeOwned>(
    conn: &Connection,
    table: &str,
    log: &mut AppendLog<T>,
) -> Result<(), MarketError> {
    for (_, payload) in load_payloads(conn, table)? {
        log.load(serde_json::from_str(&payload)?);
    }
    Ok(())
}
