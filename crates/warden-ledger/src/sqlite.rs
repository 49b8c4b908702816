//! SQLite-backed ledger.
//!
//! One `records(key, body)` table. WAL mode, and every [`LedgerStore::transact`]
//! call is a `BEGIN IMMEDIATE` transaction so the write lock is taken before
//! the first read.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::{migrations, LedgerError, LedgerStore, LedgerTxn, RecordKey, Result};

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened ledger database");
        Self::with_connection(conn)
    }

    /// Open an in-memory ledger (for testing).
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

struct SqliteTxn<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl LedgerTxn for SqliteTxn<'_> {
    fn get(&mut self, key: &RecordKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tx
            .query_row(
                "SELECT body FROM records WHERE key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put(&mut self, key: &RecordKey, value: Vec<u8>) -> Result<()> {
        self.tx.execute(
            "INSERT INTO records (key, body) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = unixepoch()",
            rusqlite::params![key.as_str(), value],
        )?;
        Ok(())
    }

    fn scan_prefix(&mut self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut stmt = self.tx.prepare(
            "SELECT key, body FROM records
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let rows = stmt.query_map([prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl LedgerStore for SqliteLedger {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> std::result::Result<T, E>,
        E: From<LedgerError>,
    {
        let mut conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(LedgerError::from)?;

        let out = f(&mut SqliteTxn { tx: &tx })?;

        tx.commit().map_err(LedgerError::from)?;
        Ok(out)
    }
}
