//! # warden-ledger
//!
//! Transactional key/value ledger for Warden records.
//!
//! Every mutation of a recovery config, recovery request or emergency access
//! record runs inside [`LedgerStore::transact`]: the closure sees a consistent
//! snapshot, its writes are staged, and they become visible together when the
//! closure returns `Ok`. Returning `Err` discards every staged write.
//!
//! ## Backends
//!
//! - [`memory::MemoryLedger`] — mutex-guarded map, used in tests and embedding
//! - [`sqlite::SqliteLedger`] — SQLite in WAL mode, `BEGIN IMMEDIATE` per transaction
//!
//! Values are opaque bytes; [`load`], [`store`] and [`scan`] wrap them in the
//! versioned record envelope from `warden_types::schema`.

pub mod keys;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use keys::RecordKey;

use warden_types::schema::{self, SchemaError, Versioned};
use warden_types::ErrorKind;

/// Ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("record {key}: {source}")]
    Schema {
        key: String,
        #[source]
        source: SchemaError,
    },

    #[error("ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Operations available inside a transaction.
pub trait LedgerTxn {
    /// Read a value, seeing this transaction's own staged writes.
    fn get(&mut self, key: &RecordKey) -> Result<Option<Vec<u8>>>;

    /// Stage a write.
    fn put(&mut self, key: &RecordKey, value: Vec<u8>) -> Result<()>;

    /// Every `(key, value)` whose key starts with `prefix`, in key order.
    fn scan_prefix(&mut self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// A ledger that runs closures atomically.
pub trait LedgerStore: Send + Sync {
    /// Run `f` as one all-or-nothing transaction.
    ///
    /// Transactions are serialized: no two closures observe each other's
    /// partial state.
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> std::result::Result<T, E>,
        E: From<LedgerError>;
}

/// Read and decode a record.
pub fn load<T: Versioned>(txn: &mut dyn LedgerTxn, key: &RecordKey) -> Result<Option<T>> {
    match txn.get(key)? {
        Some(bytes) => schema::decode(&bytes)
            .map(Some)
            .map_err(|source| LedgerError::Schema {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and stage a record.
pub fn store<T: Versioned>(txn: &mut dyn LedgerTxn, key: &RecordKey, record: &T) -> Result<()> {
    let bytes = schema::encode(record).map_err(|source| LedgerError::Schema {
        key: key.to_string(),
        source,
    })?;
    txn.put(key, bytes)
}

/// Decode every record under `prefix`.
pub fn scan<T: Versioned>(txn: &mut dyn LedgerTxn, prefix: &str) -> Result<Vec<(String, T)>> {
    txn.scan_prefix(prefix)?
        .into_iter()
        .map(|(key, bytes)| match schema::decode(&bytes) {
            Ok(record) => Ok((key, record)),
            Err(source) => Err(LedgerError::Schema { key, source }),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde::{Deserialize, Serialize};
    use warden_types::schema::{RecordKind, Versioned};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    pub struct Counter {
        pub value: u64,
    }

    impl Versioned for Counter {
        const KIND: RecordKind = RecordKind::RecoveryConfig;
        const VERSION: u16 = 1;
    }
}
