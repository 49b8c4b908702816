//! In-memory ledger.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{LedgerError, LedgerStore, LedgerTxn, RecordKey, Result};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.records.lock().map_err(|_| LedgerError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

struct MemoryTxn<'a> {
    base: &'a BTreeMap<String, Vec<u8>>,
    staged: BTreeMap<String, Vec<u8>>,
}

impl LedgerTxn for MemoryTxn<'_> {
    fn get(&mut self, key: &RecordKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .staged
            .get(key.as_str())
            .or_else(|| self.base.get(key.as_str()))
            .cloned())
    }

    fn put(&mut self, key: &RecordKey, value: Vec<u8>) -> Result<()> {
        self.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn scan_prefix(&mut self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut merged: BTreeMap<&String, &Vec<u8>> = self
            .base
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .collect();
        for (k, v) in self
            .staged
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            merged.insert(k, v);
        }
        Ok(merged
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl LedgerStore for MemoryLedger {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> std::result::Result<T, E>,
        E: From<LedgerError>,
    {
        let mut records = self.records.lock().map_err(|_| LedgerError::Poisoned)?;

        let mut txn = MemoryTxn {
            base: &records,
            staged: BTreeMap::new(),
        };
        let out = f(&mut txn)?;
        let staged = txn.staged;

        records.extend(staged);
        Ok(out)
    }
}
