//! Ordered key-value store over redb
//!
//! [`OrderedStore`] wraps a single redb database file. Collections are
//! byte-keyed tables ordered by key bytes and created on first write. Each
//! collection may also allocate strictly increasing sequence numbers, which
//! are persisted in the same file so they survive restarts.

use std::ops::ControlFlow;
use std::path::PathBuf;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;

// Key: collection name, Value: last sequence number handed out
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("__sequences");

/// A named, byte-ordered collection inside the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    name: &'static str,
}

impl Collection {
    /// Declare a collection by name
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// The collection name as stored in the database
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn definition(&self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        TableDefinition::new(self.name)
    }
}

/// Scan direction for [`ReadTx::scan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest key first
    Forward,
    /// Greatest key first
    Backward,
}

/// Configuration for the ordered store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("history.db"),
        }
    }
}

/// Transactional, ordered key-value store
///
/// Writers are serialized by redb; readers see a consistent snapshot and
/// are never blocked by a concurrent writer. The handle is `Send + Sync`
/// and meant to be shared behind an `Arc`.
pub struct OrderedStore {
    db: Database,
}

impl OrderedStore {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&config.db_path)?;
        info!("Opened history database");

        Ok(Self { db })
    }

    /// Run `f` inside a single write transaction
    ///
    /// The transaction commits when `f` returns `Ok` and is aborted when it
    /// returns `Err`, leaving no partial effect behind.
    pub fn update<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut WriteTx) -> Result<T, StoreError>,
    {
        let mut tx = WriteTx {
            txn: self.db.begin_write()?,
        };

        match f(&mut tx) {
            Ok(value) => {
                tx.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.txn.abort() {
                    warn!(error = %abort_err, "Failed to abort write transaction");
                }
                debug!(error = %err, "Write transaction aborted");
                Err(err)
            }
        }
    }

    /// Open a read transaction over the current snapshot
    pub fn begin_read(&self) -> Result<ReadTx, StoreError> {
        Ok(ReadTx {
            txn: self.db.begin_read()?,
        })
    }
}

/// An open write transaction, see [`OrderedStore::update`]
pub struct WriteTx {
    txn: WriteTransaction,
}

impl WriteTx {
    /// Insert or replace a key
    pub fn put(&mut self, collection: Collection, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut table = self.txn.open_table(collection.definition())?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Read a key as seen by this transaction
    pub fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let table = self.txn.open_table(collection.definition())?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Greatest key currently in the collection
    pub fn last_key(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError> {
        let table = self.txn.open_table(collection.definition())?;
        let key = table.last()?.map(|(k, _)| k.value().to_vec());
        Ok(key)
    }

    /// Allocate the next sequence number for a collection
    ///
    /// The first value handed out is 1. Values are never reused, including
    /// after the database is reopened.
    pub fn next_sequence(&mut self, collection: Collection) -> Result<u64, StoreError> {
        let mut table = self.txn.open_table(SEQUENCES)?;
        let current = table.get(collection.name())?.map(|v| v.value()).unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::corrupt("__sequences", "sequence exhausted"))?;
        table.insert(collection.name(), next)?;
        Ok(next)
    }
}

/// An open read transaction
pub struct ReadTx {
    txn: ReadTransaction,
}

impl ReadTx {
    /// Read a key from the snapshot
    pub fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let table = match self.txn.open_table(collection.definition()) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Walk a collection in key order, or in reverse
    ///
    /// `visit` receives each `(key, value)` pair and stops the walk by
    /// returning `ControlFlow::Break`. A collection that has never been
    /// written scans as empty.
    pub fn scan<F>(&self, collection: Collection, direction: Direction, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    {
        let table = match self.txn.open_table(collection.definition()) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = table.iter()?;
        loop {
            let next = match direction {
                Direction::Forward => entries.next(),
                Direction::Backward => entries.next_back(),
            };
            let Some(entry) = next else {
                break;
            };
            let (key, value) = entry?;
            if visit(key.value(), value.value()).is_break() {
                break;
            }
        }

        Ok(())
    }
}
