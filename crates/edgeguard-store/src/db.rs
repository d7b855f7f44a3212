//! Database handle and transactions.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use bytes::Bytes;

use crate::{StoreError, Tx, WriteTx};

type TableMap = BTreeMap<Bytes, Bytes>;

// ============================================================================
// Version
// ============================================================================

/// Monotonic counter identifying a committed state of the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u64);

impl Version {
    pub const INITIAL: Version = Version(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// An immutable committed state. Tables are shared between snapshots and
/// cloned only when a commit modifies them.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    version: Version,
    tables: BTreeMap<String, Arc<TableMap>>,
}

impl Snapshot {
    fn get(&self, table: &str, key: &[u8]) -> Option<Bytes> {
        self.tables.get(table).and_then(|t| t.get(key)).cloned()
    }

    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Vec<(Bytes, Bytes)> {
        match self.tables.get(table) {
            Some(t) => prefix_range(t, prefix)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        }
    }
}

fn prefix_range<'a, V>(
    map: &'a BTreeMap<Bytes, V>,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a Bytes, &'a V)> + 'a {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(k, _)| k.starts_with(prefix))
}

// ============================================================================
// Db
// ============================================================================

struct DbInner {
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

/// Handle to an in-memory transactional database.
///
/// `Db` is cheap to clone; clones share the same committed state.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DbInner {
                committed: RwLock::new(Arc::new(Snapshot::default())),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Returns the latest committed version.
    pub fn version(&self) -> Result<Version, StoreError> {
        Ok(self.current()?.version)
    }

    /// Begins a read transaction over the latest committed snapshot.
    pub fn begin_read(&self) -> Result<ReadTxn, StoreError> {
        Ok(ReadTxn {
            snapshot: self.current()?,
        })
    }

    /// Begins a write transaction, blocking until no other writer is active.
    pub fn begin_write(&self) -> Result<WriteTxn<'_>, StoreError> {
        let guard = self.inner.writer.lock().map_err(|_| StoreError::Poisoned)?;
        // Taken after the writer lock so the base is the newest commit.
        let base = self.current()?;
        tracing::trace!(version = %base.version, "write transaction started");
        Ok(WriteTxn {
            inner: &self.inner,
            _guard: guard,
            base,
            pending: BTreeMap::new(),
        })
    }

    /// Runs `f` in a read transaction.
    pub fn view<T, E>(&self, f: impl FnOnce(&ReadTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Runs `f` in a write transaction, committing if it returns `Ok` and
    /// rolling back otherwise.
    pub fn update<T, E>(&self, f: impl FnOnce(&mut WriteTxn<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut tx = self.begin_write()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    fn current(&self) -> Result<Arc<Snapshot>, StoreError> {
        self.inner
            .committed
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| StoreError::Poisoned)
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

// ============================================================================
// ReadTxn
// ============================================================================

/// A read-only view of one committed snapshot.
pub struct ReadTxn {
    snapshot: Arc<Snapshot>,
}

impl fmt::Debug for ReadTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTxn")
            .field("version", &self.snapshot.version)
            .finish_non_exhaustive()
    }
}

impl Tx for ReadTxn {
    fn version(&self) -> Version {
        self.snapshot.version
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self.snapshot.get(table, key))
    }

    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        Ok(self.snapshot.scan_prefix(table, prefix))
    }
}

// ============================================================================
// WriteTxn
// ============================================================================

/// The single active write transaction.
///
/// Writes are buffered in an overlay (`None` marks a deletion) and applied
/// to a new snapshot on commit. Dropping the transaction without committing
/// discards every write.
pub struct WriteTxn<'db> {
    inner: &'db DbInner,
    _guard: MutexGuard<'db, ()>,
    base: Arc<Snapshot>,
    pending: BTreeMap<String, BTreeMap<Bytes, Option<Bytes>>>,
}

impl WriteTxn<'_> {
    /// Publishes every buffered write atomically and returns the new version.
    pub fn commit(self) -> Result<Version, StoreError> {
        let mut next = (*self.base).clone();
        next.version = self.base.version.next();

        let mut writes = 0usize;
        for (table, entries) in self.pending {
            let target = Arc::make_mut(next.tables.entry(table).or_default());
            for (key, value) in entries {
                writes += 1;
                match value {
                    Some(value) => {
                        target.insert(key, value);
                    }
                    None => {
                        target.remove(&key);
                    }
                }
            }
        }
        next.tables.retain(|_, t| !t.is_empty());

        let version = next.version;
        let mut committed = self
            .inner
            .committed
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        *committed = Arc::new(next);
        drop(committed);

        tracing::trace!(%version, writes, "write transaction committed");
        Ok(version)
    }

    /// Discards every buffered write.
    pub fn rollback(self) {
        tracing::trace!(version = %self.base.version, "write transaction rolled back");
    }

    /// Returns `true` if the transaction has buffered any write.
    pub fn is_dirty(&self) -> bool {
        self.pending.values().any(|t| !t.is_empty())
    }
}

impl Tx for WriteTxn<'_> {
    fn version(&self) -> Version {
        self.base.version
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        if let Some(pending) = self.pending.get(table).and_then(|t| t.get(key)) {
            return Ok(pending.clone());
        }
        Ok(self.base.get(table, key))
    }

    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        let Some(pending) = self.pending.get(table) else {
            return Ok(self.base.scan_prefix(table, prefix));
        };

        let mut merged: BTreeMap<Bytes, Option<Bytes>> = self
            .base
            .scan_prefix(table, prefix)
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();
        for (k, v) in prefix_range(pending, prefix) {
            merged.insert(k.clone(), v.clone());
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}

impl WriteTx for WriteTxn<'_> {
    fn put(&mut self, table: &str, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        self.pending
            .entry(table.to_string())
            .or_default()
            .insert(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        let existed = self.get(table, key)?.is_some();
        if !existed {
            return Ok(false);
        }

        if self.base.get(table, key).is_some() {
            self.pending
                .entry(table.to_string())
                .or_default()
                .insert(Bytes::copy_from_slice(key), None);
        } else if let Some(t) = self.pending.get_mut(table) {
            // Written and deleted within this transaction.
            t.remove(key);
        }
        Ok(true)
    }
}
