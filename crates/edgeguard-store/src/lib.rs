//! # edgeguard-store: Transactional key-value store
//!
//! A single-writer, multi-reader store organised as named tables of ordered
//! byte keys. It provides the transactional guarantees the relationship
//! engine is built on:
//!
//! - **Snapshot reads**: a [`ReadTxn`] observes the last committed version
//!   for its whole lifetime, never another transaction's in-flight writes.
//! - **Read-your-writes**: a [`WriteTxn`] sees its own uncommitted writes,
//!   including deletions, in point reads and prefix scans.
//! - **Serialized writers**: at most one [`WriteTxn`] exists at a time.
//! - **Atomic commit**: a write transaction's changes become visible all at
//!   once on [`WriteTxn::commit`], or not at all (rollback or drop).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  begin_read   ┌──────────────────────────┐
//! │     Db       │──────────────▶│ ReadTxn (Arc<Snapshot>)  │
//! │              │               └──────────────────────────┘
//! │ RwLock<Arc<  │  begin_write  ┌──────────────────────────┐
//! │   Snapshot>> │──────────────▶│ WriteTxn                 │
//! │ Mutex<()>    │               │  base: Arc<Snapshot>     │
//! └──────────────┘◀──────────────│  pending: overlay writes │
//!                     commit     └──────────────────────────┘
//! ```
//!
//! Tables are copy-on-write: a commit clones only the tables it touched.
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use edgeguard_store::{Db, Tx, WriteTx};
//!
//! let db = Db::new();
//! let mut tx = db.begin_write().unwrap();
//! tx.put("services", Bytes::from_static(b"s1"), Bytes::from_static(b"web")).unwrap();
//! assert!(tx.get("services", b"s1").unwrap().is_some());
//! tx.commit().unwrap();
//!
//! let read = db.begin_read().unwrap();
//! assert_eq!(read.get("services", b"s1").unwrap(), Some(Bytes::from_static(b"web")));
//! ```

mod db;
mod error;
mod key;
mod table;


pub use db::{Db, ReadTxn, Version, WriteTxn};
pub use error::StoreError;
pub use key::{MAX_KEY_COMPONENT_LEN, pair_key, pair_prefix, split_pair};
pub use table::Table;

use bytes::Bytes;

/// Read access shared by read and write transactions.
pub trait Tx {
    /// Returns the committed version this transaction started from.
    fn version(&self) -> Version;

    /// Point lookup.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Returns every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError>;
}

/// Write access, available only inside a [`WriteTxn`].
pub trait WriteTx: Tx {
    /// Inserts or replaces a value.
    fn put(&mut self, table: &str, key: Bytes, value: Bytes) -> Result<(), StoreError>;

    /// Removes a key. Returns `true` if the key was visible before removal.
    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StoreError>;
}
