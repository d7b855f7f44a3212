//! Link collections.
//!
//! A link collection is a many-to-many relation stored twice, once keyed
//! `(a, b)` and once keyed `(b, a)`, so that both directions can be listed
//! with a single prefix scan. [`RefCountedLinkCollection`] additionally
//! carries a positive count per pair; a pair whose count would reach zero
//! is removed outright, so every stored row has a count of at least one.

use std::collections::BTreeSet;

use edgeguard_store::{StoreError, Table, Tx, WriteTx, pair_key, pair_prefix, split_pair};

use crate::error::EngineError;
use crate::tables::Relation;

// ============================================================================
// LinkCollection
// ============================================================================

/// An uncounted relation, used for policy membership and secondary indexes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkCollection {
    name: &'static str,
    forward: Table<()>,
    reverse: Table<()>,
}

impl LinkCollection {
    pub(crate) const fn new(name: &'static str, forward: Table<()>, reverse: Table<()>) -> Self {
        Self {
            name,
            forward,
            reverse,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Adds the pair. Returns `false` if it was already present.
    pub(crate) fn add<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        a: &str,
        b: &str,
    ) -> Result<bool, StoreError> {
        let key = pair_key(a, b)?;
        if self.forward.contains(tx, &key)? {
            return Ok(false);
        }
        self.forward.put(tx, key, &())?;
        self.reverse.put(tx, pair_key(b, a)?, &())?;
        Ok(true)
    }

    /// Removes the pair. Returns `false` if it was not present.
    pub(crate) fn remove<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        a: &str,
        b: &str,
    ) -> Result<bool, StoreError> {
        let removed = self.forward.delete(tx, &pair_key(a, b)?)?;
        let mirrored = self.reverse.delete(tx, &pair_key(b, a)?)?;
        debug_assert_eq!(removed, mirrored, "{} rows out of sync", self.name);
        Ok(removed)
    }

    pub(crate) fn contains<T: Tx + ?Sized>(
        &self,
        tx: &T,
        a: &str,
        b: &str,
    ) -> Result<bool, StoreError> {
        self.forward.contains(tx, &pair_key(a, b)?)
    }

    /// Every `b` paired with `a`.
    pub(crate) fn list<T: Tx + ?Sized>(&self, tx: &T, a: &str) -> Result<BTreeSet<String>, StoreError> {
        seconds(tx, self.forward, a)
    }

    /// Every `a` paired with `b`.
    pub(crate) fn list_reverse<T: Tx + ?Sized>(
        &self,
        tx: &T,
        b: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        seconds(tx, self.reverse, b)
    }

    /// Removes every pair starting with `a`, returning the removed `b`s.
    pub(crate) fn remove_all<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        a: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        let linked = self.list(tx, a)?;
        for b in &linked {
            self.remove(tx, a, b)?;
        }
        Ok(linked)
    }
}

// ============================================================================
// RefCountedLinkCollection
// ============================================================================

/// A relation whose pairs carry the number of policies contributing them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefCountedLinkCollection {
    relation: Relation,
    forward: Table<u32>,
    reverse: Table<u32>,
}

impl RefCountedLinkCollection {
    pub(crate) const fn new(relation: Relation, forward: Table<u32>, reverse: Table<u32>) -> Self {
        Self {
            relation,
            forward,
            reverse,
        }
    }

    /// Creates the link with a count of one, or bumps its count.
    /// Returns the new count.
    pub(crate) fn increment<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        a: &str,
        b: &str,
    ) -> Result<u32, EngineError> {
        let key = pair_key(a, b)?;
        let count = self.forward.get(tx, &key)?.unwrap_or(0) + 1;
        self.forward.put(tx, key, &count)?;
        self.reverse.put(tx, pair_key(b, a)?, &count)?;

        // Postcondition: the link is present
        debug_assert!(count > 0);
        Ok(count)
    }

    /// Lowers the link's count, removing the link when it reaches zero.
    /// Returns the new count.
    ///
    /// Decrementing an absent link is an invariant violation: it means a
    /// policy is withdrawing a contribution it never made.
    pub(crate) fn decrement<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        a: &str,
        b: &str,
    ) -> Result<u32, EngineError> {
        let key = pair_key(a, b)?;
        let Some(current) = self.forward.get(tx, &key)?.filter(|count| *count > 0) else {
            return Err(EngineError::LinkUnderflow {
                relation: self.relation,
                a: a.to_string(),
                b: b.to_string(),
            }
            .logged());
        };

        let count = current - 1;
        let mirror = pair_key(b, a)?;
        if count == 0 {
            self.forward.delete(tx, &key)?;
            self.reverse.delete(tx, &mirror)?;
        } else {
            self.forward.put(tx, key, &count)?;
            self.reverse.put(tx, mirror, &count)?;
        }
        Ok(count)
    }

    /// `None` when the pair is not linked.
    pub(crate) fn link_count<T: Tx + ?Sized>(
        &self,
        tx: &T,
        a: &str,
        b: &str,
    ) -> Result<Option<u32>, StoreError> {
        self.forward.get(tx, &pair_key(a, b)?)
    }

    /// Every `b` linked to `a`.
    pub(crate) fn list_linked<T: Tx + ?Sized>(
        &self,
        tx: &T,
        a: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        seconds(tx, self.forward, a)
    }

    /// Every `a` linked to `b`.
    pub(crate) fn list_linked_reverse<T: Tx + ?Sized>(
        &self,
        tx: &T,
        b: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        seconds(tx, self.reverse, b)
    }

    /// Every `(a, b, count)` in key order.
    pub(crate) fn entries<T: Tx + ?Sized>(&self, tx: &T) -> Result<Vec<(String, String, u32)>, StoreError> {
        self.forward
            .scan_all(tx)?
            .into_iter()
            .map(|(key, count)| {
                let (a, b) = split_pair(self.forward.name(), &key)?;
                Ok((a, b, count))
            })
            .collect()
    }

    /// The count stored on the reverse row, for mirror checks.
    pub(crate) fn reverse_count<T: Tx + ?Sized>(
        &self,
        tx: &T,
        a: &str,
        b: &str,
    ) -> Result<Option<u32>, StoreError> {
        self.reverse.get(tx, &pair_key(b, a)?)
    }

    /// Number of reverse rows, for mirror checks.
    pub(crate) fn reverse_len<T: Tx + ?Sized>(&self, tx: &T) -> Result<usize, StoreError> {
        Ok(tx.scan_prefix(self.reverse.name(), &[])?.len())
    }
}

/// The second components of every pair in `table` whose first is `first`.
fn seconds<T, V>(tx: &T, table: Table<V>, first: &str) -> Result<BTreeSet<String>, StoreError>
where
    T: Tx + ?Sized,
    V: serde::Serialize + serde::de::DeserializeOwned,
{
    let prefix = pair_prefix(first)?;
    tx.scan_prefix(table.name(), &prefix)?
        .into_iter()
        .map(|(key, _)| split_pair(table.name(), &key).map(|(_, second)| second))
        .collect()
}
