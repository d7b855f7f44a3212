//! Typed tables.
//!
//! A [`Table`] binds a table name to a value type and encodes values with
//! `postcard`. It holds no data itself; every operation runs against a
//! transaction.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{StoreError, Tx, WriteTx};

/// A named table whose values are of type `V`.
pub struct Table<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Table<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Table<V> {}

impl<V> std::fmt::Debug for Table<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Table").field(&self.name).finish()
    }
}

impl<V> Table<V>
where
    V: Serialize + DeserializeOwned,
{
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<T: Tx + ?Sized>(&self, tx: &T, key: &[u8]) -> Result<Option<V>, StoreError> {
        tx.get(self.name, key)?
            .map(|raw| self.decode(&raw))
            .transpose()
    }

    pub fn contains<T: Tx + ?Sized>(&self, tx: &T, key: &[u8]) -> Result<bool, StoreError> {
        Ok(tx.get(self.name, key)?.is_some())
    }

    pub fn put<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        key: impl Into<Bytes>,
        value: &V,
    ) -> Result<(), StoreError> {
        let raw = postcard::to_allocvec(value).map_err(|source| StoreError::Codec {
            table: self.name,
            source,
        })?;
        tx.put(self.name, key.into(), Bytes::from(raw))
    }

    pub fn delete<T: WriteTx + ?Sized>(&self, tx: &mut T, key: &[u8]) -> Result<bool, StoreError> {
        tx.delete(self.name, key)
    }

    /// Returns every `(key, value)` whose key starts with `prefix`.
    pub fn scan_prefix<T: Tx + ?Sized>(
        &self,
        tx: &T,
        prefix: &[u8],
    ) -> Result<Vec<(Bytes, V)>, StoreError> {
        tx.scan_prefix(self.name, prefix)?
            .into_iter()
            .map(|(k, raw)| Ok((k, self.decode(&raw)?)))
            .collect()
    }

    /// Returns every entry in the table.
    pub fn scan_all<T: Tx + ?Sized>(&self, tx: &T) -> Result<Vec<(Bytes, V)>, StoreError> {
        self.scan_prefix(tx, &[])
    }

    fn decode(&self, raw: &[u8]) -> Result<V, StoreError> {
        postcard::from_bytes(raw).map_err(|source| StoreError::Codec {
            table: self.name,
            source,
        })
    }
}
