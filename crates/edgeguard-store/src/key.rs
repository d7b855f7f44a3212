//! Composite key encoding.
//!
//! Relation tables key their rows by an ordered pair of identifiers. The
//! first component is length-prefixed so that all rows sharing it form a
//! contiguous, prefix-scannable range and no pair can alias another.
//!
//! ```text
//! [len(a):u16 BE][a bytes][b bytes]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::StoreError;

/// Longest encodable component of a pair key, in bytes.
pub const MAX_KEY_COMPONENT_LEN: usize = u16::MAX as usize;

/// Encodes the key for the pair `(a, b)`.
pub fn pair_key(a: &str, b: &str) -> Result<Bytes, StoreError> {
    let mut buf = BytesMut::with_capacity(2 + a.len() + b.len());
    put_prefix(&mut buf, a)?;
    buf.put_slice(b.as_bytes());
    Ok(buf.freeze())
}

/// Encodes the prefix shared by every pair whose first component is `a`.
pub fn pair_prefix(a: &str) -> Result<Bytes, StoreError> {
    let mut buf = BytesMut::with_capacity(2 + a.len());
    put_prefix(&mut buf, a)?;
    Ok(buf.freeze())
}

/// Decodes a key produced by [`pair_key`].
pub fn split_pair(table: &str, key: &[u8]) -> Result<(String, String), StoreError> {
    let malformed = || StoreError::MalformedKey {
        table: table.to_string(),
    };

    let len_bytes: [u8; 2] = key
        .get(..2)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(malformed)?;
    let len = usize::from(u16::from_be_bytes(len_bytes));
    let rest = &key[2..];
    if rest.len() < len {
        return Err(malformed());
    }

    let a = std::str::from_utf8(&rest[..len]).map_err(|_| malformed())?;
    let b = std::str::from_utf8(&rest[len..]).map_err(|_| malformed())?;
    Ok((a.to_string(), b.to_string()))
}

fn put_prefix(buf: &mut BytesMut, a: &str) -> Result<(), StoreError> {
    let len = u16::try_from(a.len()).map_err(|_| StoreError::KeyTooLong {
        len: a.len(),
        max: MAX_KEY_COMPONENT_LEN,
    })?;
    buf.put_u16(len);
    buf.put_slice(a.as_bytes());
    Ok(())
}
