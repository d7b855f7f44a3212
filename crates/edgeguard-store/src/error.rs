//! Store error types.

/// Errors raised by the store.
///
/// The store performs no retries; every error is surfaced to the caller
/// unchanged.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A value could not be encoded or decoded.
    #[error("codec error in table '{table}': {source}")]
    Codec {
        table: &'static str,
        #[source]
        source: postcard::Error,
    },

    /// A composite key did not have the expected layout.
    #[error("malformed key in table '{table}'")]
    MalformedKey { table: String },

    /// A composite key component exceeds the encodable length.
    #[error("key component too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    /// A lock protecting committed state was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Poisoned,
}
