//! Engine errors.

use edgeguard_abac::SelectorError;
use edgeguard_store::StoreError;
use edgeguard_types::{EntityKind, PolicyKind};

use crate::tables::Relation;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was malformed or conflicts with existing data.
    Validation,
    /// The stored relationships disagree with themselves. Indicates a bug.
    Invariant,
    /// A record would be left pointing at something that no longer exists.
    Referential,
    /// The underlying store failed.
    Store,
}

/// Errors returned by engine mutations and queries.
///
/// Any error returned from inside a [`Mutation`](crate::Mutation) leaves
/// the store in its pre-transaction state once the mutation is dropped.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    // Validation
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("{kind} name '{name}' is already used by '{existing}'")]
    DuplicateName {
        kind: &'static str,
        name: String,
        existing: String,
    },

    #[error("{kind} field '{field}' must not be empty")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind} field '{field}' is {len} bytes, longer than the {max} byte limit")]
    FieldTooLong {
        kind: &'static str,
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("role selector references unknown {kind} '{id}'")]
    UnknownReference { kind: EntityKind, id: String },

    #[error("config '{id}' does not hold valid JSON: {source}")]
    InvalidConfigData {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("identity '{identity}' may not {access} service '{service}'")]
    AccessDenied {
        identity: String,
        service: String,
        access: &'static str,
    },

    // Invariant
    #[error("link count underflow in {relation} for ('{a}', '{b}')")]
    LinkUnderflow {
        relation: Relation,
        a: String,
        b: String,
    },

    #[error("{kind} '{policy}' membership of '{entity}' is {recorded} but selector evaluated {expected}")]
    MembershipMismatch {
        kind: PolicyKind,
        policy: String,
        entity: String,
        recorded: bool,
        expected: bool,
    },

    #[error("{kind} '{id}' is indexed but has no record")]
    MissingPolicy { kind: PolicyKind, id: String },

    #[error("mutation aborted after an earlier failure: {cause}")]
    Aborted { cause: String },

    // Referential
    #[error("{kind} '{id}' is still referenced from {table}")]
    DanglingReference {
        kind: &'static str,
        id: String,
        table: &'static str,
    },

    // Store
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Selector(_)
            | Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::DuplicateName { .. }
            | Self::MissingField { .. }
            | Self::FieldTooLong { .. }
            | Self::UnknownReference { .. }
            | Self::InvalidConfigData { .. }
            | Self::AccessDenied { .. } => ErrorKind::Validation,
            Self::LinkUnderflow { .. }
            | Self::MembershipMismatch { .. }
            | Self::MissingPolicy { .. }
            | Self::Aborted { .. } => ErrorKind::Invariant,
            Self::DanglingReference { .. } => ErrorKind::Referential,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// The engine never retries; neither should callers for engine-level
    /// failures. Store failures are surfaced unchanged for the caller's own
    /// retry policy.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Logs invariant and referential failures at error level and returns
    /// `self`, for use at the point of detection.
    pub(crate) fn logged(self) -> Self {
        if matches!(self.kind(), ErrorKind::Invariant | ErrorKind::Referential) {
            tracing::error!(error = %self, kind = ?self.kind(), "relationship invariant violated");
        }
        self
    }
}
