//! # edgeguard: Attribute-based relationship engine
//!
//! Edgeguard maintains the derived relationships of a zero-trust network:
//! which identities may dial or bind which services, and through which edge
//! routers. Policies select their participants by role attribute; the engine
//! keeps the resulting many-to-many links materialized and reference counted,
//! and updates them incrementally inside the same transaction as the change
//! that caused them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Engine                                                       │
//! │   write() ──▶ Mutation ──┬─▶ lifecycle (create/update/delete) │
//! │                          │        │                           │
//! │                          │        ▼                           │
//! │                          │   Propagator ──▶ RoleSelector      │
//! │                          │        │         (edgeguard-abac)  │
//! │                          │        ▼                           │
//! │                          │   membership + ref-counted links   │
//! │                          └─▶ commit ──▶ ServiceCacheNotifier  │
//! │   read()  ──▶ Snapshot ──▶ Queries (link-count lookups)       │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 ▼
//!                  edgeguard-store (single writer, snapshots)
//! ```
//!
//! ## Relations
//!
//! | Relation                  | Pair                     | Maintained by                 |
//! |---------------------------|--------------------------|-------------------------------|
//! | `ServiceDialIdentities`   | (service, identity)      | Dial service policies         |
//! | `ServiceBindIdentities`   | (service, identity)      | Bind service policies         |
//! | `ServiceEdgeRouters`      | (service, edge router)   | Service edge router policies  |
//! | `IdentityEdgeRouters`     | (identity, edge router)  | Edge router policies          |
//!
//! ## Example
//!
//! ```
//! use edgeguard::{Engine, Identity, Queries, Service, ServicePolicy};
//! use edgeguard_types::{IdentityId, PolicyType, Semantic, ServiceId};
//!
//! let engine = Engine::in_memory();
//! engine
//!     .update(|m| {
//!         m.create_service(Service::new("s1", "web").with_role_attributes(["web"]))?;
//!         m.create_identity(Identity::new("i1", "alice"))?;
//!         m.create_service_policy(
//!             ServicePolicy::new("p1", "web-dial", PolicyType::Dial)
//!                 .with_semantic(Semantic::AnyOf)
//!                 .with_service_roles(["#web"])
//!                 .with_identity_roles(["#all"]),
//!         )
//!     })
//!     .unwrap();
//!
//! let dialable = engine
//!     .view(|s| s.is_dialable_by_identity(&ServiceId::new("s1"), &IdentityId::new("i1")))
//!     .unwrap();
//! assert!(dialable);
//! ```

use std::sync::Arc;

use edgeguard_config::{EdgeguardConfig, EngineConfig, SelectorConfig};
use edgeguard_store::{Db, ReadTxn, Tx};
use edgeguard_types::{IdentityId, ServiceId};

mod advisor;
mod audit;
mod error;
mod index;
mod links;
mod model;
mod mutation;
mod notify;
mod propagate;
mod queries;
mod tables;

#[cfg(test)]
mod tests;

pub use advisor::{Access, AdvisorReport, advise};
pub use audit::{IntegrityReport, LinkDiscrepancy, check_links, expected_links};
pub use error::{EngineError, ErrorKind};
pub use model::{
    Config, EdgeRouter, EdgeRouterPolicy, Identity, Policy, Record, RoleEntity, Service,
    ServiceEdgeRouterPolicy, ServicePolicy, Session,
};
pub use mutation::{MAX_FIELD_LEN, Mutation};
pub use notify::{NoopNotifier, NotifyError, RecordingNotifier, ServiceCacheNotifier};
pub use queries::Queries;
pub use tables::{Relation, Side};

use propagate::Propagator;

// ============================================================================
// Engine
// ============================================================================

/// The relationship engine over an in-memory transactional store.
#[derive(Debug)]
pub struct Engine {
    db: Db,
    config: EngineConfig,
    selector: SelectorConfig,
    notifier: Arc<dyn ServiceCacheNotifier>,
}

impl Engine {
    pub fn new(config: EngineConfig, notifier: Arc<dyn ServiceCacheNotifier>) -> Self {
        tracing::debug!(?config, "engine started");
        Self {
            db: Db::new(),
            config,
            selector: SelectorConfig::default(),
            notifier,
        }
    }

    /// An engine using every configured section that applies to it.
    pub fn from_config(config: &EdgeguardConfig, notifier: Arc<dyn ServiceCacheNotifier>) -> Self {
        Self::new(config.engine, notifier).with_selector_config(config.selector)
    }

    /// Default configuration, notifications discarded.
    pub fn in_memory() -> Self {
        Self::new(EngineConfig::default(), Arc::new(NoopNotifier))
    }

    pub fn with_selector_config(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens the write transaction. Blocks while another one is open.
    pub fn write(&self) -> Result<Mutation<'_>, EngineError> {
        let txn = self.db.begin_write()?;
        Ok(Mutation::new(
            txn,
            Propagator::new(self.config.index_strategy),
            self.selector.max_tokens,
            Arc::clone(&self.notifier),
            self.config.invalidate_service_cache,
        ))
    }

    /// Opens a read-only view of the last committed state.
    pub fn read(&self) -> Result<Snapshot, EngineError> {
        Ok(Snapshot {
            txn: self.db.begin_read()?,
        })
    }

    /// Runs `f` in a write transaction, committing on `Ok` and rolling back
    /// on `Err`.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut Mutation<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut mutation = self.write()?;
        match f(&mut mutation) {
            Ok(value) => {
                mutation.commit()?;
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(%error, kind = ?error.kind(), "mutation failed");
                mutation.rollback();
                Err(error)
            }
        }
    }

    pub fn view<T>(&self, f: impl FnOnce(&Snapshot) -> Result<T, EngineError>) -> Result<T, EngineError> {
        f(&self.read()?)
    }

    /// Explains whether `identity` can reach `service`.
    pub fn advise(&self, identity: &IdentityId, service: &ServiceId) -> Result<AdvisorReport, EngineError> {
        self.view(|s| advise(s, identity, service))
    }

    /// Recomputes every relation and compares it with the stored links.
    pub fn check_integrity(&self) -> Result<IntegrityReport, EngineError> {
        self.view(check_links)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::in_memory()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A consistent read view. Later commits are not visible through it.
#[derive(Debug)]
pub struct Snapshot {
    txn: ReadTxn,
}

impl Snapshot {
    pub fn version(&self) -> edgeguard_store::Version {
        self.txn.version()
    }
}

impl Queries for Snapshot {
    fn txn(&self) -> &dyn Tx {
        &self.txn
    }
}
