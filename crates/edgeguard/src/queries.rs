//! The read surface.
//!
//! [`Queries`] is implemented by both [`Snapshot`](crate::Snapshot) (last
//! committed state) and [`Mutation`](crate::Mutation) (read-your-writes).
//! Permission checks are single link-count lookups; nothing here
//! re-evaluates selectors.

use std::collections::BTreeSet;

use edgeguard_store::Tx;
use edgeguard_types::{
    EntityKind, IdentityId, PolicyId, PolicyKind, RoleAttributes, Semantic, ServiceId,
};

use crate::error::EngineError;
use crate::index::{self, RoleAttributeIndex};
use crate::model::{Record, Session};
use crate::tables::{self, Relation, Side};

pub trait Queries {
    /// The store transaction reads are served from.
    fn txn(&self) -> &dyn Tx;

    // ------------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------------

    fn is_dialable_by_identity(
        &self,
        service: &ServiceId,
        identity: &IdentityId,
    ) -> Result<bool, EngineError> {
        Ok(self
            .link_count(Relation::ServiceDialIdentities, service.as_str(), identity.as_str())?
            .is_some())
    }

    fn is_bindable_by_identity(
        &self,
        service: &ServiceId,
        identity: &IdentityId,
    ) -> Result<bool, EngineError> {
        Ok(self
            .link_count(Relation::ServiceBindIdentities, service.as_str(), identity.as_str())?
            .is_some())
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    /// Number of policies linking `a` to `b`, `None` when unlinked.
    fn link_count(&self, relation: Relation, a: &str, b: &str) -> Result<Option<u32>, EngineError> {
        Ok(relation.links().link_count(self.txn(), a, b)?)
    }

    /// Entities linked to `id`, where `id` is on the first side of the
    /// relation.
    fn linked_entities(&self, relation: Relation, id: &str) -> Result<BTreeSet<String>, EngineError> {
        Ok(relation.links().list_linked(self.txn(), id)?)
    }

    /// Entities linked to `id`, where `id` is on the second side of the
    /// relation.
    fn reverse_linked_entities(
        &self,
        relation: Relation,
        id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        Ok(relation.links().list_linked_reverse(self.txn(), id)?)
    }

    /// Every `(a, b, count)` of a relation, in key order.
    fn links(&self, relation: Relation) -> Result<Vec<(String, String, u32)>, EngineError> {
        Ok(relation.links().entries(self.txn())?)
    }

    /// Entities currently selected by one side of a policy.
    fn policy_members(
        &self,
        kind: PolicyKind,
        policy: &PolicyId,
        side: Side,
    ) -> Result<BTreeSet<String>, EngineError> {
        Ok(tables::membership(kind, side).list(self.txn(), policy.as_str())?)
    }

    /// Policies of `kind` whose selector for `entity`'s collection currently
    /// matches it.
    fn policies_selecting(
        &self,
        kind: PolicyKind,
        entity: EntityKind,
        id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        match Side::of(kind, entity) {
            Some(side) => Ok(tables::membership(kind, side).list_reverse(self.txn(), id)?),
            None => Ok(BTreeSet::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Role attributes
    // ------------------------------------------------------------------------

    /// `None` when the entity does not exist.
    fn role_attributes(&self, kind: EntityKind, id: &str) -> Result<Option<RoleAttributes>, EngineError> {
        Ok(index::entity_attributes(self.txn(), kind, id)?)
    }

    /// Entities whose attribute sets satisfy `values` under `semantic`.
    /// An empty `AllOf` predicate matches every entity.
    fn matching_entities<S: AsRef<str>>(
        &self,
        kind: EntityKind,
        values: &[S],
        semantic: Semantic,
    ) -> Result<BTreeSet<String>, EngineError> {
        match RoleAttributeIndex::for_kind(kind).matching(self.txn(), values, semantic)? {
            Some(ids) => Ok(ids),
            None => Ok(index::entity_ids(self.txn(), kind)?),
        }
    }

    fn distinct_role_attributes(&self, kind: EntityKind) -> Result<BTreeSet<String>, EngineError> {
        Ok(RoleAttributeIndex::for_kind(kind).distinct(self.txn())?)
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    fn load<R: Record>(&self, id: &str) -> Result<Option<R>, EngineError> {
        Ok(R::TABLE.get(self.txn(), id.as_bytes())?)
    }

    fn load_by_name<R: Record>(&self, name: &str) -> Result<Option<R>, EngineError> {
        let Some(names) = R::NAMES else {
            return Ok(None);
        };
        match names.get(self.txn(), name.as_bytes())? {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    /// Every record of a collection, in id order.
    fn list<R: Record>(&self) -> Result<Vec<R>, EngineError> {
        Ok(R::TABLE
            .scan_all(self.txn())?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    fn sessions_for_service(&self, service: &ServiceId) -> Result<Vec<Session>, EngineError> {
        let ids = tables::SESSIONS_BY_SERVICE.list(self.txn(), service.as_str())?;
        ids.iter()
            .filter_map(|id| self.load::<Session>(id).transpose())
            .collect()
    }

    fn sessions_for_identity(&self, identity: &IdentityId) -> Result<Vec<Session>, EngineError> {
        let ids = tables::SESSIONS_BY_IDENTITY.list(self.txn(), identity.as_str())?;
        ids.iter()
            .filter_map(|id| self.load::<Session>(id).transpose())
            .collect()
    }

    /// Services that list `config` among their configs.
    fn services_using_config(&self, config: &str) -> Result<BTreeSet<String>, EngineError> {
        Ok(tables::CONFIG_SERVICES.list(self.txn(), config)?)
    }
}
