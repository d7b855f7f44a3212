//! Write transactions and entity lifecycle.
//!
//! A [`Mutation`] wraps one store write transaction. Every create, update
//! and delete runs its propagation inline, so by the time a mutation
//! commits the derived links already reflect it. Any error poisons the
//! mutation: later operations return [`EngineError::Aborted`] and
//! `commit` rolls every write back instead of publishing.
//!
//! Deleting a selectable entity is ordered:
//!
//! 1. delete dependents (sessions of a service or identity);
//! 2. strip explicit references to the entity from policy selectors, while
//!    the entity still exists so the strip has attributes to re-evaluate;
//! 3. withdraw the entity from every policy still selecting it, then remove
//!    its index rows and its record.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use edgeguard_store::{MAX_KEY_COMPONENT_LEN, Tx, Version, WriteTxn};
use edgeguard_types::{
    ConfigId, EdgeRouterId, EntityKind, IdentityId, PolicyId, PolicyKind, PolicyType,
    RoleAttributes, ServiceId, SessionId,
};

use crate::error::EngineError;
use crate::index::{self, PolicyMatchIndex, RoleAttributeIndex};
use crate::model::{
    Config, EdgeRouter, EdgeRouterPolicy, Identity, Policy, Record, RoleEntity, Service,
    ServiceEdgeRouterPolicy, ServicePolicy, Session,
};
use crate::notify::ServiceCacheNotifier;
use crate::propagate::{PolicyShape, Propagator, propagation_targets};
use crate::queries::Queries;
use crate::tables::{self, Relation, Side};

fn key(id: &str) -> Bytes {
    Bytes::copy_from_slice(id.as_bytes())
}

/// Longest id, name or role attribute. Each becomes a pair-key component,
/// and the match index stores it behind a one-byte `#`/`@` prefix.
pub const MAX_FIELD_LEN: usize = MAX_KEY_COMPONENT_LEN - 1;

fn check_length(kind: &'static str, field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(EngineError::FieldTooLong {
            kind,
            field,
            len: value.len(),
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

/// An open write transaction against the engine.
pub struct Mutation<'e> {
    txn: WriteTxn<'e>,
    propagator: Propagator,
    max_tokens: usize,
    notifier: Arc<dyn ServiceCacheNotifier>,
    invalidate: bool,
    invalidated: BTreeSet<ServiceId>,
    /// Set by the first failed operation; a failed mutation never commits.
    failed: Option<String>,
}

impl<'e> Mutation<'e> {
    pub(crate) fn new(
        txn: WriteTxn<'e>,
        propagator: Propagator,
        max_tokens: usize,
        notifier: Arc<dyn ServiceCacheNotifier>,
        invalidate: bool,
    ) -> Self {
        Self {
            txn,
            propagator,
            max_tokens,
            notifier,
            invalidate,
            invalidated: BTreeSet::new(),
            failed: None,
        }
    }

    /// Publishes every write, then notifies the service cache of the
    /// services this mutation changed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Aborted`] and discards every write if any
    /// operation on this mutation failed.
    pub fn commit(self) -> Result<Version, EngineError> {
        let Self {
            txn,
            notifier,
            invalidate,
            invalidated,
            failed,
            ..
        } = self;

        if let Some(cause) = failed {
            tracing::warn!(%cause, "refusing to commit a failed mutation");
            txn.rollback();
            return Err(EngineError::Aborted { cause });
        }

        let version = txn.commit()?;
        tracing::debug!(%version, invalidated = invalidated.len(), "mutation committed");

        if invalidate {
            for service in &invalidated {
                if let Err(error) = notifier.service_changed(service) {
                    tracing::warn!(%service, %error, "service cache invalidation failed");
                }
            }
        }
        Ok(version)
    }

    /// Discards every write. Dropping a mutation has the same effect.
    pub fn rollback(self) {
        tracing::debug!(pending = self.invalidated.len(), "mutation rolled back");
        self.txn.rollback();
    }

    #[cfg(test)]
    pub(crate) fn txn_mut(&mut self) -> &mut WriteTxn<'e> {
        &mut self.txn
    }

    /// Whether an operation on this mutation has failed.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Runs one public operation. The first error poisons the mutation:
    /// later operations fail fast and `commit` rolls back.
    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if let Some(cause) = &self.failed {
            return Err(EngineError::Aborted {
                cause: cause.clone(),
            });
        }
        let result = op(self);
        if let Err(error) = &result
            && self.failed.is_none()
        {
            self.failed = Some(error.to_string());
        }
        result
    }

    /// Services whose cache will be invalidated on commit.
    pub fn pending_invalidations(&self) -> &BTreeSet<ServiceId> {
        &self.invalidated
    }

    // ========================================================================
    // Services
    // ========================================================================

    pub fn create_service(&mut self, service: Service) -> Result<(), EngineError> {
        self.run(|m| {
            m.require_configs(&service.configs)?;
            m.create_entity(&service)?;
            for config in &service.configs {
                tables::CONFIG_SERVICES.add(&mut m.txn, config.as_str(), service.id.as_str())?;
            }
            Ok(())
        })
    }

    /// Replaces a service record, re-propagating its role attributes.
    pub fn update_service(&mut self, service: Service) -> Result<(), EngineError> {
        self.run(|m| {
            m.require_configs(&service.configs)?;
            let old = m.update_entity(&service)?;

            let before: BTreeSet<&ConfigId> = old.configs.iter().collect();
            let after: BTreeSet<&ConfigId> = service.configs.iter().collect();
            for removed in before.difference(&after) {
                tables::CONFIG_SERVICES.remove(&mut m.txn, removed.as_str(), service.id.as_str())?;
            }
            for added in after.difference(&before) {
                tables::CONFIG_SERVICES.add(&mut m.txn, added.as_str(), service.id.as_str())?;
            }

            m.invalidated.insert(service.id);
            Ok(())
        })
    }

    pub fn delete_service(&mut self, id: &ServiceId) -> Result<(), EngineError> {
        self.run(|m| {
            let service: Service = m.existing(id.as_str())?;

            let sessions = tables::SESSIONS_BY_SERVICE.list(&m.txn, id.as_str())?;
            for session in &sessions {
                m.delete_session(&SessionId::new(session.as_str()))?;
            }

            m.delete_entity::<Service>(id.as_str())?;
            for config in &service.configs {
                tables::CONFIG_SERVICES.remove(&mut m.txn, config.as_str(), id.as_str())?;
            }

            tracing::info!(service = %id, sessions = sessions.len(), "service deleted");
            m.invalidated.insert(id.clone());
            Ok(())
        })
    }

    // ========================================================================
    // Identities and edge routers
    // ========================================================================

    pub fn create_identity(&mut self, identity: Identity) -> Result<(), EngineError> {
        self.run(|m| m.create_entity(&identity))
    }

    pub fn update_identity(&mut self, identity: Identity) -> Result<(), EngineError> {
        self.run(|m| m.update_entity(&identity).map(drop))
    }

    pub fn delete_identity(&mut self, id: &IdentityId) -> Result<(), EngineError> {
        self.run(|m| {
            m.existing::<Identity>(id.as_str())?;

            let sessions = tables::SESSIONS_BY_IDENTITY.list(&m.txn, id.as_str())?;
            for session in &sessions {
                m.delete_session(&SessionId::new(session.as_str()))?;
            }

            m.delete_entity::<Identity>(id.as_str())?;
            tracing::info!(identity = %id, sessions = sessions.len(), "identity deleted");
            Ok(())
        })
    }

    pub fn create_edge_router(&mut self, router: EdgeRouter) -> Result<(), EngineError> {
        self.run(|m| m.create_entity(&router))
    }

    pub fn update_edge_router(&mut self, router: EdgeRouter) -> Result<(), EngineError> {
        self.run(|m| m.update_entity(&router).map(drop))
    }

    pub fn delete_edge_router(&mut self, id: &EdgeRouterId) -> Result<(), EngineError> {
        self.run(|m| {
            m.delete_entity::<EdgeRouter>(id.as_str())?;
            tracing::info!(edge_router = %id, "edge router deleted");
            Ok(())
        })
    }

    /// Replaces only the role attributes of an entity.
    pub fn set_role_attributes(
        &mut self,
        kind: EntityKind,
        id: &str,
        attributes: RoleAttributes,
    ) -> Result<(), EngineError> {
        self.run(|m| match kind {
            EntityKind::Service => {
                let mut service: Service = m.existing(id)?;
                service.role_attributes = attributes;
                m.update_service(service)
            }
            EntityKind::Identity => {
                let mut identity: Identity = m.existing(id)?;
                identity.role_attributes = attributes;
                m.update_identity(identity)
            }
            EntityKind::EdgeRouter => {
                let mut router: EdgeRouter = m.existing(id)?;
                router.role_attributes = attributes;
                m.update_edge_router(router)
            }
        })
    }

    // ========================================================================
    // Policies
    // ========================================================================

    pub fn create_service_policy(&mut self, policy: ServicePolicy) -> Result<(), EngineError> {
        self.run(|m| m.create_policy(policy))
    }

    /// Replaces a service policy. A change of policy type moves all of its
    /// contributions from one relation to the other.
    pub fn update_service_policy(&mut self, policy: ServicePolicy) -> Result<(), EngineError> {
        self.run(|m| m.update_policy(policy))
    }

    pub fn delete_service_policy(&mut self, id: &PolicyId) -> Result<(), EngineError> {
        self.run(|m| m.delete_policy::<ServicePolicy>(id.as_str()))
    }

    pub fn create_service_edge_router_policy(
        &mut self,
        policy: ServiceEdgeRouterPolicy,
    ) -> Result<(), EngineError> {
        self.run(|m| m.create_policy(policy))
    }

    pub fn update_service_edge_router_policy(
        &mut self,
        policy: ServiceEdgeRouterPolicy,
    ) -> Result<(), EngineError> {
        self.run(|m| m.update_policy(policy))
    }

    pub fn delete_service_edge_router_policy(&mut self, id: &PolicyId) -> Result<(), EngineError> {
        self.run(|m| m.delete_policy::<ServiceEdgeRouterPolicy>(id.as_str()))
    }

    pub fn create_edge_router_policy(&mut self, policy: EdgeRouterPolicy) -> Result<(), EngineError> {
        self.run(|m| m.create_policy(policy))
    }

    pub fn update_edge_router_policy(&mut self, policy: EdgeRouterPolicy) -> Result<(), EngineError> {
        self.run(|m| m.update_policy(policy))
    }

    pub fn delete_edge_router_policy(&mut self, id: &PolicyId) -> Result<(), EngineError> {
        self.run(|m| m.delete_policy::<EdgeRouterPolicy>(id.as_str()))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Records a session. The identity must currently be allowed to dial or
    /// bind the service, according to the session kind.
    pub fn create_session(&mut self, session: Session) -> Result<(), EngineError> {
        self.run(|m| {
            m.existing::<Service>(session.service.as_str())?;
            m.existing::<Identity>(session.identity.as_str())?;

            let allowed = match PolicyType::from(session.kind) {
                PolicyType::Dial => m.is_dialable_by_identity(&session.service, &session.identity)?,
                PolicyType::Bind => m.is_bindable_by_identity(&session.service, &session.identity)?,
            };
            if !allowed {
                return Err(EngineError::AccessDenied {
                    identity: session.identity.into_inner(),
                    service: session.service.into_inner(),
                    access: match session.kind {
                        edgeguard_types::SessionKind::Dial => "dial",
                        edgeguard_types::SessionKind::Bind => "bind",
                    },
                });
            }

            m.insert_record(&session)?;
            tables::SESSIONS_BY_SERVICE.add(&mut m.txn, session.service.as_str(), session.id.as_str())?;
            tables::SESSIONS_BY_IDENTITY.add(&mut m.txn, session.identity.as_str(), session.id.as_str())?;
            Ok(())
        })
    }

    pub fn delete_session(&mut self, id: &SessionId) -> Result<(), EngineError> {
        self.run(|m| {
            let session: Session = m.existing(id.as_str())?;
            tables::SESSIONS_BY_SERVICE.remove(&mut m.txn, session.service.as_str(), id.as_str())?;
            tables::SESSIONS_BY_IDENTITY.remove(&mut m.txn, session.identity.as_str(), id.as_str())?;
            m.remove_record(&session)?;
            tracing::debug!(session = %id, "session deleted");
            Ok(())
        })
    }

    // ========================================================================
    // Configs
    // ========================================================================

    pub fn create_config(&mut self, config: Config) -> Result<(), EngineError> {
        self.run(|m| {
            Self::validate_config(&config)?;
            m.insert_record(&config)
        })
    }

    /// Replaces a config document. Every service using it is invalidated.
    pub fn update_config(&mut self, config: Config) -> Result<(), EngineError> {
        self.run(|m| {
            Self::validate_config(&config)?;
            let old: Config = m.existing(config.id.as_str())?;
            m.replace_record(&old, &config)?;

            for service in tables::CONFIG_SERVICES.list(&m.txn, config.id.as_str())? {
                m.invalidated.insert(ServiceId::new(service));
            }
            Ok(())
        })
    }

    /// Deletes a config and detaches it from every service that lists it.
    pub fn delete_config(&mut self, id: &ConfigId) -> Result<(), EngineError> {
        self.run(|m| {
            let config: Config = m.existing(id.as_str())?;

            let services = tables::CONFIG_SERVICES.remove_all(&mut m.txn, id.as_str())?;
            for service_id in &services {
                let mut service: Service = m.existing(service_id)?;
                service.configs.retain(|c| c != id);
                tables::SERVICES.put(&mut m.txn, key(service_id), &service)?;
                m.invalidated.insert(service.id);
            }

            m.remove_record(&config)?;
            tracing::info!(config = %id, services = services.len(), "config deleted");
            Ok(())
        })
    }

    fn validate_config(config: &Config) -> Result<(), EngineError> {
        config
            .json()
            .map(drop)
            .map_err(|source| EngineError::InvalidConfigData {
                id: config.id.to_string(),
                source,
            })
    }

    fn require_configs(&self, configs: &[ConfigId]) -> Result<(), EngineError> {
        for config in configs {
            self.existing::<Config>(config.as_str())?;
        }
        Ok(())
    }

    // ========================================================================
    // Entity lifecycle
    // ========================================================================

    fn create_entity<E: RoleEntity>(&mut self, entity: &E) -> Result<(), EngineError> {
        Self::require_attributes(entity)?;
        self.insert_record(entity)?;
        RoleAttributeIndex::for_kind(E::KIND).replace(
            &mut self.txn,
            entity.id(),
            &RoleAttributes::new(),
            entity.role_attributes(),
        )?;
        self.propagator.entity_roles_changed(
            &mut self.txn,
            E::KIND,
            entity.id(),
            None,
            entity.role_attributes(),
        )?;

        tracing::debug!(kind = %E::KIND, id = entity.id(), "entity created");
        Ok(())
    }

    /// Returns the record that was replaced.
    fn update_entity<E: RoleEntity>(&mut self, entity: &E) -> Result<E, EngineError> {
        Self::require_attributes(entity)?;
        let old: E = self.existing(entity.id())?;
        self.replace_record(&old, entity)?;
        RoleAttributeIndex::for_kind(E::KIND).replace(
            &mut self.txn,
            entity.id(),
            old.role_attributes(),
            entity.role_attributes(),
        )?;
        self.propagator.entity_roles_changed(
            &mut self.txn,
            E::KIND,
            entity.id(),
            Some(old.role_attributes()),
            entity.role_attributes(),
        )?;

        tracing::debug!(kind = %E::KIND, id = entity.id(), "entity updated");
        Ok(old)
    }

    fn delete_entity<E: RoleEntity>(&mut self, id: &str) -> Result<E, EngineError> {
        let entity: E = self.existing(id)?;

        self.strip_references(E::KIND, id)?;
        self.propagator.entity_removed(&mut self.txn, E::KIND, id)?;
        RoleAttributeIndex::for_kind(E::KIND).replace(
            &mut self.txn,
            id,
            entity.role_attributes(),
            &RoleAttributes::new(),
        )?;
        self.remove_record(&entity)?;

        self.verify_detached(E::KIND, id)?;
        Ok(entity)
    }

    /// Removes `@id` from every selector that names it.
    fn strip_references(&mut self, kind: EntityKind, id: &str) -> Result<(), EngineError> {
        for &(policy_kind, side) in propagation_targets(kind) {
            let referencing = self
                .propagator
                .referencing_policies(&self.txn, policy_kind, side, id)?;
            for policy in referencing {
                match policy_kind {
                    PolicyKind::Service => {
                        self.strip_reference::<ServicePolicy>(&policy, side, id)?;
                    }
                    PolicyKind::ServiceEdgeRouter => {
                        self.strip_reference::<ServiceEdgeRouterPolicy>(&policy, side, id)?;
                    }
                    PolicyKind::EdgeRouter => {
                        self.strip_reference::<EdgeRouterPolicy>(&policy, side, id)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn strip_reference<P: Policy>(
        &mut self,
        policy_id: &str,
        side: Side,
        id: &str,
    ) -> Result<(), EngineError> {
        let Some(old) = P::TABLE.get(&self.txn, policy_id.as_bytes())? else {
            return Err(EngineError::MissingPolicy {
                kind: P::KIND,
                id: policy_id.to_string(),
            }
            .logged());
        };
        let old_shape = PolicyShape::of(&old)?;
        let stripped = old_shape.selector(side).without_reference(id);

        if stripped.is_unconditional() && !old_shape.selector(side).is_unconditional() {
            tracing::warn!(
                policy = policy_id,
                entity = id,
                "selector left empty under AllOf now matches every entity"
            );
        }

        let mut new = old.clone();
        new.set_roles(side, stripped.to_roles());
        let new_shape = PolicyShape::of(&new)?;

        P::TABLE.put(&mut self.txn, key(policy_id), &new)?;
        self.propagator
            .policy_changed(&mut self.txn, Some(&old_shape), Some(&new_shape))?;

        tracing::info!(kind = %P::KIND, policy = policy_id, entity = id, "stripped reference to deleted entity");
        Ok(())
    }

    /// Confirms nothing derived still names a deleted entity.
    fn verify_detached(&self, kind: EntityKind, id: &str) -> Result<(), EngineError> {
        let dangling = |table: &'static str| {
            EngineError::DanglingReference {
                kind: kind.as_str(),
                id: id.to_string(),
                table,
            }
            .logged()
        };

        for relation in Relation::ALL {
            let (first, second) = relation.sides();
            let links = relation.links();
            if (first == kind && !links.list_linked(&self.txn, id)?.is_empty())
                || (second == kind && !links.list_linked_reverse(&self.txn, id)?.is_empty())
            {
                return Err(dangling(relation.as_str()));
            }
        }

        for &(policy_kind, side) in propagation_targets(kind) {
            let members = tables::membership(policy_kind, side);
            if !members.list_reverse(&self.txn, id)?.is_empty() {
                return Err(dangling(members.name()));
            }
            if !PolicyMatchIndex::new(policy_kind, side)
                .referencing(&self.txn, id)?
                .is_empty()
            {
                return Err(dangling(policy_kind.as_str()));
            }
        }

        if RoleAttributeIndex::for_kind(kind).contains_id(&self.txn, id)? {
            return Err(dangling("role attribute index"));
        }
        Ok(())
    }

    // ========================================================================
    // Policy lifecycle
    // ========================================================================

    fn create_policy<P: Policy>(&mut self, mut policy: P) -> Result<(), EngineError> {
        Self::require_fields(&policy)?;
        let shape = self.validated_shape(&mut policy)?;
        self.insert_record(&policy)?;
        self.propagator.policy_changed(&mut self.txn, None, Some(&shape))?;

        tracing::debug!(kind = %P::KIND, policy = policy.id(), "policy created");
        Ok(())
    }

    fn update_policy<P: Policy>(&mut self, mut policy: P) -> Result<(), EngineError> {
        Self::require_fields(&policy)?;
        let old: P = self.existing(policy.id())?;
        let old_shape = PolicyShape::of(&old)?;
        let shape = self.validated_shape(&mut policy)?;
        self.replace_record(&old, &policy)?;
        self.propagator
            .policy_changed(&mut self.txn, Some(&old_shape), Some(&shape))?;

        tracing::debug!(kind = %P::KIND, policy = policy.id(), "policy updated");
        Ok(())
    }

    fn delete_policy<P: Policy>(&mut self, id: &str) -> Result<(), EngineError> {
        let old: P = self.existing(id)?;
        let shape = PolicyShape::of(&old)?;
        self.propagator.policy_changed(&mut self.txn, Some(&shape), None)?;
        self.remove_record(&old)?;

        tracing::debug!(kind = %P::KIND, policy = id, "policy deleted");
        Ok(())
    }

    /// Parses and checks a policy's role text, normalizing the stored text
    /// to the parsed tokens.
    fn validated_shape<P: Policy>(&self, policy: &mut P) -> Result<PolicyShape, EngineError> {
        let shape = PolicyShape::parse(policy, self.max_tokens)?;
        for side in Side::BOTH {
            let kind = side.entity_kind(P::KIND);
            let selector = shape.selector(side);
            for name in selector.attributes().chain(selector.references()) {
                check_length(P::COLLECTION, "roles", name)?;
            }
            for reference in selector.references() {
                if !index::entity_exists(&self.txn, kind, reference)? {
                    return Err(EngineError::UnknownReference {
                        kind,
                        id: reference.to_string(),
                    });
                }
            }
            policy.set_roles(side, selector.to_roles());
        }
        Ok(shape)
    }

    // ========================================================================
    // Records
    // ========================================================================

    fn existing<R: Record>(&self, id: &str) -> Result<R, EngineError> {
        R::TABLE
            .get(&self.txn, id.as_bytes())?
            .ok_or_else(|| EngineError::NotFound {
                kind: R::COLLECTION,
                id: id.to_string(),
            })
    }

    /// Runs before any write of `record`.
    fn require_fields<R: Record>(record: &R) -> Result<(), EngineError> {
        if record.id().is_empty() {
            return Err(EngineError::MissingField {
                kind: R::COLLECTION,
                field: "id",
            });
        }
        check_length(R::COLLECTION, "id", record.id())?;
        if let Some(name) = record.name() {
            if name.is_empty() {
                return Err(EngineError::MissingField {
                    kind: R::COLLECTION,
                    field: "name",
                });
            }
            check_length(R::COLLECTION, "name", name)?;
        }
        Ok(())
    }

    fn require_attributes<E: RoleEntity>(entity: &E) -> Result<(), EngineError> {
        for attribute in entity.role_attributes() {
            check_length(E::COLLECTION, "role_attributes", attribute)?;
        }
        Ok(())
    }

    fn insert_record<R: Record>(&mut self, record: &R) -> Result<(), EngineError> {
        Self::require_fields(record)?;
        if R::TABLE.contains(&self.txn, record.id().as_bytes())? {
            return Err(EngineError::AlreadyExists {
                kind: R::COLLECTION,
                id: record.id().to_string(),
            });
        }
        if let (Some(names), Some(name)) = (R::NAMES, record.name()) {
            self.claim_name::<R>(names, name, record.id())?;
        }
        R::TABLE.put(&mut self.txn, key(record.id()), record)?;
        Ok(())
    }

    fn replace_record<R: Record>(&mut self, old: &R, new: &R) -> Result<(), EngineError> {
        Self::require_fields(new)?;
        if let Some(names) = R::NAMES {
            if old.name() != new.name() {
                if let Some(name) = new.name() {
                    self.claim_name::<R>(names, name, new.id())?;
                }
                if let Some(name) = old.name() {
                    names.delete(&mut self.txn, name.as_bytes())?;
                }
            }
        }
        R::TABLE.put(&mut self.txn, key(new.id()), new)?;
        Ok(())
    }

    fn remove_record<R: Record>(&mut self, record: &R) -> Result<(), EngineError> {
        if let (Some(names), Some(name)) = (R::NAMES, record.name()) {
            names.delete(&mut self.txn, name.as_bytes())?;
        }
        R::TABLE.delete(&mut self.txn, record.id().as_bytes())?;
        Ok(())
    }

    fn claim_name<R: Record>(
        &mut self,
        names: edgeguard_store::Table<String>,
        name: &str,
        id: &str,
    ) -> Result<(), EngineError> {
        if let Some(existing) = names.get(&self.txn, name.as_bytes())? {
            if existing != id {
                return Err(EngineError::DuplicateName {
                    kind: R::COLLECTION,
                    name: name.to_string(),
                    existing,
                });
            }
        }
        names.put(&mut self.txn, key(name), &id.to_string())?;
        Ok(())
    }
}

impl Queries for Mutation<'_> {
    fn txn(&self) -> &dyn Tx {
        &self.txn
    }
}

impl std::fmt::Debug for Mutation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("version", &self.txn.version())
            .field("dirty", &self.txn.is_dirty())
            .field("invalidated", &self.invalidated)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}
