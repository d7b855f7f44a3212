//! Records stored by the engine.
//!
//! Entities carry role attributes; policies carry role text. A policy never
//! holds an entity, and an entity never holds a policy: both sides meet only
//! in the derived link tables.

use std::fmt::Debug;

use edgeguard_store::Table;
use edgeguard_types::{
    ConfigId, EdgeRouterId, EntityKind, IdentityId, PolicyId, PolicyKind, PolicyType,
    RoleAttributes, Semantic, ServiceId, SessionId, SessionKind, role_attributes,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::tables::{self, Relation, Side};

// ============================================================================
// Record traits
// ============================================================================

/// A record kept in its own table, keyed by identifier.
pub trait Record: Serialize + DeserializeOwned + Clone + Debug {
    /// Singular collection name used in messages.
    const COLLECTION: &'static str;

    /// Table holding the records.
    const TABLE: Table<Self>;

    /// Unique name index, for named records.
    const NAMES: Option<Table<String>>;

    fn id(&self) -> &str;

    fn name(&self) -> Option<&str>;
}

/// A record selectable by policies through its role attributes.
pub trait RoleEntity: Record {
    const KIND: EntityKind;

    fn role_attributes(&self) -> &RoleAttributes;
}

/// A policy: two role selectors sharing one semantic, contributing to one
/// derived relation.
pub trait Policy: Record {
    const KIND: PolicyKind;

    /// Role text of one side.
    fn roles(&self, side: Side) -> &[String];

    fn set_roles(&mut self, side: Side, roles: Vec<String>);

    fn semantic(&self) -> Semantic;

    /// The relation this policy contributes link counts to.
    fn relation(&self) -> Relation;
}

fn strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub role_attributes: RoleAttributes,
    /// Configuration documents attached to the service.
    pub configs: Vec<ConfigId>,
}

impl Service {
    pub fn new(id: impl Into<ServiceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role_attributes: RoleAttributes::new(),
            configs: Vec::new(),
        }
    }

    pub fn with_role_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_attributes = role_attributes(attributes);
        self
    }

    pub fn with_configs<I, C>(mut self, configs: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ConfigId>,
    {
        self.configs = configs.into_iter().map(Into::into).collect();
        self
    }
}

impl Record for Service {
    const COLLECTION: &'static str = "service";
    const TABLE: Table<Self> = tables::SERVICES;
    const NAMES: Option<Table<String>> = Some(tables::SERVICE_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl RoleEntity for Service {
    const KIND: EntityKind = EntityKind::Service;

    fn role_attributes(&self) -> &RoleAttributes {
        &self.role_attributes
    }
}

/// A network identity. Only its role attributes matter to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub role_attributes: RoleAttributes,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role_attributes: RoleAttributes::new(),
        }
    }

    pub fn with_role_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_attributes = role_attributes(attributes);
        self
    }
}

impl Record for Identity {
    const COLLECTION: &'static str = "identity";
    const TABLE: Table<Self> = tables::IDENTITIES;
    const NAMES: Option<Table<String>> = Some(tables::IDENTITY_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl RoleEntity for Identity {
    const KIND: EntityKind = EntityKind::Identity;

    fn role_attributes(&self) -> &RoleAttributes {
        &self.role_attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRouter {
    pub id: EdgeRouterId,
    pub name: String,
    pub role_attributes: RoleAttributes,
}

impl EdgeRouter {
    pub fn new(id: impl Into<EdgeRouterId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role_attributes: RoleAttributes::new(),
        }
    }

    pub fn with_role_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_attributes = role_attributes(attributes);
        self
    }
}

impl Record for EdgeRouter {
    const COLLECTION: &'static str = "edge router";
    const TABLE: Table<Self> = tables::EDGE_ROUTERS;
    const NAMES: Option<Table<String>> = Some(tables::EDGE_ROUTER_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl RoleEntity for EdgeRouter {
    const KIND: EntityKind = EntityKind::EdgeRouter;

    fn role_attributes(&self) -> &RoleAttributes {
        &self.role_attributes
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Grants the selected identities dial or bind access to the selected
/// services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePolicy {
    pub id: PolicyId,
    pub name: String,
    pub policy_type: PolicyType,
    pub semantic: Semantic,
    pub service_roles: Vec<String>,
    pub identity_roles: Vec<String>,
}

impl ServicePolicy {
    pub fn new(id: impl Into<PolicyId>, name: impl Into<String>, policy_type: PolicyType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            policy_type,
            semantic: Semantic::default(),
            service_roles: Vec::new(),
            identity_roles: Vec::new(),
        }
    }

    pub fn with_semantic(mut self, semantic: Semantic) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_service_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_roles = strings(roles);
        self
    }

    pub fn with_identity_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_roles = strings(roles);
        self
    }
}

impl Record for ServicePolicy {
    const COLLECTION: &'static str = "service policy";
    const TABLE: Table<Self> = tables::SERVICE_POLICIES;
    const NAMES: Option<Table<String>> = Some(tables::SERVICE_POLICY_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Policy for ServicePolicy {
    const KIND: PolicyKind = PolicyKind::Service;

    fn roles(&self, side: Side) -> &[String] {
        match side {
            Side::First => &self.service_roles,
            Side::Second => &self.identity_roles,
        }
    }

    fn set_roles(&mut self, side: Side, roles: Vec<String>) {
        match side {
            Side::First => self.service_roles = roles,
            Side::Second => self.identity_roles = roles,
        }
    }

    fn semantic(&self) -> Semantic {
        self.semantic
    }

    fn relation(&self) -> Relation {
        match self.policy_type {
            PolicyType::Dial => Relation::ServiceDialIdentities,
            PolicyType::Bind => Relation::ServiceBindIdentities,
        }
    }
}

/// Makes the selected services reachable through the selected edge routers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEdgeRouterPolicy {
    pub id: PolicyId,
    pub name: String,
    pub semantic: Semantic,
    pub service_roles: Vec<String>,
    pub edge_router_roles: Vec<String>,
}

impl ServiceEdgeRouterPolicy {
    pub fn new(id: impl Into<PolicyId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            semantic: Semantic::default(),
            service_roles: Vec::new(),
            edge_router_roles: Vec::new(),
        }
    }

    pub fn with_semantic(mut self, semantic: Semantic) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_service_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_roles = strings(roles);
        self
    }

    pub fn with_edge_router_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_router_roles = strings(roles);
        self
    }
}

impl Record for ServiceEdgeRouterPolicy {
    const COLLECTION: &'static str = "service edge router policy";
    const TABLE: Table<Self> = tables::SERVICE_EDGE_ROUTER_POLICIES;
    const NAMES: Option<Table<String>> = Some(tables::SERVICE_EDGE_ROUTER_POLICY_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Policy for ServiceEdgeRouterPolicy {
    const KIND: PolicyKind = PolicyKind::ServiceEdgeRouter;

    fn roles(&self, side: Side) -> &[String] {
        match side {
            Side::First => &self.service_roles,
            Side::Second => &self.edge_router_roles,
        }
    }

    fn set_roles(&mut self, side: Side, roles: Vec<String>) {
        match side {
            Side::First => self.service_roles = roles,
            Side::Second => self.edge_router_roles = roles,
        }
    }

    fn semantic(&self) -> Semantic {
        self.semantic
    }

    fn relation(&self) -> Relation {
        Relation::ServiceEdgeRouters
    }
}

/// Grants the selected identities the use of the selected edge routers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRouterPolicy {
    pub id: PolicyId,
    pub name: String,
    pub semantic: Semantic,
    pub identity_roles: Vec<String>,
    pub edge_router_roles: Vec<String>,
}

impl EdgeRouterPolicy {
    pub fn new(id: impl Into<PolicyId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            semantic: Semantic::default(),
            identity_roles: Vec::new(),
            edge_router_roles: Vec::new(),
        }
    }

    pub fn with_semantic(mut self, semantic: Semantic) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_identity_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_roles = strings(roles);
        self
    }

    pub fn with_edge_router_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_router_roles = strings(roles);
        self
    }
}

impl Record for EdgeRouterPolicy {
    const COLLECTION: &'static str = "edge router policy";
    const TABLE: Table<Self> = tables::EDGE_ROUTER_POLICIES;
    const NAMES: Option<Table<String>> = Some(tables::EDGE_ROUTER_POLICY_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Policy for EdgeRouterPolicy {
    const KIND: PolicyKind = PolicyKind::EdgeRouter;

    fn roles(&self, side: Side) -> &[String] {
        match side {
            Side::First => &self.identity_roles,
            Side::Second => &self.edge_router_roles,
        }
    }

    fn set_roles(&mut self, side: Side, roles: Vec<String>) {
        match side {
            Side::First => self.identity_roles = roles,
            Side::Second => self.edge_router_roles = roles,
        }
    }

    fn semantic(&self) -> Semantic {
        self.semantic
    }

    fn relation(&self) -> Relation {
        Relation::IdentityEdgeRouters
    }
}

// ============================================================================
// Dependents
// ============================================================================

/// An established connection between an identity and a service. Sessions
/// do not outlive either endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub service: ServiceId,
    pub identity: IdentityId,
    pub kind: SessionKind,
}

impl Session {
    pub fn new(
        id: impl Into<SessionId>,
        service: impl Into<ServiceId>,
        identity: impl Into<IdentityId>,
        kind: SessionKind,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            identity: identity.into(),
            kind,
        }
    }
}

impl Record for Session {
    const COLLECTION: &'static str = "session";
    const TABLE: Table<Self> = tables::SESSIONS;
    const NAMES: Option<Table<String>> = None;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        None
    }
}

/// A JSON configuration document that services can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub id: ConfigId,
    pub name: String,
    /// JSON text, validated on write.
    pub data: String,
}

impl Config {
    pub fn new(id: impl Into<ConfigId>, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data: data.into(),
        }
    }

    /// Builds a config from an already-parsed document.
    pub fn from_json(
        id: impl Into<ConfigId>,
        name: impl Into<String>,
        data: &serde_json::Value,
    ) -> Self {
        Self::new(id, name, data.to_string())
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

impl Record for Config {
    const COLLECTION: &'static str = "config";
    const TABLE: Table<Self> = tables::CONFIGS;
    const NAMES: Option<Table<String>> = Some(tables::CONFIG_NAMES);

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}
