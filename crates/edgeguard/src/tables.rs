//! Table layout.
//!
//! Every record lives in its own table keyed by identifier. Derived state
//! (links, memberships, indexes) lives in pair-keyed tables that reference
//! records by identifier only, so no row ever owns another.

use std::fmt::{self, Display};

use edgeguard_store::Table;
use edgeguard_types::{EntityKind, PolicyKind};
use serde::{Deserialize, Serialize};

use crate::links::{LinkCollection, RefCountedLinkCollection};
use crate::model::{
    Config, EdgeRouter, EdgeRouterPolicy, Identity, Service, ServiceEdgeRouterPolicy,
    ServicePolicy, Session,
};

// ============================================================================
// Records
// ============================================================================

pub(crate) const SERVICES: Table<Service> = Table::new("services");
pub(crate) const IDENTITIES: Table<Identity> = Table::new("identities");
pub(crate) const EDGE_ROUTERS: Table<EdgeRouter> = Table::new("edge-routers");
pub(crate) const SERVICE_POLICIES: Table<ServicePolicy> = Table::new("service-policies");
pub(crate) const SERVICE_EDGE_ROUTER_POLICIES: Table<ServiceEdgeRouterPolicy> =
    Table::new("service-edge-router-policies");
pub(crate) const EDGE_ROUTER_POLICIES: Table<EdgeRouterPolicy> =
    Table::new("edge-router-policies");
pub(crate) const CONFIGS: Table<Config> = Table::new("configs");
pub(crate) const SESSIONS: Table<Session> = Table::new("sessions");

/// Raw table name of the records of an entity collection.
pub(crate) fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Service => SERVICES.name(),
        EntityKind::Identity => IDENTITIES.name(),
        EntityKind::EdgeRouter => EDGE_ROUTERS.name(),
    }
}

/// Raw table name of the records of a policy collection.
pub(crate) fn policy_table(kind: PolicyKind) -> &'static str {
    match kind {
        PolicyKind::Service => SERVICE_POLICIES.name(),
        PolicyKind::ServiceEdgeRouter => SERVICE_EDGE_ROUTER_POLICIES.name(),
        PolicyKind::EdgeRouter => EDGE_ROUTER_POLICIES.name(),
    }
}

// ============================================================================
// Secondary indexes
// ============================================================================

// name -> id
pub(crate) const SERVICE_NAMES: Table<String> = Table::new("names.services");
pub(crate) const IDENTITY_NAMES: Table<String> = Table::new("names.identities");
pub(crate) const EDGE_ROUTER_NAMES: Table<String> = Table::new("names.edge-routers");
pub(crate) const SERVICE_POLICY_NAMES: Table<String> = Table::new("names.service-policies");
pub(crate) const SERVICE_EDGE_ROUTER_POLICY_NAMES: Table<String> =
    Table::new("names.service-edge-router-policies");
pub(crate) const EDGE_ROUTER_POLICY_NAMES: Table<String> =
    Table::new("names.edge-router-policies");
pub(crate) const CONFIG_NAMES: Table<String> = Table::new("names.configs");

/// (attribute, entity id), one table per entity collection.
pub(crate) fn role_index_table(kind: EntityKind) -> Table<()> {
    match kind {
        EntityKind::Service => Table::new("roles.services"),
        EntityKind::Identity => Table::new("roles.identities"),
        EntityKind::EdgeRouter => Table::new("roles.edge-routers"),
    }
}

/// (index key, policy id), one table per policy collection and side.
pub(crate) fn match_index_table(kind: PolicyKind, side: Side) -> Table<()> {
    match (kind, side) {
        (PolicyKind::Service, Side::First) => Table::new("match.service-policies.services"),
        (PolicyKind::Service, Side::Second) => Table::new("match.service-policies.identities"),
        (PolicyKind::ServiceEdgeRouter, Side::First) => {
            Table::new("match.service-edge-router-policies.services")
        }
        (PolicyKind::ServiceEdgeRouter, Side::Second) => {
            Table::new("match.service-edge-router-policies.edge-routers")
        }
        (PolicyKind::EdgeRouter, Side::First) => {
            Table::new("match.edge-router-policies.identities")
        }
        (PolicyKind::EdgeRouter, Side::Second) => {
            Table::new("match.edge-router-policies.edge-routers")
        }
    }
}

/// Sessions by service: (service id, session id).
pub(crate) const SESSIONS_BY_SERVICE: LinkCollection = LinkCollection::new(
    "sessions-by-service",
    Table::new("sessions.by-service"),
    Table::new("sessions.by-service.rev"),
);

/// Sessions by identity: (identity id, session id).
pub(crate) const SESSIONS_BY_IDENTITY: LinkCollection = LinkCollection::new(
    "sessions-by-identity",
    Table::new("sessions.by-identity"),
    Table::new("sessions.by-identity.rev"),
);

/// Config usage: (config id, service id).
pub(crate) const CONFIG_SERVICES: LinkCollection = LinkCollection::new(
    "config-services",
    Table::new("configs.services"),
    Table::new("configs.services.rev"),
);

// ============================================================================
// Policy sides and membership
// ============================================================================

/// One of the two selectors of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Selects the first collection of [`PolicyKind::sides`].
    First,
    /// Selects the second collection of [`PolicyKind::sides`].
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// The entity collection this side of `kind` selects from.
    pub fn entity_kind(self, kind: PolicyKind) -> EntityKind {
        let (first, second) = kind.sides();
        match self {
            Self::First => first,
            Self::Second => second,
        }
    }

    /// The side of `kind` that selects from `entity`, if any.
    pub fn of(kind: PolicyKind, entity: EntityKind) -> Option<Self> {
        let (first, second) = kind.sides();
        if entity == first {
            Some(Self::First)
        } else if entity == second {
            Some(Self::Second)
        } else {
            None
        }
    }
}

/// Current members of each side of each policy: (policy id, entity id).
pub(crate) fn membership(kind: PolicyKind, side: Side) -> LinkCollection {
    match (kind, side) {
        (PolicyKind::Service, Side::First) => LinkCollection::new(
            "service-policy-services",
            Table::new("members.service-policies.services"),
            Table::new("members.service-policies.services.rev"),
        ),
        (PolicyKind::Service, Side::Second) => LinkCollection::new(
            "service-policy-identities",
            Table::new("members.service-policies.identities"),
            Table::new("members.service-policies.identities.rev"),
        ),
        (PolicyKind::ServiceEdgeRouter, Side::First) => LinkCollection::new(
            "service-edge-router-policy-services",
            Table::new("members.service-edge-router-policies.services"),
            Table::new("members.service-edge-router-policies.services.rev"),
        ),
        (PolicyKind::ServiceEdgeRouter, Side::Second) => LinkCollection::new(
            "service-edge-router-policy-edge-routers",
            Table::new("members.service-edge-router-policies.edge-routers"),
            Table::new("members.service-edge-router-policies.edge-routers.rev"),
        ),
        (PolicyKind::EdgeRouter, Side::First) => LinkCollection::new(
            "edge-router-policy-identities",
            Table::new("members.edge-router-policies.identities"),
            Table::new("members.edge-router-policies.identities.rev"),
        ),
        (PolicyKind::EdgeRouter, Side::Second) => LinkCollection::new(
            "edge-router-policy-edge-routers",
            Table::new("members.edge-router-policies.edge-routers"),
            Table::new("members.edge-router-policies.edge-routers.rev"),
        ),
    }
}

// ============================================================================
// Derived relations
// ============================================================================

/// The ref-counted relations maintained by policy propagation.
///
/// Pairs are always ordered `(first, second)` following
/// [`Relation::sides`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// Identities that may dial a service, from Dial service policies.
    ServiceDialIdentities,
    /// Identities that may bind a service, from Bind service policies.
    ServiceBindIdentities,
    /// Edge routers a service is reachable through, from service edge
    /// router policies. Kept on the service side for direct lookup.
    ServiceEdgeRouters,
    /// Edge routers an identity may use, from edge router policies.
    IdentityEdgeRouters,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Self::ServiceDialIdentities,
        Self::ServiceBindIdentities,
        Self::ServiceEdgeRouters,
        Self::IdentityEdgeRouters,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceDialIdentities => "service-dial-identities",
            Self::ServiceBindIdentities => "service-bind-identities",
            Self::ServiceEdgeRouters => "service-edge-routers",
            Self::IdentityEdgeRouters => "identity-edge-routers",
        }
    }

    /// Entity collections of the pair, in key order.
    pub fn sides(self) -> (EntityKind, EntityKind) {
        match self {
            Self::ServiceDialIdentities | Self::ServiceBindIdentities => {
                (EntityKind::Service, EntityKind::Identity)
            }
            Self::ServiceEdgeRouters => (EntityKind::Service, EntityKind::EdgeRouter),
            Self::IdentityEdgeRouters => (EntityKind::Identity, EntityKind::EdgeRouter),
        }
    }

    pub(crate) fn links(self) -> RefCountedLinkCollection {
        match self {
            Self::ServiceDialIdentities => RefCountedLinkCollection::new(
                self,
                Table::new("links.service-dial-identities"),
                Table::new("links.identity-dial-services"),
            ),
            Self::ServiceBindIdentities => RefCountedLinkCollection::new(
                self,
                Table::new("links.service-bind-identities"),
                Table::new("links.identity-bind-services"),
            ),
            Self::ServiceEdgeRouters => RefCountedLinkCollection::new(
                self,
                Table::new("links.service-edge-routers"),
                Table::new("links.edge-router-services"),
            ),
            Self::IdentityEdgeRouters => RefCountedLinkCollection::new(
                self,
                Table::new("links.identity-edge-routers"),
                Table::new("links.edge-router-identities"),
            ),
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown relation '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_round_trip() {
        for kind in PolicyKind::ALL {
            for side in Side::BOTH {
                assert_eq!(Side::of(kind, side.entity_kind(kind)), Some(side));
            }
        }
        assert_eq!(Side::of(PolicyKind::EdgeRouter, EntityKind::Service), None);
    }

    #[test]
    fn relation_names_parse() {
        for relation in Relation::ALL {
            assert_eq!(relation.as_str().parse::<Relation>(), Ok(relation));
        }
        assert!("nope".parse::<Relation>().is_err());
    }
}
