//! Policy advisor.
//!
//! Explains whether an identity can reach a service: which service policies
//! grant dial or bind access, and which edge routers both sides can use.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use edgeguard_types::{EntityKind, IdentityId, PolicyKind, PolicyType, ServiceId};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::{Identity, Record, Service, ServicePolicy};
use crate::queries::Queries;
use crate::tables::Relation;

/// One kind of access and the policies granting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Access {
    pub allowed: bool,
    pub policies: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorReport {
    pub identity: IdentityId,
    pub service: ServiceId,
    pub dial: Access,
    pub bind: Access,
    /// Edge routers the service is reachable through.
    pub service_edge_routers: BTreeSet<String>,
    /// Edge routers the identity may use.
    pub identity_edge_routers: BTreeSet<String>,
    /// Edge routers usable for this identity and service together.
    pub common_edge_routers: BTreeSet<String>,
}

impl AdvisorReport {
    /// The identity can dial the service through at least one router.
    pub fn can_dial(&self) -> bool {
        self.dial.allowed && !self.common_edge_routers.is_empty()
    }

    /// The identity can bind the service through at least one router.
    pub fn can_bind(&self) -> bool {
        self.bind.allowed && !self.common_edge_routers.is_empty()
    }
}

pub fn advise<Q: Queries>(
    q: &Q,
    identity: &IdentityId,
    service: &ServiceId,
) -> Result<AdvisorReport, EngineError> {
    require::<Identity, Q>(q, identity.as_str())?;
    require::<Service, Q>(q, service.as_str())?;

    let selecting_service =
        q.policies_selecting(PolicyKind::Service, EntityKind::Service, service.as_str())?;
    let selecting_identity =
        q.policies_selecting(PolicyKind::Service, EntityKind::Identity, identity.as_str())?;

    let mut dial = Access::default();
    let mut bind = Access::default();
    for policy in selecting_service.intersection(&selecting_identity) {
        let Some(record) = q.load::<ServicePolicy>(policy)? else {
            continue;
        };
        match record.policy_type {
            PolicyType::Dial => dial.policies.insert(policy.clone()),
            PolicyType::Bind => bind.policies.insert(policy.clone()),
        };
    }
    dial.allowed = q.is_dialable_by_identity(service, identity)?;
    bind.allowed = q.is_bindable_by_identity(service, identity)?;

    // Postcondition: link presence agrees with policy membership
    debug_assert_eq!(dial.allowed, !dial.policies.is_empty());
    debug_assert_eq!(bind.allowed, !bind.policies.is_empty());

    let service_edge_routers = q.linked_entities(Relation::ServiceEdgeRouters, service.as_str())?;
    let identity_edge_routers =
        q.linked_entities(Relation::IdentityEdgeRouters, identity.as_str())?;
    let common_edge_routers = service_edge_routers
        .intersection(&identity_edge_routers)
        .cloned()
        .collect();

    Ok(AdvisorReport {
        identity: identity.clone(),
        service: service.clone(),
        dial,
        bind,
        service_edge_routers,
        identity_edge_routers,
        common_edge_routers,
    })
}

fn require<R: Record, Q: Queries>(q: &Q, id: &str) -> Result<(), EngineError> {
    match q.load::<R>(id)? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound {
            kind: R::COLLECTION,
            id: id.to_string(),
        }),
    }
}

fn list(items: &BTreeSet<String>) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

impl Display for AdvisorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "identity {} -> service {}", self.identity, self.service)?;
        writeln!(
            f,
            "  dial: {} via {}",
            if self.dial.allowed { "allowed" } else { "denied" },
            list(&self.dial.policies)
        )?;
        writeln!(
            f,
            "  bind: {} via {}",
            if self.bind.allowed { "allowed" } else { "denied" },
            list(&self.bind.policies)
        )?;
        writeln!(f, "  service edge routers:  {}", list(&self.service_edge_routers))?;
        writeln!(f, "  identity edge routers: {}", list(&self.identity_edge_routers))?;
        write!(f, "  common edge routers:   {}", list(&self.common_edge_routers))
    }
}
