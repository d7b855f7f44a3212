//! # edgeguard-types: Core types for `Edgeguard`
//!
//! This crate contains shared types used across the `Edgeguard` system:
//! - Entity IDs ([`ServiceId`], [`IdentityId`], [`EdgeRouterId`], [`PolicyId`],
//!   [`SessionId`], [`ConfigId`])
//! - Entity classification ([`EntityKind`], [`PolicyKind`])
//! - Role attribute sets ([`RoleAttributes`])
//! - Policy vocabulary ([`Semantic`], [`PolicyType`], [`SessionKind`])

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - opaque, case-sensitive strings
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a service.
    ServiceId
);
string_id!(
    /// Unique identifier for a network identity.
    IdentityId
);
string_id!(
    /// Unique identifier for an edge router.
    EdgeRouterId
);
string_id!(
    /// Unique identifier for a policy of any kind.
    PolicyId
);
string_id!(
    /// Unique identifier for a session between an identity and a service.
    SessionId
);
string_id!(
    /// Unique identifier for a service configuration document.
    ConfigId
);

// ============================================================================
// Entity Classification
// ============================================================================

/// The collections whose members carry role attributes and can be selected
/// by policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Service,
    Identity,
    EdgeRouter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Service, Self::Identity, Self::EdgeRouter];

    /// Returns the stable lowercase name used in table names and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Identity => "identity",
            Self::EdgeRouter => "edge-router",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three policy collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Grants identities dial or bind access to services.
    Service,
    /// Makes services reachable through edge routers.
    ServiceEdgeRouter,
    /// Grants identities the use of edge routers.
    EdgeRouter,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [Self::Service, Self::ServiceEdgeRouter, Self::EdgeRouter];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service-policy",
            Self::ServiceEdgeRouter => "service-edge-router-policy",
            Self::EdgeRouter => "edge-router-policy",
        }
    }

    /// Returns the entity collections selected by the two sides of this
    /// policy kind, in link order.
    pub fn sides(self) -> (EntityKind, EntityKind) {
        match self {
            Self::Service => (EntityKind::Service, EntityKind::Identity),
            Self::ServiceEdgeRouter => (EntityKind::Service, EntityKind::EdgeRouter),
            Self::EdgeRouter => (EntityKind::Identity, EntityKind::EdgeRouter),
        }
    }
}

impl Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Role Attributes
// ============================================================================

/// The set of role attributes attached to an entity.
///
/// Attributes are opaque, case-sensitive tags. The set is ordered so that
/// serialized forms and diffs are deterministic.
pub type RoleAttributes = BTreeSet<String>;

/// Builds a [`RoleAttributes`] set from anything string-like.
pub fn role_attributes<I, S>(values: I) -> RoleAttributes
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

// ============================================================================
// Policy Vocabulary
// ============================================================================

/// How the tokens of a role selector combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Semantic {
    /// Matches entities satisfying at least one token.
    #[default]
    AnyOf,
    /// Matches entities carrying every literal attribute token.
    AllOf,
}

impl Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyOf => f.write_str("AnyOf"),
            Self::AllOf => f.write_str("AllOf"),
        }
    }
}

impl FromStr for Semantic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AnyOf" | "anyOf" | "any-of" => Ok(Self::AnyOf),
            "AllOf" | "allOf" | "all-of" => Ok(Self::AllOf),
            other => Err(format!("unknown semantic '{other}'")),
        }
    }
}

/// The access a service policy grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    /// Identities may connect to the service.
    Dial,
    /// Identities may host the service.
    Bind,
}

impl Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dial => f.write_str("Dial"),
            Self::Bind => f.write_str("Bind"),
        }
    }
}

/// The direction of a session, mirroring [`PolicyType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    Dial,
    Bind,
}

impl From<SessionKind> for PolicyType {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Dial => Self::Dial,
            SessionKind::Bind => Self::Bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn generated_ids_are_unique() {
        let a = ServiceId::generate();
        let b = ServiceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = IdentityId::new("alice");
        let json = serde_json::to_string(&id).expect("serialize id");
        assert_eq!(json, "\"alice\"");
    }

    #[test]
    fn ids_compare_case_sensitively() {
        assert_ne!(EdgeRouterId::from("Router"), EdgeRouterId::from("router"));
    }

    #[test_case("AnyOf", Semantic::AnyOf)]
    #[test_case("allOf", Semantic::AllOf)]
    #[test_case("all-of", Semantic::AllOf)]
    fn semantic_parses(input: &str, expected: Semantic) {
        assert_eq!(input.parse::<Semantic>(), Ok(expected));
    }

    #[test]
    fn semantic_rejects_unknown() {
        assert!("OneOf".parse::<Semantic>().is_err());
    }

    #[test]
    fn policy_kind_sides_are_in_link_order() {
        assert_eq!(
            PolicyKind::Service.sides(),
            (EntityKind::Service, EntityKind::Identity)
        );
        assert_eq!(
            PolicyKind::ServiceEdgeRouter.sides(),
            (EntityKind::Service, EntityKind::EdgeRouter)
        );
        assert_eq!(
            PolicyKind::EdgeRouter.sides(),
            (EntityKind::Identity, EntityKind::EdgeRouter)
        );
    }

    #[test]
    fn role_attributes_deduplicate() {
        let attrs = role_attributes(["web", "db", "web"]);
        assert_eq!(attrs.len(), 2);
    }
}
