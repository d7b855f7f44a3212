//! Role tokens.
//!
//! A token is the parsed form of one entry of a policy's role text.

use serde::{Deserialize, Serialize};

use crate::SelectorError;

/// The wildcard token text.
pub const ALL_TOKEN: &str = "#all";

/// Prefix of literal attribute tokens.
pub const ATTRIBUTE_PREFIX: char = '#';

/// Prefix of explicit entity references.
pub const ENTITY_PREFIX: char = '@';

/// Index key under which selectors that match unconditionally are filed.
///
/// Cannot collide with a token key: every token key starts with `#` or `@`.
pub const UNCONDITIONAL_INDEX_KEY: &str = "*";

/// One entry of a role selector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleToken {
    /// Matches every entity of the target collection.
    All,
    /// Matches entities carrying this role attribute.
    Attribute(String),
    /// Matches exactly the entity with this identifier.
    Entity(String),
}

impl RoleToken {
    /// Parses one token of role text.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::InvalidToken`] for empty text, a missing
    /// `#`/`@` prefix, an empty name after the prefix, or surrounding
    /// whitespace.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let invalid = |reason: &'static str| SelectorError::InvalidToken {
            token: text.to_string(),
            reason,
        };

        if text.is_empty() {
            return Err(invalid("token is empty"));
        }
        if text.trim() != text {
            return Err(invalid("token has surrounding whitespace"));
        }
        if text == ALL_TOKEN {
            return Ok(Self::All);
        }

        if let Some(name) = text.strip_prefix(ATTRIBUTE_PREFIX) {
            if name.is_empty() {
                return Err(invalid("attribute name is empty"));
            }
            return Ok(Self::Attribute(name.to_string()));
        }
        if let Some(id) = text.strip_prefix(ENTITY_PREFIX) {
            if id.is_empty() {
                return Err(invalid("entity reference is empty"));
            }
            return Ok(Self::Entity(id.to_string()));
        }

        Err(invalid("token must start with '#' or '@'"))
    }

    /// Renders the token back to role text.
    pub fn to_text(&self) -> String {
        match self {
            Self::All => ALL_TOKEN.to_string(),
            Self::Attribute(name) => format!("{ATTRIBUTE_PREFIX}{name}"),
            Self::Entity(id) => format!("{ENTITY_PREFIX}{id}"),
        }
    }

    /// Key of this token in the policy match index.
    ///
    /// Identical to the role text: attribute and reference keys live in
    /// disjoint `#`/`@` namespaces.
    pub fn index_key(&self) -> String {
        self.to_text()
    }

    /// Index key for an entity attribute value.
    pub fn attribute_key(attribute: &str) -> String {
        format!("{ATTRIBUTE_PREFIX}{attribute}")
    }

    /// Index key for an explicit reference to `id`.
    pub fn entity_key(id: &str) -> String {
        format!("{ENTITY_PREFIX}{id}")
    }
}
